use anyhow::Result;
use tracing::Level;
use tracing_subscriber::fmt;

/// Stage progress logs at info, match decisions at debug. Quiet by default
/// so the CLI's JSON report stays the only stdout output.
pub fn init(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let _ = fmt()
        .with_max_level(level)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}
