use anyhow::{anyhow, Result};
use std::path::Path;

pub mod analyze;
mod jp;
pub mod layout;
pub mod logging;
pub mod nlp;
pub mod ocr;
pub mod pipeline;
pub mod reconcile;
pub mod server;
pub mod settings;
pub mod storage;
mod test_util;

pub use pipeline::{FailureReport, Pipeline, Report};
pub use reconcile::Annotation;

#[derive(Debug, Clone)]
pub struct Config {
    pub image: Option<String>,
    pub serve: bool,
    pub addr: String,
    pub settings_path: Option<String>,
    pub list_ocr_languages: bool,
}

/// CLI entry point: processes one image to a JSON report on stdout, or
/// serves the HTTP endpoint. Pipeline failures are reported as structured
/// JSON with `success: false`, not as process errors.
pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    if config.list_ocr_languages {
        return Ok(ocr::list_tesseract_languages()?.join("\n"));
    }

    if config.serve {
        server::run_server(settings, config.addr).await?;
        return Ok(String::new());
    }

    let Some(image) = config.image else {
        return Err(anyhow!("no image path given (pass a file or use --serve)"));
    };

    storage::Storage::new(&settings).sweep_stale();

    let pipeline = Pipeline::new(&settings);
    match pipeline.process(Path::new(&image)).await {
        Ok(report) => Ok(serde_json::to_string_pretty(&report)?),
        Err(err) => Ok(serde_json::to_string_pretty(&pipeline::failure_report(
            &format!("{err:#}"),
        ))?),
    }
}
