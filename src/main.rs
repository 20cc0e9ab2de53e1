use anyhow::Result;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "furigana-annotator-rust",
    version,
    about = "Annotate Japanese text images with readings and meanings"
)]
struct Cli {
    /// Image file to process (png/jpg/jpeg)
    image: Option<String>,

    /// Run the HTTP server instead of processing a single image
    #[arg(long = "serve")]
    serve: bool,

    /// Server bind address
    #[arg(long = "addr", default_value = "0.0.0.0:8000")]
    addr: String,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Show OCR languages available to the local tesseract and exit
    #[arg(long = "list-ocr-languages")]
    list_ocr_languages: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    furigana_annotator_rust::logging::init(cli.verbose)?;

    let output = furigana_annotator_rust::run(furigana_annotator_rust::Config {
        image: cli.image,
        serve: cli.serve,
        addr: cli.addr,
        settings_path: cli.read_settings,
        list_ocr_languages: cli.list_ocr_languages,
    })
    .await?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
