use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use cropdoc::{DiagnosisRequest, Orchestrator, PipelineConfig};
use log::{error, info, warn};

#[derive(Parser)]
#[command(author, version, about = "Diagnose crop disease from a leaf photo", long_about = None)]
struct Args {
    /// Path to the leaf image
    image: PathBuf,

    /// Crop name, if known
    #[arg(long)]
    crop: Option<String>,

    /// Free-text notes about what you see
    #[arg(long)]
    context: Option<String>,

    /// Language code recorded on the request. The CLI has no translator, so
    /// guidance is always printed in English.
    #[arg(long, default_value = "en")]
    lang: String,

    /// Directory holding model.json, weight shards and labels.json
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// JSON config file; environment variables are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip remote services
    #[arg(long)]
    local_only: bool,
}

fn load_config(args: &Args) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::from_env(),
    };
    if let Some(dir) = &args.model_dir {
        config = config.with_model_dir(dir);
    }
    if args.local_only {
        config = config.local_only();
    }
    Ok(config)
}

fn requested_language(raw: &str) -> String {
    let lang = raw.trim().to_lowercase();
    if lang.is_empty() {
        "en".to_string()
    } else {
        lang
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&args)?;
    info!("Using model directory {:?}", config.model_dir);

    let orchestrator = Orchestrator::from_config(&config)?;
    info!("Tiers: {:?}", orchestrator.tier_names());

    let language = requested_language(&args.lang);
    if language != "en" {
        warn!("No translator configured, guidance stays in English instead of '{}'", language);
    }

    let image = std::fs::read(&args.image)?;
    let mut request = DiagnosisRequest::new(image).with_language(language);
    request.crop_hint = args.crop;
    request.context = args.context;

    let record = orchestrator.diagnose(&request).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    cropdoc::init_logger();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
