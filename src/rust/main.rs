use anyhow::Context;
use nsfwsense::{Classifier, ClassifierConfig, ImageSource, ModelManager, ModelSource};
use log::info;
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(author, version, about = "Classify images into porn / sexy / hentai / neutral / drawing", long_about = None)]
struct Args {
    /// Image files to classify
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Directory holding <model-name>/model.onnx
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Model subdirectory name
    #[arg(long)]
    model_name: Option<String>,

    /// Maximum images processed at once (0 = unbounded)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-image deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Download the model from this URL if it is missing or fails verification
    #[arg(long, requires = "model_sha256")]
    model_url: Option<String>,

    /// Expected SHA-256 of the downloaded model
    #[arg(long, requires = "model_url")]
    model_sha256: Option<String>,

    /// Force a fresh download of the model files
    #[arg(short, long, requires = "model_url")]
    fresh: bool,
}

async fn ensure_model_downloaded(config: &ClassifierConfig, args: &Args) -> anyhow::Result<()> {
    let (Some(url), Some(sha256)) = (&args.model_url, &args.model_sha256) else {
        return Ok(());
    };
    let manager = ModelManager::new(&config.model.models_dir)
        .with_context(|| format!("Failed to create models directory {:?}", config.model.models_dir))?;
    let source = ModelSource {
        name: config.model.model_name.clone(),
        url: url.clone(),
        sha256: sha256.clone(),
    };

    if args.fresh {
        info!("Fresh download requested - removing any existing model files...");
        manager.remove_download(&source.name)?;
    }

    manager
        .ensure_model_downloaded(&source)
        .await
        .with_context(|| format!("Failed to fetch model '{}' from {}", source.name, source.url))?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    nsfwsense::init_logger();
    let args = Args::parse();

    let mut config = ClassifierConfig::from_env();
    if let Some(dir) = &args.model_dir {
        config.model.models_dir = dir.clone();
    }
    if let Some(name) = &args.model_name {
        config.model.model_name = name.clone();
    }
    if let Some(limit) = args.concurrency {
        config.max_concurrency = (limit > 0).then_some(limit);
    }
    if let Some(ms) = args.timeout_ms {
        config.item_timeout = (ms > 0).then(|| Duration::from_millis(ms));
    }

    ensure_model_downloaded(&config, &args).await?;

    let classifier = Classifier::builder()
        .with_config(config)
        .build()
        .context("Failed to build classifier")?;
    let sources: Vec<ImageSource> = args.paths.iter().map(ImageSource::from_path).collect();

    let start_time = Instant::now();
    info!("Classifying {} image(s)...", sources.len());
    let batch = classifier.classify_many(sources).await;
    info!("Done in {:.2?}", start_time.elapsed());

    let body = serde_json::json!({
        "success": true,
        "results": batch,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);

    Ok(())
}
