//! TFRecord download binary

use clap::Parser;
use logit_adjust_core::config::{self, ENV_DATA_DIR};
use logit_adjust_core::storage::{
    AlwaysOverwrite, DownloadConfig, DownloadOutcome, Downloader, NeverOverwrite, OverwritePrompt,
    StdinPrompt, TFRECORD_URLS,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "la-download", about = "Download long-tailed CIFAR TFRecord files")]
struct Args {
    /// Files to fetch: train10, test10, train100, test100 (all if omitted)
    keys: Vec<String>,
    /// Destination directory
    #[arg(long, env = ENV_DATA_DIR)]
    data_dir: Option<PathBuf>,
    /// Overwrite existing files without asking
    #[arg(long, conflicts_with = "no")]
    yes: bool,
    /// Never overwrite existing files
    #[arg(long)]
    no: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(config::data_dir_from_env);
    let keys: Vec<String> = if args.keys.is_empty() {
        TFRECORD_URLS.iter().map(|(k, _)| k.to_string()).collect()
    } else {
        args.keys
    };

    let prompt: Arc<dyn OverwritePrompt> = if args.yes {
        Arc::new(AlwaysOverwrite)
    } else if args.no {
        Arc::new(NeverOverwrite)
    } else {
        Arc::new(StdinPrompt)
    };

    info!("Downloading {:?} into {}", keys, data_dir.display());
    let downloader = Downloader::new(DownloadConfig::from_env())?;
    let outcomes = downloader
        .download_tfrecords(&keys, &data_dir, prompt)
        .await?;

    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            DownloadOutcome::Downloaded { path, bytes } => {
                info!("{}: {} bytes", path.display(), bytes)
            }
            DownloadOutcome::Skipped { path } => info!("{}: kept existing file", path.display()),
            DownloadOutcome::Failed { key, reason } => {
                error!("{}: {}", key, reason);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} downloads failed", failed, outcomes.len()).into());
    }
    Ok(())
}
