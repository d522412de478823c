//! Dataset inspection binary
//!
//! Makes one pass over a split and prints label statistics, the class priors
//! with their logit offsets, and the learning-rate schedule as JSON.

use clap::{Parser, ValueEnum};
use logit_adjust_core::config;
use logit_adjust_core::data::{self, PipelineConfig, Split};
use logit_adjust_core::loss::{base_probs_from_counts, build_loss_fn, class_counts};
use logit_adjust_core::metrics::gather_metrics;
use logit_adjust_core::{DEFAULT_BASE_LEARNING_RATE, DEFAULT_BATCH_SIZE, DEFAULT_TAU};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum SplitArg {
    Train,
    Test,
}

#[derive(Parser, Debug)]
#[command(name = "la-inspect", about = "Summarize a registered TFRecord dataset")]
struct Args {
    /// Registered dataset name (cifar10-lt, cifar100-lt, test)
    #[arg(long, default_value = "cifar10-lt")]
    dataset: String,
    /// Directory holding the TFRecord files
    #[arg(long, env = config::ENV_DATA_DIR)]
    data_dir: Option<PathBuf>,
    /// Split to read
    #[arg(long, value_enum, default_value_t = SplitArg::Train)]
    split: SplitArg,
    /// Batch size used for step counts
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Base learning rate
    #[arg(long, default_value_t = DEFAULT_BASE_LEARNING_RATE)]
    base_lr: f64,
    /// Temperature applied to the priors in the logit offsets
    #[arg(long, default_value_t = DEFAULT_TAU)]
    tau: f32,
}

#[derive(Serialize)]
struct ScheduleBoundary {
    step: u64,
    learning_rate: f64,
}

#[derive(Serialize)]
struct Report {
    dataset: data::DatasetSpec,
    split: Split,
    records: u64,
    expected_records: usize,
    class_counts: Vec<u64>,
    base_probs: Vec<f32>,
    tau: f32,
    logit_offsets: Vec<f32>,
    steps_per_epoch: u64,
    schedule: Vec<ScheduleBoundary>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let spec = data::lookup(&args.dataset)?;
    let data_dir = args.data_dir.unwrap_or_else(config::data_dir_from_env);
    let split = match args.split {
        SplitArg::Train => Split::Train,
        SplitArg::Test => Split::Test,
    };

    // Evaluation mode: no augmentation and every record is counted.
    let mut loader = data::DataLoader::open(
        spec.file_path(&data_dir, split),
        args.batch_size,
        false,
        PipelineConfig::from_env(),
    )
    .await?;

    let mut labels = Vec::with_capacity(spec.num_examples(split));
    while let Some(batch) = loader.next_batch().await? {
        labels.extend_from_slice(&batch.labels);
    }
    info!("Read {} records in {} batches", labels.len(), loader.batches_loaded());
    debug!("Pipeline metrics:\n{}", gather_metrics()?);

    if labels.len() != spec.num_examples(split) {
        warn!(
            "{} has {} records, registry expects {}",
            spec.file_name(split),
            labels.len(),
            spec.num_examples(split)
        );
    }

    let counts = class_counts(&labels, spec.num_classes)?;
    let base_probs = base_probs_from_counts(&counts)?;
    let loss_fn = build_loss_fn(true, base_probs.clone(), args.tau);
    let schedule = spec.build_schedule(args.batch_size, args.base_lr)?;
    let boundaries = std::iter::once(0)
        .chain(schedule.boundaries())
        .map(|step| ScheduleBoundary {
            step,
            learning_rate: schedule.learning_rate(step),
        })
        .collect();

    let report = Report {
        steps_per_epoch: spec.steps_per_epoch(args.batch_size, Split::Train)?,
        expected_records: spec.num_examples(split),
        records: labels.len() as u64,
        dataset: spec,
        split,
        class_counts: counts,
        logit_offsets: loss_fn.offsets().to_vec(),
        base_probs,
        tau: args.tau,
        schedule: boundaries,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
