//! logit-adjust-core - training utilities for long-tailed image classification
//!
//! This crate provides:
//! - A registry of long-tailed CIFAR datasets
//! - A TFRecord input pipeline with augmentation and prefetching
//! - The logit-adjusted softmax cross-entropy
//! - A step learning-rate schedule with linear warmup
//! - A downloader for the published TFRecord files

pub mod config;
pub mod data;
pub mod error;
pub mod loss;
pub mod metrics;
pub mod schedule;
pub mod storage;

pub use data::{create_dataset, dataset_mappings, Batch, DataLoader, DatasetSpec, PipelineConfig, Split};
pub use error::{LaError, Result};
pub use loss::{build_loss_fn, LossFn};
pub use schedule::StepSchedule;
pub use storage::{DownloadConfig, Downloader};

/// Default temperature for the log-prior adjustment
pub const DEFAULT_TAU: f32 = 1.0;

/// Default training batch size
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Default base learning rate
pub const DEFAULT_BASE_LEARNING_RATE: f64 = 0.1;
