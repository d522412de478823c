//! Dataset loader
//!
//! Main interface for iterating decoded batches of a registered dataset.

use std::path::Path;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::prefetcher::{Batch, Prefetcher};
use super::registry::{DatasetSpec, Split};
use super::tfrecord::RecordReader;
use crate::error::{LaError, Result};

/// Default shuffle buffer, in records
pub const DEFAULT_SHUFFLE_BUFFER: usize = 10_000;

/// Configuration for the input pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Records held by the shuffle buffer
    pub shuffle_buffer: usize,
    /// Decoded batches buffered ahead of the consumer
    pub prefetch_depth: usize,
    /// Batches decoded concurrently
    pub decode_workers: usize,
    /// Seed for shuffling and augmentation; random if unset
    pub seed: Option<u64>,
    /// Verify TFRecord checksums
    pub verify_checksums: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            shuffle_buffer: DEFAULT_SHUFFLE_BUFFER,
            prefetch_depth: cpus.max(2),
            decode_workers: (cpus / 2).max(1),
            seed: None,
            verify_checksums: true,
        }
    }
}

impl PipelineConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_shuffle_buffer(mut self, records: usize) -> Self {
        self.shuffle_buffer = records;
        self
    }

    pub fn with_prefetch_depth(mut self, batches: usize) -> Self {
        self.prefetch_depth = batches;
        self
    }

    pub fn with_decode_workers(mut self, workers: usize) -> Self {
        self.decode_workers = workers;
        self
    }
}

/// Build a loader over one split of a dataset.
///
/// Training loaders read the train file, augment, and drop the last partial
/// batch. Evaluation loaders read the test file and keep it.
pub async fn create_dataset(
    dataset: &DatasetSpec,
    data_home: impl AsRef<Path>,
    batch_size: usize,
    training: bool,
    config: PipelineConfig,
) -> Result<DataLoader> {
    let split = Split::from_training(training);
    let path = dataset.file_path(data_home, split);
    DataLoader::open(&path, batch_size, training, config).await
}

/// Async batch iterator over one pass of a TFRecord file
pub struct DataLoader {
    /// Channel to receive batches from the prefetcher
    receiver: mpsc::Receiver<Result<Batch>>,
    /// Total batches received
    batches_loaded: u64,
    /// Total examples received
    examples_loaded: u64,
    /// Set after an error or end of input
    finished: bool,
    /// Task handle for prefetcher
    prefetch_handle: Option<JoinHandle<()>>,
}

impl DataLoader {
    /// Open a TFRecord file and start prefetching
    pub async fn open(
        path: impl AsRef<Path>,
        batch_size: usize,
        training: bool,
        config: PipelineConfig,
    ) -> Result<Self> {
        let reader = RecordReader::open(path.as_ref()).await?;
        info!(
            "Loading {} (batch_size={}, training={})",
            path.as_ref().display(),
            batch_size,
            training
        );
        Self::from_reader(reader, batch_size, training, config)
    }

    /// Start prefetching from an already-open reader
    pub fn from_reader(
        reader: RecordReader,
        batch_size: usize,
        training: bool,
        config: PipelineConfig,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(LaError::invalid("batch_size must be positive"));
        }

        let (sender, receiver) = mpsc::channel(config.prefetch_depth.max(1));
        let prefetcher = Prefetcher::new(sender, reader, batch_size, training, config);
        let prefetch_handle = tokio::spawn(prefetcher.run());

        Ok(Self {
            receiver,
            batches_loaded: 0,
            examples_loaded: 0,
            finished: false,
            prefetch_handle: Some(prefetch_handle),
        })
    }

    /// Get the next batch, or `None` at the end of the pass.
    ///
    /// A pipeline error ends the pass; later calls return `None`.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        if self.finished {
            return Ok(None);
        }

        match self.receiver.recv().await {
            Some(Ok(batch)) => {
                self.batches_loaded += 1;
                self.examples_loaded += batch.len() as u64;
                Ok(Some(batch))
            }
            Some(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            None => {
                self.finished = true;
                if let Some(handle) = self.prefetch_handle.take() {
                    if let Err(e) = handle.await {
                        return Err(LaError::PipelineStopped {
                            reason: format!("prefetcher task failed: {}", e),
                        });
                    }
                }
                Ok(None)
            }
        }
    }

    /// Get total batches loaded
    pub fn batches_loaded(&self) -> u64 {
        self.batches_loaded
    }

    /// Get total examples loaded
    pub fn examples_loaded(&self) -> u64 {
        self.examples_loaded
    }

    /// Shutdown the loader and wait for the prefetcher
    pub async fn shutdown(mut self) {
        // Dropping the receiver makes the prefetcher's next send fail
        drop(self.receiver);

        if let Some(handle) = self.prefetch_handle.take() {
            let _ = handle.await;
        }

        debug!("DataLoader shutdown complete, loaded {} batches", self.batches_loaded);
    }
}
