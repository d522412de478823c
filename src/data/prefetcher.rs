//! Async batch producer
//!
//! Runs on a separate task: reads records, shuffles, groups them into
//! batches and decodes batches on the blocking pool ahead of consumption.

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::example::parse_labeled_image;
use super::image::{process_image, CHANNELS, IMAGE_SIZE};
use super::loader::PipelineConfig;
use super::shuffle::ShuffleBuffer;
use super::tfrecord::RecordReader;
use crate::error::{LaError, Result};
use crate::metrics::metrics;

/// A batch of decoded images and their labels
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `len * 32 * 32 * 3` values, NHWC row-major
    pub images: Vec<f32>,
    /// One label per image
    pub labels: Vec<i64>,
}

impl Batch {
    /// Images in the batch
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Shape of a single image (H, W, C)
    pub fn image_shape(&self) -> [usize; 3] {
        [IMAGE_SIZE, IMAGE_SIZE, CHANNELS]
    }

    /// Pixels of the i-th image
    pub fn image(&self, i: usize) -> &[f32] {
        let size = IMAGE_SIZE * IMAGE_SIZE * CHANNELS;
        &self.images[i * size..(i + 1) * size]
    }
}

/// Parse a group of serialized examples into a batch, augmenting if training
pub fn parse_batch<R: Rng + ?Sized>(records: &[Bytes], training: bool, rng: &mut R) -> Result<Batch> {
    let size = IMAGE_SIZE * IMAGE_SIZE * CHANNELS;
    let mut images = Vec::with_capacity(records.len() * size);
    let mut labels = Vec::with_capacity(records.len());

    for record in records {
        let example = parse_labeled_image(record)?;
        let image = process_image(&example.encoded, training, rng)?;
        images.extend_from_slice(&image.data);
        labels.push(example.label);
    }

    Ok(Batch { images, labels })
}

type DecodeHandle = JoinHandle<Result<Batch>>;

/// Producer that feeds decoded batches to a [`super::DataLoader`]
pub struct Prefetcher {
    /// Channel to the loader
    sender: mpsc::Sender<Result<Batch>>,
    /// Framed input records
    reader: Option<RecordReader>,
    batch_size: usize,
    training: bool,
    config: PipelineConfig,
    rng: StdRng,
    /// Batches being decoded, in emission order
    in_flight: VecDeque<DecodeHandle>,
}

impl Prefetcher {
    /// Create a new prefetcher
    pub fn new(
        sender: mpsc::Sender<Result<Batch>>,
        reader: RecordReader,
        batch_size: usize,
        training: bool,
        config: PipelineConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let reader = reader.verify_checksums(config.verify_checksums);
        Self {
            sender,
            reader: Some(reader),
            batch_size,
            training,
            config,
            rng,
            in_flight: VecDeque::new(),
        }
    }

    /// Run the producer loop until input is exhausted or the consumer leaves
    pub async fn run(mut self) {
        let _active = ActiveLoader::register();
        debug!(
            "Prefetcher starting (batch_size={}, training={}, shuffle_buffer={})",
            self.batch_size, self.training, self.config.shuffle_buffer
        );

        let mut shuffle = ShuffleBuffer::new(self.config.shuffle_buffer, self.rng.gen());
        let mut pending: Vec<Bytes> = Vec::with_capacity(self.batch_size);
        let mut records = 0u64;

        let Some(reader) = self.reader.take() else {
            return;
        };
        for record in reader {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    if e.is_corruption() {
                        metrics().corrupt_records.inc();
                    }
                    error!("Record {} unreadable: {}", records, e);
                    // Deliver batches built from earlier records before the error.
                    while !self.in_flight.is_empty() {
                        if !self.deliver_front().await {
                            return;
                        }
                    }
                    let _ = self.sender.send(Err(e)).await;
                    return;
                }
            };
            records += 1;
            metrics().records_read.inc();

            if let Some(out) = shuffle.push(record) {
                pending.push(out);
                if pending.len() == self.batch_size {
                    let batch = std::mem::replace(&mut pending, Vec::with_capacity(self.batch_size));
                    if !self.dispatch(batch).await {
                        return;
                    }
                }
            }
        }

        while let Some(out) = shuffle.pop() {
            pending.push(out);
            if pending.len() == self.batch_size {
                let batch = std::mem::replace(&mut pending, Vec::with_capacity(self.batch_size));
                if !self.dispatch(batch).await {
                    return;
                }
            }
        }

        if !pending.is_empty() {
            if self.training {
                debug!("Dropping final partial batch of {} records", pending.len());
            } else if !self.dispatch(pending).await {
                return;
            }
        }

        while !self.in_flight.is_empty() {
            if !self.deliver_front().await {
                return;
            }
        }

        debug!("Prefetcher completed, {} records processed", records);
    }

    /// Queue a batch for decoding; returns false once the pipeline should stop
    async fn dispatch(&mut self, records: Vec<Bytes>) -> bool {
        let training = self.training;
        let seed: u64 = self.rng.gen();
        let handle = tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(seed);
            let _timer = metrics().batch_duration.start_timer();
            parse_batch(&records, training, &mut rng)
        });
        self.in_flight.push_back(handle);

        if self.in_flight.len() >= self.config.decode_workers.max(1) {
            return self.deliver_front().await;
        }
        true
    }

    /// Await the oldest decode and forward it to the consumer
    async fn deliver_front(&mut self) -> bool {
        let Some(handle) = self.in_flight.pop_front() else {
            return true;
        };
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => Err(LaError::PipelineStopped {
                reason: format!("decode task failed: {}", e),
            }),
        };

        match result {
            Ok(batch) => {
                metrics().batches_produced.inc();
                if self.sender.send(Ok(batch)).await.is_err() {
                    debug!("Prefetcher: consumer dropped, stopping");
                    self.abort_in_flight();
                    return false;
                }
                true
            }
            Err(e) => {
                if e.is_corruption() {
                    metrics().corrupt_records.inc();
                }
                warn!("Batch decode failed: {}", e);
                self.fail(e).await;
                false
            }
        }
    }

    async fn fail(&mut self, e: LaError) {
        self.abort_in_flight();
        let _ = self.sender.send(Err(e)).await;
    }

    fn abort_in_flight(&mut self) {
        for handle in self.in_flight.drain(..) {
            handle.abort();
        }
    }
}

/// Tracks a running prefetcher in the active-loader gauge
struct ActiveLoader;

impl ActiveLoader {
    fn register() -> Self {
        metrics().active_loaders.inc();
        ActiveLoader
    }
}

impl Drop for ActiveLoader {
    fn drop(&mut self) {
        metrics().active_loaders.dec();
    }
}
