//! Data loading pipeline
//!
//! Dataset registry, TFRecord framing, Example parsing, augmentation and
//! an async prefetching loader.

pub mod registry;
pub mod tfrecord;
pub mod example;
pub mod image;
pub mod shuffle;
pub mod loader;
pub mod prefetcher;

pub use registry::{dataset_mappings, lookup, DatasetSpec, Split};
pub use tfrecord::{masked_crc32c, RecordReader, RecordWriter};
pub use example::{encode_labeled_image, parse_labeled_image, LabeledImage};
pub use image::{process_image, Image};
pub use shuffle::ShuffleBuffer;
pub use loader::{create_dataset, DataLoader, PipelineConfig};
pub use prefetcher::{parse_batch, Batch};
