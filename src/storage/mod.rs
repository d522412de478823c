//! Remote storage access
//!
//! HTTP download of published TFRecord files.

pub mod download;

pub use download::{
    AlwaysOverwrite, DownloadConfig, DownloadOutcome, Downloader, NeverOverwrite, OverwritePrompt,
    StdinPrompt, TFRECORD_URLS,
};
