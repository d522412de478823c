//! TFRecord downloader
//!
//! Fetches the published long-tailed CIFAR TFRecord files over HTTP using
//! reqwest, asking before it overwrites an existing file.

use bytes::Bytes;
use reqwest::Client;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{LaError, Result};
use crate::metrics::metrics;

/// Longest pause between download attempts
const MAX_BACKOFF_MS: u64 = 10_000;

/// Host path the published files live under
pub const DEFAULT_BASE_URL: &str = "http://storage.googleapis.com/gresearch/logit_adjustment";

/// Download key -> published URL
pub const TFRECORD_URLS: [(&str, &str); 4] = [
    (
        "train10",
        "http://storage.googleapis.com/gresearch/logit_adjustment/cifar10-lt_train.tfrecord",
    ),
    (
        "test10",
        "http://storage.googleapis.com/gresearch/logit_adjustment/cifar10_test.tfrecord",
    ),
    (
        "train100",
        "http://storage.googleapis.com/gresearch/logit_adjustment/cifar100-lt_train.tfrecord",
    ),
    (
        "test100",
        "http://storage.googleapis.com/gresearch/logit_adjustment/cifar100_test.tfrecord",
    ),
];

/// Published URL for a key
pub fn tfrecord_url(key: &str) -> Option<&'static str> {
    TFRECORD_URLS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, url)| *url)
}

/// Configuration for the downloader
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Replaces [`DEFAULT_BASE_URL`], e.g. for a mirror
    pub base_url: Option<String>,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Attempts per file for retryable failures
    pub retries: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 600,
            retries: 3,
        }
    }
}

/// Decides whether an existing file gets replaced.
///
/// Called on the blocking pool, so implementations may wait on the terminal.
pub trait OverwritePrompt: Send + Sync {
    fn confirm_overwrite(&self, path: &Path) -> Result<bool>;
}

/// Asks on the terminal; only `y` (any case, surrounding space ignored) overwrites
pub struct StdinPrompt;

impl OverwritePrompt for StdinPrompt {
    fn confirm_overwrite(&self, path: &Path) -> Result<bool> {
        let mut stdout = std::io::stdout();
        write!(
            stdout,
            "The file '{}' already exists. Do you want to overwrite it? (y/n): ",
            path.display()
        )
        .and_then(|_| stdout.flush())
        .map_err(|e| LaError::io("<stdout>", e))?;

        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .map_err(|e| LaError::io("<stdin>", e))?;
        Ok(is_yes(&answer))
    }
}

/// Always replaces existing files
pub struct AlwaysOverwrite;

impl OverwritePrompt for AlwaysOverwrite {
    fn confirm_overwrite(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }
}

/// Never replaces existing files
pub struct NeverOverwrite;

impl OverwritePrompt for NeverOverwrite {
    fn confirm_overwrite(&self, _path: &Path) -> Result<bool> {
        Ok(false)
    }
}

fn is_yes(answer: &str) -> bool {
    answer.trim().to_lowercase() == "y"
}

/// What happened to one requested file
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    Skipped { path: PathBuf },
    Failed { key: String, reason: String },
}

/// HTTP client for the TFRecord files
pub struct Downloader {
    client: Client,
    config: DownloadConfig,
}

impl Downloader {
    /// Create a new downloader
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| LaError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, config })
    }

    /// URL to fetch for a key, honoring the base URL override
    pub fn url_for(&self, key: &str) -> Option<String> {
        let url = tfrecord_url(key)?;
        match &self.config.base_url {
            Some(base) => {
                let name = file_name(url);
                Some(format!("{}/{}", base.trim_end_matches('/'), name))
            }
            None => Some(url.to_string()),
        }
    }

    /// Fetch a URL into memory
    pub async fn get(&self, url: &str) -> Result<Bytes> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LaError::DownloadFailed {
                url: url.into(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(LaError::HttpStatus {
                url: url.into(),
                status: resp.status().as_u16(),
            });
        }

        resp.bytes().await.map_err(|e| LaError::DownloadFailed {
            url: url.into(),
            message: format!("Failed to read body: {}", e),
        })
    }

    /// Fetch with exponential backoff on retryable failures
    pub async fn get_with_retry(&self, url: &str) -> Result<Bytes> {
        let attempts = self.config.retries.max(1);
        let mut attempt = 0;
        loop {
            match self.get(url).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    warn!("Get attempt {}/{} for {} failed: {}", attempt + 1, attempts, url, e);
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Download the files named by `keys` into `data_dir`.
    ///
    /// Unknown keys are ignored. A failure on one file is recorded and the
    /// remaining files are still attempted.
    pub async fn download_tfrecords<S: AsRef<str>>(
        &self,
        keys: &[S],
        data_dir: impl AsRef<Path>,
        prompt: Arc<dyn OverwritePrompt>,
    ) -> Result<Vec<DownloadOutcome>> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| LaError::io(data_dir, e))?;

        let mut outcomes = Vec::new();
        for key in keys {
            let key = key.as_ref();
            let Some(url) = self.url_for(key) else {
                warn!("Ignoring unknown TFRecord key '{}'", key);
                continue;
            };
            let path = data_dir.join(file_name(&url));

            if tokio::fs::try_exists(&path).await.unwrap_or(false)
                && !confirm_overwrite(&prompt, &path).await?
            {
                info!("Skipped '{}'", path.display());
                outcomes.push(DownloadOutcome::Skipped { path });
                continue;
            }

            match self.fetch_to(&url, &path).await {
                Ok(bytes) => {
                    info!("Downloaded '{}' to '{}'", path.display(), data_dir.display());
                    outcomes.push(DownloadOutcome::Downloaded { path, bytes });
                }
                Err(e) => {
                    error!("An error occurred while downloading the TFRecord file: {}", e);
                    outcomes.push(DownloadOutcome::Failed {
                        key: key.into(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(outcomes)
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> Result<u64> {
        let data = self.get_with_retry(url).await?;
        let len = data.len() as u64;

        let mut partial = path.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        tokio::fs::write(&partial, &data)
            .await
            .map_err(|e| LaError::io(&partial, e))?;
        tokio::fs::rename(&partial, path)
            .await
            .map_err(|e| LaError::io(path, e))?;

        metrics().bytes_downloaded.inc_by(len);
        debug!("Wrote {} bytes to {}", len, path.display());
        Ok(len)
    }
}

async fn confirm_overwrite(prompt: &Arc<dyn OverwritePrompt>, path: &Path) -> Result<bool> {
    let prompt = prompt.clone();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || prompt.confirm_overwrite(&path))
        .await
        .map_err(|e| LaError::Internal {
            message: format!("overwrite prompt failed: {}", e),
        })?
}

/// Pause before retry number `attempt + 1`: 100ms doubling, capped
fn backoff_delay(attempt: u32) -> Duration {
    let ms = 2u64
        .checked_pow(attempt)
        .map_or(MAX_BACKOFF_MS, |factor| factor.saturating_mul(100))
        .min(MAX_BACKOFF_MS);
    Duration::from_millis(ms)
}

fn file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_table() {
        assert_eq!(TFRECORD_URLS.len(), 4);
        assert!(tfrecord_url("train100").unwrap().ends_with("cifar100-lt_train.tfrecord"));
        assert!(tfrecord_url("train-10").is_none());
        for (_, url) in TFRECORD_URLS {
            assert!(url.starts_with(DEFAULT_BASE_URL));
        }
    }

    #[test]
    fn test_base_url_override() {
        let downloader = Downloader::new(DownloadConfig {
            base_url: Some("http://127.0.0.1:8080/mirror/".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            downloader.url_for("test10").unwrap(),
            "http://127.0.0.1:8080/mirror/cifar10_test.tfrecord"
        );
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(100));
        assert_eq!(backoff_delay(1), Duration::from_millis(200));
        assert_eq!(backoff_delay(6), Duration::from_millis(6_400));
        assert_eq!(backoff_delay(7), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(60), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(64), Duration::from_millis(MAX_BACKOFF_MS));
        assert_eq!(backoff_delay(u32::MAX), Duration::from_millis(MAX_BACKOFF_MS));
    }

    #[test]
    fn test_answer_parsing() {
        assert!(is_yes("y\n"));
        assert!(is_yes("  Y "));
        assert!(!is_yes("yes"));
        assert!(!is_yes("n"));
        assert!(!is_yes(""));
    }
}
