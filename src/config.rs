//! Environment-driven configuration
//!
//! Every tunable has a compiled-in default; these variables override it.

use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::data::PipelineConfig;
use crate::storage::DownloadConfig;

pub const ENV_DATA_DIR: &str = "LA_DATA_DIR";
pub const ENV_SHUFFLE_BUFFER: &str = "LA_SHUFFLE_BUFFER";
pub const ENV_PREFETCH_DEPTH: &str = "LA_PREFETCH_DEPTH";
pub const ENV_DECODE_WORKERS: &str = "LA_DECODE_WORKERS";
pub const ENV_SEED: &str = "LA_SEED";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "LA_HTTP_TIMEOUT_SECS";
pub const ENV_DOWNLOAD_RETRIES: &str = "LA_DOWNLOAD_RETRIES";
pub const ENV_MIRROR_URL: &str = "LA_MIRROR_URL";

/// Default directory for TFRecord files
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Parse an environment variable, keeping `default` when unset or invalid
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring unparsable {}={:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_opt<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

/// Directory holding TFRecord files
pub fn data_dir_from_env() -> PathBuf {
    std::env::var(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR))
}

impl PipelineConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            shuffle_buffer: env_or(ENV_SHUFFLE_BUFFER, defaults.shuffle_buffer),
            prefetch_depth: env_or(ENV_PREFETCH_DEPTH, defaults.prefetch_depth),
            decode_workers: env_or(ENV_DECODE_WORKERS, defaults.decode_workers),
            seed: env_opt(ENV_SEED).or(defaults.seed),
            verify_checksums: defaults.verify_checksums,
        }
    }
}

impl DownloadConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var(ENV_MIRROR_URL).ok().or(defaults.base_url),
            request_timeout_secs: env_or(ENV_HTTP_TIMEOUT_SECS, defaults.request_timeout_secs),
            retries: env_or(ENV_DOWNLOAD_RETRIES, defaults.retries),
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_overrides() {
        std::env::set_var(ENV_SHUFFLE_BUFFER, "128");
        std::env::set_var(ENV_SEED, "7");
        std::env::set_var(ENV_PREFETCH_DEPTH, "not-a-number");
        std::env::set_var(ENV_DOWNLOAD_RETRIES, " 5 ");

        let pipeline = PipelineConfig::from_env();
        assert_eq!(pipeline.shuffle_buffer, 128);
        assert_eq!(pipeline.seed, Some(7));
        assert_eq!(pipeline.prefetch_depth, PipelineConfig::default().prefetch_depth);
        assert_eq!(DownloadConfig::from_env().retries, 5);

        for key in [ENV_SHUFFLE_BUFFER, ENV_SEED, ENV_PREFETCH_DEPTH, ENV_DOWNLOAD_RETRIES] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_env_or_unset() {
        assert_eq!(env_or("LA_TEST_SURELY_UNSET_VARIABLE", 3usize), 3);
    }
}
