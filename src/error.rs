//! Error types for logit-adjust-core
//!
//! Error taxonomy covering downloads, record framing, example parsing,
//! image decoding and argument validation.

use thiserror::Error;

/// Primary error type for all crate operations
#[derive(Debug, Error)]
pub enum LaError {
    // ========== Storage Errors ==========

    /// HTTP request failed
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    /// Server answered with a non-success status
    #[error("HTTP status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// Local file system error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    // ========== Record Errors ==========

    /// Record cut short before its declared length
    #[error("Truncated record at byte offset {offset}")]
    TruncatedRecord { offset: u64 },

    /// Length or payload checksum mismatch
    #[error("Checksum mismatch at byte offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { offset: u64, expected: u32, actual: u32 },

    // ========== Example Errors ==========

    /// Record is not a valid Example proto
    #[error("Malformed example: {reason}")]
    MalformedExample { reason: String },

    /// Required feature absent
    #[error("Missing feature: {name}")]
    MissingFeature { name: String },

    /// Feature present with the wrong type or arity
    #[error("Invalid feature {name}: {reason}")]
    InvalidFeature { name: String, reason: String },

    /// Raw image payload has the wrong size
    #[error("Invalid image: expected {expected} bytes, got {actual}")]
    InvalidImage { expected: usize, actual: usize },

    // ========== Registry Errors ==========

    /// Dataset name not registered
    #[error("Dataset not found: {name} (known: {known})")]
    DatasetNotFound { name: String, known: String },

    // ========== Argument Errors ==========

    /// Caller passed an unusable argument
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Label outside the class range
    #[error("Label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: i64, num_classes: usize },

    // ========== Runtime Errors ==========

    /// Producer task stopped unexpectedly
    #[error("Pipeline stopped: {reason}")]
    PipelineStopped { reason: String },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LaError {
    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LaError::DownloadFailed { .. } => true,
            LaError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if this error indicates data corruption
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            LaError::TruncatedRecord { .. }
                | LaError::ChecksumMismatch { .. }
                | LaError::MalformedExample { .. }
                | LaError::InvalidImage { .. }
        )
    }

    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        LaError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        LaError::InvalidArgument {
            reason: reason.into(),
        }
    }
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, LaError>;
