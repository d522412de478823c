//! Pipeline metrics
//!
//! Record, batch and download counters kept in a private prometheus
//! registry. Names follow `la_<area>_<metric>_<unit>`.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::LazyLock;

use crate::error::{LaError, Result};

/// Upper bounds for per-batch decode latency, in seconds
const BATCH_DURATION_BUCKETS: [f64; 12] = [
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

static METRICS: LazyLock<PipelineMetrics> =
    LazyLock::new(|| PipelineMetrics::new().expect("metric creation failed"));

/// Process-wide pipeline metrics
pub fn metrics() -> &'static PipelineMetrics {
    &METRICS
}

/// Metrics for the input pipeline and downloader, bound to one registry
pub struct PipelineMetrics {
    registry: Registry,
    /// TFRecord records read
    pub records_read: IntCounter,
    /// Records rejected by framing, checksum or proto checks
    pub corrupt_records: IntCounter,
    /// Decoded batches handed to consumers
    pub batches_produced: IntCounter,
    /// TFRecord bytes written by the downloader
    pub bytes_downloaded: IntCounter,
    /// Loaders with a running prefetcher
    pub active_loaders: IntGauge,
    /// Parse and augment time per batch
    pub batch_duration: Histogram,
}

impl PipelineMetrics {
    /// Create the metrics and register them with a fresh registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let records_read = IntCounter::new("la_records_read_total", "TFRecord records read")?;
        let corrupt_records =
            IntCounter::new("la_corrupt_records_total", "Records rejected as corrupt")?;
        let batches_produced = IntCounter::new(
            "la_batches_produced_total",
            "Decoded batches handed to consumers",
        )?;
        let bytes_downloaded =
            IntCounter::new("la_bytes_downloaded_total", "TFRecord bytes downloaded")?;
        let active_loaders =
            IntGauge::new("la_active_loaders", "Loaders with a running prefetcher")?;
        let batch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "la_batch_decode_duration_seconds",
                "Batch parse and augment latency",
            )
            .buckets(BATCH_DURATION_BUCKETS.to_vec()),
        )?;

        registry.register(Box::new(records_read.clone()))?;
        registry.register(Box::new(corrupt_records.clone()))?;
        registry.register(Box::new(batches_produced.clone()))?;
        registry.register(Box::new(bytes_downloaded.clone()))?;
        registry.register(Box::new(active_loaders.clone()))?;
        registry.register(Box::new(batch_duration.clone()))?;

        Ok(Self {
            registry,
            records_read,
            corrupt_records,
            batches_produced,
            bytes_downloaded,
            active_loaders,
            batch_duration,
        })
    }

    /// Render every registered metric in Prometheus text format
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| LaError::Internal {
                message: format!("Failed to encode metrics: {}", e),
            })?;
        String::from_utf8(buffer).map_err(|e| LaError::Internal {
            message: format!("Metrics are not UTF-8: {}", e),
        })
    }
}

/// Render the process-wide metrics in Prometheus text format
pub fn gather_metrics() -> Result<String> {
    metrics().encode()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_has_inf_bucket() {
        let m = PipelineMetrics::new().unwrap();
        m.batch_duration.observe(0.003);
        m.batch_duration.observe(100.0);

        let text = m.encode().unwrap();
        assert!(text.contains("# TYPE la_batch_decode_duration_seconds histogram"));
        // Buckets are cumulative and the overflow observation lands only in +Inf.
        assert!(text.contains("la_batch_decode_duration_seconds_bucket{le=\"0.005\"} 1"));
        assert!(text.contains("la_batch_decode_duration_seconds_bucket{le=\"2.5\"} 1"));
        assert!(text.contains("la_batch_decode_duration_seconds_bucket{le=\"+Inf\"} 2"));
        assert!(text.contains("la_batch_decode_duration_seconds_count 2"));
    }

    #[test]
    fn test_counters_and_gauge() {
        let m = PipelineMetrics::new().unwrap();
        m.records_read.inc();
        m.bytes_downloaded.inc_by(512);
        m.active_loaders.inc();
        m.active_loaders.inc();
        m.active_loaders.dec();

        assert_eq!(m.records_read.get(), 1);
        let text = m.encode().unwrap();
        assert!(text.contains("la_bytes_downloaded_total 512"));
        assert!(text.contains("la_active_loaders 1"));
        assert!(text.contains("# TYPE la_records_read_total counter"));
    }

    #[test]
    fn test_gather_lists_pipeline_metrics() {
        metrics().records_read.inc();
        let output = gather_metrics().unwrap();
        assert!(output.contains("la_records_read_total"));
        assert!(output.contains("la_corrupt_records_total"));
    }
}
