//! C6 supplement: download performance counters (§4.6 step 4 "emits a
//! metrics sample ... to C3").
//!
//! Trimmed down from the counter set in `crates/mesio/src/hls/metrics.rs` to
//! what this crate actually produces: no cache/decryption/buffer-pool
//! counters exist here, since those subsystems live outside this crate.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct PerformanceMetrics {
    pub downloads_total: AtomicU64,
    pub download_bytes_total: AtomicU64,
    pub download_latency_sum_ms: AtomicU64,
    pub download_errors: AtomicU64,
    pub retries_total: AtomicU64,
    pub cdn_failovers_total: AtomicU64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_download(&self, bytes: u64, latency_ms: u64) {
        self.downloads_total.fetch_add(1, Ordering::Relaxed);
        self.download_bytes_total.fetch_add(bytes, Ordering::Relaxed);
        self.download_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_download_error(&self) {
        self.download_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cdn_failover(&self) {
        self.cdn_failovers_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn average_download_latency_ms(&self) -> Option<f64> {
        let total = self.downloads_total.load(Ordering::Relaxed);
        if total == 0 {
            return None;
        }
        let sum = self.download_latency_sum_ms.load(Ordering::Relaxed);
        Some(sum as f64 / total as f64)
    }

    pub fn average_throughput_bytes_per_sec(&self) -> Option<f64> {
        let total_bytes = self.download_bytes_total.load(Ordering::Relaxed);
        let total_latency_ms = self.download_latency_sum_ms.load(Ordering::Relaxed);
        if total_latency_ms == 0 {
            return None;
        }
        Some(total_bytes as f64 / (total_latency_ms as f64 / 1000.0))
    }

    pub fn log_summary(&self) {
        info!(
            downloads = self.downloads_total.load(Ordering::Relaxed),
            download_bytes = self.download_bytes_total.load(Ordering::Relaxed),
            download_errors = self.download_errors.load(Ordering::Relaxed),
            retries = self.retries_total.load(Ordering::Relaxed),
            cdn_failovers = self.cdn_failovers_total.load(Ordering::Relaxed),
            "segment fetch performance summary"
        );
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            downloads_total: self.downloads_total.load(Ordering::Relaxed),
            download_bytes_total: self.download_bytes_total.load(Ordering::Relaxed),
            download_latency_sum_ms: self.download_latency_sum_ms.load(Ordering::Relaxed),
            download_errors: self.download_errors.load(Ordering::Relaxed),
            retries_total: self.retries_total.load(Ordering::Relaxed),
            cdn_failovers_total: self.cdn_failovers_total.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all counters, safe to hand to a caller without
/// exposing the atomics themselves.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub downloads_total: u64,
    pub download_bytes_total: u64,
    pub download_latency_sum_ms: u64,
    pub download_errors: u64,
    pub retries_total: u64,
    pub cdn_failovers_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_report_no_average() {
        let metrics = PerformanceMetrics::new();
        assert!(metrics.average_download_latency_ms().is_none());
        assert!(metrics.average_throughput_bytes_per_sec().is_none());
    }

    #[test]
    fn average_latency_is_sum_over_count() {
        let metrics = PerformanceMetrics::new();
        metrics.record_download(1000, 100);
        metrics.record_download(1000, 300);
        assert_eq!(metrics.average_download_latency_ms(), Some(200.0));
    }

    #[test]
    fn throughput_converts_ms_latency_to_bytes_per_second() {
        let metrics = PerformanceMetrics::new();
        metrics.record_download(1000, 100);
        let throughput = metrics.average_throughput_bytes_per_sec().unwrap();
        assert!((throughput - 10_000.0).abs() < 0.001);
    }

    #[test]
    fn snapshot_reflects_recorded_counters() {
        let metrics = PerformanceMetrics::new();
        metrics.record_download(500, 50);
        metrics.record_download_error();
        metrics.record_retry();
        metrics.record_cdn_failover();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.downloads_total, 1);
        assert_eq!(snapshot.download_bytes_total, 500);
        assert_eq!(snapshot.download_errors, 1);
        assert_eq!(snapshot.retries_total, 1);
        assert_eq!(snapshot.cdn_failovers_total, 1);
    }
}
