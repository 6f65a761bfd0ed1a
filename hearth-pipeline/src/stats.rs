use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Snapshot returned by `Pipeline::stats()` (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct PipelineStats {
    pub submitted: u64,
    pub deduplicated: u64,
    pub filtered: u64,
    pub transformed: u64,
    pub stored: u64,
    pub failed: u64,
    pub avg_latency_ms: f64,
    pub queue_depth: usize,
}

#[derive(Debug, Default)]
pub struct StatsCollector {
    submitted: AtomicU64,
    deduplicated: AtomicU64,
    filtered: AtomicU64,
    transformed: AtomicU64,
    stored: AtomicU64,
    failed: AtomicU64,
    latency_total_micros: AtomicU64,
    latency_samples: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transformed(&self, count: u64) {
        self.transformed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_stored(&self) {
        self.stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_latency(&self, started: Instant) {
        let micros = started.elapsed().as_micros().min(u64::MAX as u128) as u64;
        self.latency_total_micros.fetch_add(micros, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, queue_depth: usize) -> PipelineStats {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let avg_latency_ms = if samples == 0 {
            0.0
        } else {
            (self.latency_total_micros.load(Ordering::Relaxed) as f64 / samples as f64) / 1000.0
        };

        PipelineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            transformed: self.transformed.load(Ordering::Relaxed),
            stored: self.stored.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            avg_latency_ms,
            queue_depth,
        }
    }
}
