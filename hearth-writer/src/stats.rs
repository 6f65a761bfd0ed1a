use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
pub struct WriterStats {
    pub points_written: u64,
    pub points_failed: u64,
    pub batches_processed: u64,
    pub pending_points: usize,
    pub avg_batch_size: f64,
    pub avg_write_time_ms: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchPerformance {
    pub throughput_points_per_second: f64,
    pub avg_batch_size: f64,
    pub avg_write_time_ms: f64,
    pub efficiency_ratio: f64,
}

#[derive(Default)]
struct Totals {
    write_time: Duration,
    batch_age: Duration,
}

/// Counters backing `Writer::stats()`/`batch_performance()` (§4.3). Mirrors
/// the pipeline's `StatsCollector` shape: atomics for hot-path counters, a
/// small mutex for the few aggregate durations.
#[derive(Default)]
pub struct WriterStatsCollector {
    points_written: AtomicU64,
    points_failed: AtomicU64,
    batches_processed: AtomicU64,
    last_write: Mutex<Option<Instant>>,
    totals: Mutex<Totals>,
}

impl WriterStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch_success(&self, points: usize, write_time: Duration, batch_age: Duration) {
        self.points_written.fetch_add(points as u64, Ordering::Relaxed);
        self.batches_processed.fetch_add(1, Ordering::Relaxed);
        *self.last_write.lock().expect("stats mutex poisoned") = Some(Instant::now());
        let mut totals = self.totals.lock().expect("stats mutex poisoned");
        totals.write_time += write_time;
        totals.batch_age += batch_age;
    }

    pub fn record_batch_failure(&self, points: usize) {
        self.points_failed.fetch_add(points as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pending_points: usize) -> WriterStats {
        let batches = self.batches_processed.load(Ordering::Relaxed);
        let written = self.points_written.load(Ordering::Relaxed);
        let totals = self.totals.lock().expect("stats mutex poisoned");

        WriterStats {
            points_written: written,
            points_failed: self.points_failed.load(Ordering::Relaxed),
            batches_processed: batches,
            pending_points,
            avg_batch_size: if batches > 0 { written as f64 / batches as f64 } else { 0.0 },
            avg_write_time_ms: if batches > 0 {
                (totals.write_time.as_secs_f64() / batches as f64) * 1000.0
            } else {
                0.0
            },
        }
    }

    pub fn batch_performance(&self) -> BatchPerformance {
        let batches = self.batches_processed.load(Ordering::Relaxed);
        if batches == 0 {
            return BatchPerformance::default();
        }
        let written = self.points_written.load(Ordering::Relaxed);
        let totals = self.totals.lock().expect("stats mutex poisoned");
        let avg_write_time = totals.write_time.as_secs_f64() / batches as f64;
        let avg_batch_age = totals.batch_age.as_secs_f64() / batches as f64;

        BatchPerformance {
            throughput_points_per_second: if avg_write_time > 0.0 {
                written as f64 / totals.write_time.as_secs_f64()
            } else {
                0.0
            },
            avg_batch_size: written as f64 / batches as f64,
            avg_write_time_ms: avg_write_time * 1000.0,
            efficiency_ratio: if avg_batch_age > 0.0 { avg_write_time / avg_batch_age } else { 0.0 },
        }
    }
}
