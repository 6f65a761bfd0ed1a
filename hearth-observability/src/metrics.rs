use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Label set for a single metric sample. A `BTreeMap` keeps label order
/// canonical so rendered output and dashmap keys agree without extra
/// sorting at read time.
pub type Labels = BTreeMap<String, String>;

pub fn labels(pairs: &[(&str, &str)]) -> Labels {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Debug, Default)]
struct HistogramState {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    /// Upper bound of each bucket; the last bucket is implicitly +Inf.
    bucket_bounds: Vec<f64>,
    bucket_counts: Vec<u64>,
}

impl HistogramState {
    fn new(bucket_bounds: Vec<f64>) -> Self {
        let bucket_counts = vec![0; bucket_bounds.len() + 1];
        Self {
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            bucket_bounds,
            bucket_counts,
        }
    }

    fn observe(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let idx = self
            .bucket_bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bucket_bounds.len());
        self.bucket_counts[idx] += 1;
    }
}

#[derive(Debug, Default)]
struct CounterFamily {
    series: DashMap<Labels, AtomicU64>,
}

impl CounterFamily {
    fn incr(&self, labels: Labels, delta: u64) {
        self.series
            .entry(labels)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(delta, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct GaugeFamily {
    series: DashMap<Labels, AtomicI64>,
}

impl GaugeFamily {
    fn set(&self, labels: Labels, value: i64) {
        self.series
            .entry(labels)
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }
}

struct HistogramFamily {
    bucket_bounds: Vec<f64>,
    series: DashMap<Labels, Mutex<HistogramState>>,
}

impl HistogramFamily {
    fn new(bucket_bounds: Vec<f64>) -> Self {
        Self {
            bucket_bounds,
            series: DashMap::new(),
        }
    }

    fn observe(&self, labels: Labels, value: f64) {
        let bounds = self.bucket_bounds.clone();
        self.series
            .entry(labels)
            .or_insert_with(|| Mutex::new(HistogramState::new(bounds)))
            .lock()
            .expect("histogram mutex poisoned")
            .observe(value);
    }
}

/// Default latency-shaped buckets, seconds. Used for batch-write-duration;
/// batch-size and batch-age histograms pick their own bounds at registration.
pub const DEFAULT_LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// An in-process, dependency-free metrics registry. Counters, gauges, and
/// histograms are each keyed by a stable metric name plus a label set so a
/// single registered family (e.g. `alerts_triggered_total`) can carry many
/// series (one per severity).
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<&'static str, CounterFamily>,
    gauges: DashMap<&'static str, GaugeFamily>,
    histograms: DashMap<&'static str, HistogramFamily>,
}

impl std::fmt::Debug for HistogramFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistogramFamily")
            .field("series_count", &self.series.len())
            .finish()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_counter(&self, name: &'static str, labels: Labels, delta: u64) {
        self.counters
            .entry(name)
            .or_default()
            .incr(labels, delta);
    }

    pub fn set_gauge(&self, name: &'static str, labels: Labels, value: i64) {
        self.gauges.entry(name).or_default().set(labels, value);
    }

    pub fn observe_histogram(&self, name: &'static str, bucket_bounds: &[f64], labels: Labels, value: f64) {
        self.histograms
            .entry(name)
            .or_insert_with(|| HistogramFamily::new(bucket_bounds.to_vec()))
            .observe(labels, value);
    }

    pub fn counter_value(&self, name: &str, labels: &Labels) -> u64 {
        self.counters
            .get(name)
            .and_then(|family| family.series.get(labels).map(|v| v.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }

    pub fn gauge_value(&self, name: &str, labels: &Labels) -> i64 {
        self.gauges
            .get(name)
            .and_then(|family| family.series.get(labels).map(|v| v.load(Ordering::Relaxed)))
            .unwrap_or(0)
    }

    /// Renders every registered series as newline-delimited
    /// `name{label="value",...} value` lines, Prometheus-text-adjacent but
    /// hand-rolled (the exposition format is an implementation detail, not
    /// a contract with a scraping library).
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        for entry in self.counters.iter() {
            let name = entry.key();
            for series in entry.value().series.iter() {
                render_line(&mut out, name, series.key(), series.value().load(Ordering::Relaxed) as f64);
            }
        }
        for entry in self.gauges.iter() {
            let name = entry.key();
            for series in entry.value().series.iter() {
                render_line(&mut out, name, series.key(), series.value().load(Ordering::Relaxed) as f64);
            }
        }
        for entry in self.histograms.iter() {
            let name = entry.key();
            for series in entry.value().series.iter() {
                let state = series.value().lock().expect("histogram mutex poisoned");
                render_line(&mut out, &format!("{name}_count"), series.key(), state.count as f64);
                render_line(&mut out, &format!("{name}_sum"), series.key(), state.sum);
                if state.count > 0 {
                    render_line(&mut out, &format!("{name}_min"), series.key(), state.min);
                    render_line(&mut out, &format!("{name}_max"), series.key(), state.max);
                }
            }
        }
        out
    }
}

fn render_line(out: &mut String, name: &str, labels: &Labels, value: f64) {
    if labels.is_empty() {
        out.push_str(&format!("{name} {value}\n"));
        return;
    }
    let rendered_labels = labels
        .iter()
        .map(|(k, v)| format!("{k}=\"{v}\""))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&format!("{name}{{{rendered_labels}}} {value}\n"));
}
