use crate::rule::{AggregationMethod, Threshold, ThresholdType};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct DataPoint {
    timestamp: DateTime<Utc>,
    value: f64,
}

/// Per-field-path ring of samples (§3 "Data-point series"), capped to
/// `series_retention` or `series_max_samples`, whichever is smaller.
pub struct ThresholdEngine {
    series: DashMap<String, Mutex<VecDeque<DataPoint>>>,
    retention: Duration,
    max_samples: usize,
}

impl ThresholdEngine {
    pub fn new(retention: Duration, max_samples: usize) -> Self {
        Self {
            series: DashMap::new(),
            retention,
            max_samples: max_samples.max(1),
        }
    }

    /// Records a sample and opportunistically trims the ring (§4.4
    /// "Data-point ingestion for thresholds").
    pub fn add_data_point(&self, field_path: &str, value: f64, timestamp: DateTime<Utc>) {
        let entry = self
            .series
            .entry(field_path.to_string())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut ring = entry
            .lock()
            .expect("threshold series mutex poisoned");

        ring.push_back(DataPoint { timestamp, value });

        while ring.len() > self.max_samples {
            ring.pop_front();
        }

        let cutoff = Utc::now() - ChronoDuration::from_std(self.retention).unwrap_or(ChronoDuration::zero());
        while ring.front().is_some_and(|point| point.timestamp < cutoff) {
            ring.pop_front();
        }
    }

    fn relevant_points(&self, field_path: &str, window: Duration) -> Vec<DataPoint> {
        let cutoff = Utc::now() - ChronoDuration::from_std(window).unwrap_or(ChronoDuration::zero());
        match self.series.get(field_path) {
            None => Vec::new(),
            Some(ring) => {
                let ring = ring.lock().expect("threshold series mutex poisoned");
                let mut points: Vec<DataPoint> = ring.iter().filter(|p| p.timestamp >= cutoff).copied().collect();
                points.sort_by_key(|p| p.timestamp);
                points
            }
        }
    }

    /// Evaluates a threshold condition against the current value and the
    /// in-window history (§4.4). Returns false when fewer than
    /// `min_data_points` samples fall inside the window.
    pub fn evaluate(
        &self,
        threshold: &Threshold,
        current_value: f64,
        time_window: Duration,
        min_data_points: usize,
    ) -> bool {
        let points = self.relevant_points(&threshold.field_path, time_window);
        if points.len() < min_data_points.max(2) {
            return false;
        }

        match threshold.kind {
            ThresholdType::Above => current_value > threshold.value,
            ThresholdType::Below => current_value < threshold.value,
            ThresholdType::Equals => (current_value - threshold.value).abs() < 1e-9,
            ThresholdType::NotEquals => (current_value - threshold.value).abs() >= 1e-9,
            ThresholdType::PercentChange => {
                let baseline = aggregate(&points, threshold.aggregation);
                if baseline == 0.0 {
                    return false;
                }
                let percent_change = ((current_value - baseline) / baseline).abs() * 100.0;
                percent_change > threshold.value
            }
            ThresholdType::TrendUp => linear_regression_slope(&points) > threshold.value,
            ThresholdType::TrendDown => linear_regression_slope(&points) < -threshold.value,
            ThresholdType::Volatility => {
                let values: Vec<f64> = points.iter().map(|p| p.value).collect();
                let mean = mean(&values);
                if mean == 0.0 {
                    return false;
                }
                stdev(&values, mean) / mean.abs() > threshold.value
            }
            ThresholdType::Outlier => {
                let values: Vec<f64> = points.iter().map(|p| p.value).collect();
                let mean = mean(&values);
                let std = stdev(&values, mean);
                if std == 0.0 {
                    return false;
                }
                (current_value - mean).abs() / std > threshold.value
            }
        }
    }
}

fn aggregate(points: &[DataPoint], method: AggregationMethod) -> f64 {
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    match method {
        AggregationMethod::Latest => *values.last().unwrap_or(&0.0),
        AggregationMethod::Avg => mean(&values),
        AggregationMethod::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        AggregationMethod::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        AggregationMethod::Sum => values.iter().sum(),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn stdev(values: &[f64], mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Least-squares slope over `(seconds-since-first-sample, value)` pairs
/// (§4.4 trend_up/trend_down).
fn linear_regression_slope(points: &[DataPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let origin = points[0].timestamp;
    let xs: Vec<f64> = points.iter().map(|p| (p.timestamp - origin).num_milliseconds() as f64 / 1000.0).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.value).collect();

    let n = xs.len() as f64;
    let sum_x: f64 = xs.iter().sum();
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = xs.iter().zip(&ys).map(|(x, y)| x * y).sum();
    let sum_x2: f64 = xs.iter().map(|x| x * x).sum();

    let denominator = n * sum_x2 - sum_x * sum_x;
    if denominator == 0.0 {
        return 0.0;
    }
    (n * sum_xy - sum_x * sum_y) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::ThresholdType;

    fn seed(engine: &ThresholdEngine, field: &str, values: &[f64]) {
        let now = Utc::now();
        for (i, v) in values.iter().enumerate() {
            engine.add_data_point(field, *v, now - ChronoDuration::seconds((values.len() - i) as i64));
        }
    }

    #[test]
    fn outlier_fires_for_far_off_current_value() {
        let engine = ThresholdEngine::new(Duration::from_secs(86_400), 10_000);
        seed(&engine, "temperature", &[20.0, 21.0, 19.0, 20.5, 20.0]);
        let threshold = Threshold::new("temperature", ThresholdType::Outlier, 2.0);

        assert!(engine.evaluate(&threshold, 50.0, Duration::from_secs(300), 3));
        assert!(!engine.evaluate(&threshold, 20.1, Duration::from_secs(300), 3));
    }

    #[test]
    fn below_min_data_points_never_fires() {
        let engine = ThresholdEngine::new(Duration::from_secs(86_400), 10_000);
        seed(&engine, "humidity", &[40.0, 41.0]);
        let threshold = Threshold::new("humidity", ThresholdType::Above, 10.0);

        assert!(!engine.evaluate(&threshold, 90.0, Duration::from_secs(300), 3));
    }

    #[test]
    fn trend_up_detects_rising_slope() {
        let engine = ThresholdEngine::new(Duration::from_secs(86_400), 10_000);
        seed(&engine, "power", &[1.0, 2.0, 3.0, 4.0, 5.0]);
        let threshold = Threshold::new("power", ThresholdType::TrendUp, 0.1);

        assert!(engine.evaluate(&threshold, 5.0, Duration::from_secs(300), 3));
    }

    #[test]
    fn percent_change_false_when_baseline_is_zero() {
        let engine = ThresholdEngine::new(Duration::from_secs(86_400), 10_000);
        seed(&engine, "delta", &[0.0, 0.0, 0.0]);
        let threshold = Threshold::new("delta", ThresholdType::PercentChange, 5.0);

        assert!(!engine.evaluate(&threshold, 10.0, Duration::from_secs(300), 3));
    }
}
