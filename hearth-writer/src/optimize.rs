use hearth_model::StoragePoint;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadType {
    HighCardinality,
    WideMetrics,
    SimpleMetrics,
    MultiSource,
    Burst,
    Mixed,
}

impl WorkloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadType::HighCardinality => "high_cardinality",
            WorkloadType::WideMetrics => "wide_metrics",
            WorkloadType::SimpleMetrics => "simple_metrics",
            WorkloadType::MultiSource => "multi_source",
            WorkloadType::Burst => "burst",
            WorkloadType::Mixed => "mixed",
        }
    }
}

const NANOS_PER_HOUR: i64 = 3_600_000_000_000;

/// A batch large enough that "mostly duplicate points within a couple of
/// hours" is a meaningfully distinct shape from a small, merely-quiet
/// batch that happens to share an hour bucket.
const BURST_MIN_BATCH_SIZE: usize = 20;

/// Number of distinct hour-wide buckets the batch's timestamps fall into.
fn distinct_hour_buckets(points: &[StoragePoint]) -> usize {
    points
        .iter()
        .map(|p| p.timestamp_ns.div_euclid(NANOS_PER_HOUR))
        .collect::<HashSet<_>>()
        .len()
}

/// Classifies a batch by measurement/tag/field shape (§4.3 "batch
/// optimization"). A large batch whose timestamps cluster into at most two
/// distinct hours is a burst; a single-measurement batch with many tags is
/// treated as high-cardinality; many fields per point as wide-metrics; many
/// distinct measurements as multi-source; everything else as mixed.
pub fn detect_workload(points: &[StoragePoint]) -> WorkloadType {
    if points.is_empty() {
        return WorkloadType::Mixed;
    }

    if points.len() >= BURST_MIN_BATCH_SIZE && distinct_hour_buckets(points) <= 2 {
        return WorkloadType::Burst;
    }

    let measurements: HashSet<&str> = points.iter().map(|p| p.measurement.as_str()).collect();
    let avg_tags = points.iter().map(|p| p.tags.len()).sum::<usize>() as f64 / points.len() as f64;
    let avg_fields = points.iter().map(|p| p.fields.len()).sum::<usize>() as f64 / points.len() as f64;

    if measurements.len() == 1 {
        if avg_tags > 5.0 {
            WorkloadType::HighCardinality
        } else if avg_fields > 10.0 {
            WorkloadType::WideMetrics
        } else {
            WorkloadType::SimpleMetrics
        }
    } else if measurements.len() > 10 {
        WorkloadType::MultiSource
    } else {
        WorkloadType::Mixed
    }
}

/// Applies a workload-specific optimization pass (§4.3). Every strategy is
/// a pure transform of the batch; none of them change point count except
/// where they explicitly dedup or merge.
pub fn optimize(points: Vec<StoragePoint>, workload: WorkloadType) -> Vec<StoragePoint> {
    match workload {
        WorkloadType::HighCardinality => optimize_high_cardinality(points),
        WorkloadType::WideMetrics => optimize_wide_metrics(points),
        WorkloadType::SimpleMetrics | WorkloadType::Burst => dedupe_by_identity(points),
        WorkloadType::MultiSource => group_by_measurement(points),
        WorkloadType::Mixed => points,
    }
}

const ESSENTIAL_TAGS: &[&str] = &["entity_id", "location", "device_class", "domain"];

fn optimize_high_cardinality(mut points: Vec<StoragePoint>) -> Vec<StoragePoint> {
    points.sort_by(|a, b| a.measurement.cmp(&b.measurement).then_with(|| a.tags.cmp(&b.tags)));

    let mut variable_keys: HashMap<String, HashSet<String>> = HashMap::new();
    for point in &points {
        for (k, v) in &point.tags {
            variable_keys.entry(k.clone()).or_default().insert(v.clone());
        }
    }

    for point in &mut points {
        point.tags.retain(|k, _| {
            ESSENTIAL_TAGS.contains(&k.as_str()) || variable_keys.get(k.as_str()).is_some_and(|values| values.len() > 1)
        });
    }
    points
}

fn optimize_wide_metrics(points: Vec<StoragePoint>) -> Vec<StoragePoint> {
    let mut groups: indexmap_like::OrderPreservingMap = indexmap_like::OrderPreservingMap::new();
    for point in points {
        groups.merge(point);
    }
    groups.into_points()
}

fn dedupe_by_identity(mut points: Vec<StoragePoint>) -> Vec<StoragePoint> {
    points.sort_by_key(|p| p.timestamp_ns);
    let mut seen = HashSet::new();
    points.retain(|p| seen.insert(p.identity_key()));
    points
}

fn group_by_measurement(mut points: Vec<StoragePoint>) -> Vec<StoragePoint> {
    points.sort_by(|a, b| a.measurement.cmp(&b.measurement).then_with(|| a.timestamp_ns.cmp(&b.timestamp_ns)));
    points
}

/// Minimal insertion-ordered grouping helper for the wide-metrics
/// strategy, kept local since the crate has no dependency on an indexmap
/// library and this is the only place that needs ordered grouping.
mod indexmap_like {
    use super::*;

    pub struct OrderPreservingMap {
        order: Vec<(String, i64, Vec<(String, String)>)>,
        groups: HashMap<(String, i64, Vec<(String, String)>), StoragePoint>,
    }

    impl OrderPreservingMap {
        pub fn new() -> Self {
            Self {
                order: Vec::new(),
                groups: HashMap::new(),
            }
        }

        pub fn merge(&mut self, point: StoragePoint) {
            let key = point.identity_key();
            match self.groups.get_mut(&key) {
                Some(existing) => {
                    existing.fields.extend(point.fields);
                }
                None => {
                    self.order.push(key.clone());
                    self.groups.insert(key, point);
                }
            }
        }

        pub fn into_points(mut self) -> Vec<StoragePoint> {
            self.order.drain(..).filter_map(|key| self.groups.remove(&key)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_model::FieldValue;

    fn point(measurement: &str, tags: &[(&str, &str)], fields: usize) -> StoragePoint {
        let mut builder = StoragePoint::builder(measurement, 0);
        for (k, v) in tags {
            builder = builder.tag(*k, Some(v.to_string()));
        }
        for i in 0..fields.max(1) {
            builder = builder.field(format!("f{i}"), FieldValue::Int(i as i64));
        }
        builder.build()
    }

    #[test]
    fn single_measurement_many_tags_is_high_cardinality() {
        let points = vec![point("light", &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5"), ("f", "6")], 1)];
        assert_eq!(detect_workload(&points), WorkloadType::HighCardinality);
    }

    #[test]
    fn single_measurement_many_fields_is_wide_metrics() {
        let points = vec![point("sensor", &[], 12)];
        assert_eq!(detect_workload(&points), WorkloadType::WideMetrics);
    }

    #[test]
    fn large_batch_clustered_in_two_hours_is_burst() {
        let points: Vec<_> = (0..25)
            .map(|i| {
                let mut p = point("light", &[("entity_id", "light.kitchen")], 1);
                // Only two distinct timestamps, one per hour bucket, so every point
                // is a duplicate of one of two identities.
                p.timestamp_ns = if i % 2 == 0 { 0 } else { NANOS_PER_HOUR };
                p
            })
            .collect();
        assert_eq!(detect_workload(&points), WorkloadType::Burst);

        let optimized = optimize(points, WorkloadType::Burst);
        assert_eq!(optimized.len(), 2, "burst optimization cheaply dedupes by identity");
    }

    #[test]
    fn small_batch_in_one_hour_is_not_burst() {
        let points = vec![point("light", &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4"), ("e", "5"), ("f", "6")], 1)];
        assert_ne!(detect_workload(&points), WorkloadType::Burst);
    }

    #[test]
    fn many_measurements_is_multi_source() {
        let points: Vec<_> = (0..12).map(|i| point(&format!("m{i}"), &[], 1)).collect();
        assert_eq!(detect_workload(&points), WorkloadType::MultiSource);
    }

    #[test]
    fn dedupe_by_identity_drops_exact_duplicates() {
        let a = point("light", &[("entity_id", "light.kitchen")], 1);
        let b = a.clone();
        let deduped = dedupe_by_identity(vec![a, b]);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn wide_metrics_merges_fields_for_identical_identity() {
        let mut a = point("sensor", &[("entity_id", "s.1")], 1);
        a.fields.insert("temp".to_string(), FieldValue::Float(1.0));
        let mut b = point("sensor", &[("entity_id", "s.1")], 1);
        b.fields.clear();
        b.fields.insert("humidity".to_string(), FieldValue::Float(2.0));

        let merged = optimize_wide_metrics(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].fields.contains_key("temp"));
        assert!(merged[0].fields.contains_key("humidity"));
    }
}
