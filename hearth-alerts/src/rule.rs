use crate::types::Severity;
use chrono::{DateTime, Utc};
use hearth_model::{Event, Value};
use regex::Regex;
use std::collections::BTreeMap;
use std::time::Duration;

/// Predicate operator set (§4.4 "identical to the attribute filter's set,
/// plus exists/not_exists"). Mirrors `hearth_pipeline::filters::attribute::AttributeOp`
/// without the user-fn variant — rule predicates are plain data, not closures.
#[derive(Debug, Clone)]
pub enum PredicateOp {
    Eq(Value),
    Ne(Value),
    Lt(f64),
    Le(f64),
    Gt(f64),
    Ge(f64),
    In(Vec<Value>),
    Contains(String),
    MatchesRegex(Regex),
    Exists,
    NotExists,
}

fn values_numerically_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// `field path + operator + value` (§3 "Alert rule"). Field paths resolve
/// left-to-right against the event's attribute bag; missing segments yield
/// null, which every operator except `exists`/`not_exists` treats as no-match.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub field_path: String,
    pub op: PredicateOp,
}

impl Predicate {
    pub fn new(field_path: impl Into<String>, op: PredicateOp) -> Self {
        Self {
            field_path: field_path.into(),
            op,
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        let resolved = event.resolve_path(&self.field_path);

        match &self.op {
            PredicateOp::Exists => resolved.is_some(),
            PredicateOp::NotExists => resolved.is_none(),
            _ => match resolved {
                None => false,
                Some(value) => match &self.op {
                    PredicateOp::Eq(expected) => values_numerically_equal(value, expected),
                    PredicateOp::Ne(expected) => !values_numerically_equal(value, expected),
                    PredicateOp::Lt(expected) => value.as_f64().is_some_and(|v| v < *expected),
                    PredicateOp::Le(expected) => value.as_f64().is_some_and(|v| v <= *expected),
                    PredicateOp::Gt(expected) => value.as_f64().is_some_and(|v| v > *expected),
                    PredicateOp::Ge(expected) => value.as_f64().is_some_and(|v| v >= *expected),
                    PredicateOp::In(set) => set.iter().any(|candidate| values_numerically_equal(value, candidate)),
                    PredicateOp::Contains(needle) => value.as_str().is_some_and(|s| s.contains(needle.as_str())),
                    PredicateOp::MatchesRegex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
                    PredicateOp::Exists | PredicateOp::NotExists => unreachable!(),
                },
            },
        }
    }
}

/// Threshold evaluation semantics (§4.4 "Threshold engine").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdType {
    Above,
    Below,
    Equals,
    NotEquals,
    PercentChange,
    TrendUp,
    TrendDown,
    Volatility,
    Outlier,
}

/// Aggregate used as the baseline for `percent_change` (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMethod {
    #[default]
    Latest,
    Avg,
    Min,
    Max,
    Sum,
}

/// A rule's optional threshold condition (§3). `value` is overloaded by
/// `kind`: comparison value for above/below/equals/not_equals, percent for
/// percent_change, slope sensitivity for trend_up/trend_down, coefficient of
/// variation for volatility, std-dev multiplier for outlier — matching the
/// single numeric `threshold_value` the data model affords each rule.
#[derive(Debug, Clone)]
pub struct Threshold {
    pub field_path: String,
    pub kind: ThresholdType,
    pub value: f64,
    pub aggregation: AggregationMethod,
}

impl Threshold {
    pub fn new(field_path: impl Into<String>, kind: ThresholdType, value: f64) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            value,
            aggregation: AggregationMethod::default(),
        }
    }

    pub fn with_aggregation(mut self, aggregation: AggregationMethod) -> Self {
        self.aggregation = aggregation;
        self
    }
}

/// Immutable alert rule definition (§3 "Alert rule").
#[derive(Debug, Clone)]
pub struct AlertRule {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub enabled: bool,
    pub predicates: Vec<Predicate>,
    pub threshold: Option<Threshold>,
    pub time_window: Duration,
    pub cooldown: Duration,
    pub notification_sinks: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    pub fn new(name: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: description.into(),
            severity,
            enabled: true,
            predicates: Vec::new(),
            threshold: None,
            time_window: Duration::from_secs(300),
            cooldown: Duration::from_secs(900),
            notification_sinks: Vec::new(),
            tags: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_time_window(mut self, time_window: Duration) -> Self {
        self.time_window = time_window;
        self
    }

    pub fn with_sink(mut self, sink_id: impl Into<String>) -> Self {
        self.notification_sinks.push(sink_id.into());
        self
    }

    /// All predicates AND'd together (§4.4 "Rule evaluation"). The
    /// threshold, if any, is evaluated separately by the caller since it
    /// needs the threshold engine's series state.
    pub fn predicates_match(&self, event: &Event) -> bool {
        self.predicates.iter().all(|p| p.matches(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_exists_ignores_value() {
        let predicate = Predicate::new("brightness", PredicateOp::Exists);
        let with_attr = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("brightness", 1_i64);
        let without = Event::new("light", "light.kitchen", "state_changed", 0);

        assert!(predicate.matches(&with_attr));
        assert!(!predicate.matches(&without));
    }

    #[test]
    fn predicate_gt_requires_numeric_value() {
        let predicate = Predicate::new("temperature", PredicateOp::Gt(30.0));
        let hot = Event::new("climate", "climate.den", "state_changed", 0).with_attribute("temperature", 35.0_f64);
        let mild = Event::new("climate", "climate.den", "state_changed", 0).with_attribute("temperature", 20.0_f64);

        assert!(predicate.matches(&hot));
        assert!(!predicate.matches(&mild));
    }

    #[test]
    fn rule_requires_every_predicate_to_match() {
        let rule = AlertRule::new("hot_and_bright", "combo", Severity::Warning)
            .with_predicate(Predicate::new("temperature", PredicateOp::Gt(30.0)))
            .with_predicate(Predicate::new("brightness", PredicateOp::Gt(100.0)));

        let both = Event::new("light", "light.kitchen", "state_changed", 0)
            .with_attribute("temperature", 35.0_f64)
            .with_attribute("brightness", 200_i64);
        let one = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("temperature", 35.0_f64);

        assert!(rule.predicates_match(&both));
        assert!(!rule.predicates_match(&one));
    }
}
