use super::Filter;
use hearth_model::{Event, Value};
use regex::Regex;
use std::sync::Arc;

/// `event.attributes[key] op value` (§4.2 filter kinds table).
pub enum AttributeOp {
    Eq(Value),
    Ne(Value),
    Lt(f64),
    Le(f64),
    Gt(f64),
    Ge(f64),
    In(Vec<Value>),
    Contains(String),
    MatchesRegex(Regex),
    UserFn(Arc<dyn Fn(&Value) -> bool + Send + Sync>),
}

fn values_numerically_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

impl AttributeOp {
    fn evaluate(&self, value: &Value) -> bool {
        match self {
            AttributeOp::Eq(expected) => values_numerically_equal(value, expected),
            AttributeOp::Ne(expected) => !values_numerically_equal(value, expected),
            AttributeOp::Lt(expected) => value.as_f64().is_some_and(|v| v < *expected),
            AttributeOp::Le(expected) => value.as_f64().is_some_and(|v| v <= *expected),
            AttributeOp::Gt(expected) => value.as_f64().is_some_and(|v| v > *expected),
            AttributeOp::Ge(expected) => value.as_f64().is_some_and(|v| v >= *expected),
            AttributeOp::In(set) => set.iter().any(|candidate| values_numerically_equal(value, candidate)),
            AttributeOp::Contains(needle) => value.as_str().is_some_and(|s| s.contains(needle.as_str())),
            AttributeOp::MatchesRegex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
            AttributeOp::UserFn(f) => f(value),
        }
    }
}

pub struct AttributeFilter {
    name: String,
    field_path: String,
    op: AttributeOp,
}

impl AttributeFilter {
    pub fn new(name: impl Into<String>, field_path: impl Into<String>, op: AttributeOp) -> Self {
        Self {
            name: name.into(),
            field_path: field_path.into(),
            op,
        }
    }
}

impl Filter for AttributeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn should_process(&self, event: &Event) -> bool {
        match event.resolve_path(&self.field_path) {
            Some(value) => self.op.evaluate(value),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greater_than_on_numeric_attribute() {
        let filter = AttributeFilter::new("bright_lights", "brightness", AttributeOp::Gt(100.0));
        let bright = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("brightness", 200_i64);
        let dim = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("brightness", 10_i64);

        assert!(filter.should_process(&bright));
        assert!(!filter.should_process(&dim));
    }

    #[test]
    fn missing_attribute_never_matches() {
        let filter = AttributeFilter::new("has_brightness", "brightness", AttributeOp::Gt(0.0));
        let event = Event::new("light", "light.kitchen", "state_changed", 0);
        assert!(!filter.should_process(&event));
    }

    #[test]
    fn in_operator_checks_membership() {
        let filter = AttributeFilter::new(
            "known_states",
            "state",
            AttributeOp::In(vec![Value::String("on".into()), Value::String("off".into())]),
        );
        let on = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("state", "on");
        let dimming = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("state", "dimming");

        assert!(filter.should_process(&on));
        assert!(!filter.should_process(&dimming));
    }
}
