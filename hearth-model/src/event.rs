use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical in-memory event produced by the connection manager. Immutable
/// once built — downstream transforms always produce a new `Event` rather
/// than mutating this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Coarse type, e.g. `light`, `climate`, `binary_sensor`.
    pub domain: String,
    /// `domain.name`, e.g. `light.kitchen`.
    pub entity_id: String,
    /// `state_changed`, `device_registry_updated`, …
    pub event_type: String,
    /// Nanoseconds since the Unix epoch.
    pub timestamp_ns: i64,
    pub attributes: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(
        domain: impl Into<String>,
        entity_id: impl Into<String>,
        event_type: impl Into<String>,
        timestamp_ns: i64,
    ) -> Self {
        Self {
            domain: domain.into(),
            entity_id: entity_id.into(),
            event_type: event_type.into(),
            timestamp_ns,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Resolve a dotted path rooted at the attribute bag, e.g.
    /// `"weather.main.temp"`.
    pub fn resolve_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.splitn(2, '.');
        let head = parts.next()?;
        let rest = parts.next();
        let value = self.attributes.get(head)?;
        match rest {
            Some(rest) => value.resolve_path(rest),
            None => Some(value),
        }
    }

    /// A clone with `attributes` replaced — the shape every transform/filter
    /// uses instead of mutating in place.
    pub fn with_attributes(&self, attributes: BTreeMap<String, Value>) -> Self {
        Self {
            attributes,
            ..self.clone()
        }
    }

    /// Numeric attributes eligible for automatic threshold-series ingestion
    /// (§4.4 "Data-point ingestion for thresholds"): well-known keys plus any
    /// other attribute that parses as a number.
    pub fn numeric_attributes(&self) -> impl Iterator<Item = (&str, f64)> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|f| (k.as_str(), f)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_top_level_and_nested_attributes() {
        let event = Event::new("light", "light.kitchen", "state_changed", 0)
            .with_attribute("brightness", 200_i64)
            .with_attribute("state", "on");

        assert_eq!(event.attribute("state"), Some(&Value::String("on".into())));
        assert_eq!(event.resolve_path("brightness"), Some(&Value::Int(200)));
        assert_eq!(event.resolve_path("missing"), None);
    }

    #[test]
    fn numeric_attributes_skips_non_numeric() {
        let event = Event::new("climate", "climate.den", "state_changed", 0)
            .with_attribute("temperature", 21.5_f64)
            .with_attribute("unit", "celsius");

        let numeric: Vec<_> = event.numeric_attributes().collect();
        assert_eq!(numeric, vec![("temperature", 21.5)]);
    }
}
