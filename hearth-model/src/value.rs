use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Dynamic attribute value. Mirrors the upstream hub's free-form JSON
/// payloads: every event attribute and every nested registry field resolves
/// to one of these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Map(BTreeMap<String, Value>),
    List(Vec<Value>),
}

impl Value {
    /// Numeric coercion used by comparison operators (`<`, `>`, threshold
    /// evaluation, …). Only scalar numeric-ish variants parse; maps and
    /// lists never do.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Map(_) | Value::List(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Resolve a dotted field path against this value, walking nested maps
    /// left to right. Missing segments yield `None` rather than erroring —
    /// the alert engine and attribute filter both treat that as null.
    pub fn resolve_path<'a>(&'a self, path: &str) -> Option<&'a Value> {
        let mut current = self;
        for segment in path.split('.') {
            current = current.as_map()?.get(segment)?;
        }
        Some(current)
    }

    /// Stringify for use as a line-protocol tag value or field string value.
    /// Maps/lists are not representable as storage-point tags or fields;
    /// callers are expected to have already rejected those via `is_scalar`.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Map(_) | Value::List(_) => String::new(),
        }
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Map(_) | Value::List(_))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_path() {
        let mut inner = BTreeMap::new();
        inner.insert("area_id".to_string(), Value::String("kitchen".into()));
        let mut outer = BTreeMap::new();
        outer.insert("registry".to_string(), Value::Map(inner));
        let root = Value::Map(outer);

        assert_eq!(
            root.resolve_path("registry.area_id"),
            Some(&Value::String("kitchen".into()))
        );
        assert_eq!(root.resolve_path("registry.missing"), None);
        assert_eq!(root.resolve_path("missing.area_id"), None);
    }

    #[test]
    fn numeric_coercion_parses_strings() {
        assert_eq!(Value::String("21.5".into()).as_f64(), Some(21.5));
        assert_eq!(Value::String("not-a-number".into()).as_f64(), None);
        assert_eq!(Value::Bool(true).as_f64(), Some(1.0));
    }
}
