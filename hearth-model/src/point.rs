use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl FieldValue {
    fn is_valid(&self) -> bool {
        match self {
            FieldValue::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

/// A single line-protocol point. `tags`/`fields` are kept in a `BTreeMap` so
/// iteration is always lexicographically ordered — the encoder relies on
/// this rather than sorting at serialization time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp_ns: i64,
}

#[derive(Debug, Error, PartialEq)]
pub enum PointValidationError {
    #[error("measurement name is empty")]
    EmptyMeasurement,
    #[error("measurement name exceeds {MAX_NAME_LEN} characters")]
    MeasurementTooLong,
    #[error("measurement name contains a disallowed character")]
    InvalidMeasurementChar,
    #[error("point has no fields")]
    NoFields,
    #[error("key '{0}' is empty")]
    EmptyKey(&'static str),
    #[error("key '{0}' exceeds {MAX_NAME_LEN} characters")]
    KeyTooLong(String),
    #[error("key '{0}' contains a disallowed character")]
    InvalidKeyChar(String),
    #[error("field '{0}' is not a representable numeric value (NaN/Inf)")]
    UnrepresentableField(String),
}

fn is_valid_measurement_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn contains_disallowed_key_char(s: &str) -> bool {
    s.chars()
        .any(|c| matches!(c, '=' | ' ' | ',' | '\n' | '\r' | '\t'))
}

impl StoragePoint {
    pub fn builder(measurement: impl Into<String>, timestamp_ns: i64) -> StoragePointBuilder {
        StoragePointBuilder {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp_ns,
        }
    }

    /// Validate every invariant from §3: non-empty measurement/keys, length
    /// caps, disallowed characters, no-null fields. Called before a point is
    /// ever handed to the writer.
    pub fn validate(&self) -> Result<(), PointValidationError> {
        if self.measurement.is_empty() {
            return Err(PointValidationError::EmptyMeasurement);
        }
        if self.measurement.len() > MAX_NAME_LEN {
            return Err(PointValidationError::MeasurementTooLong);
        }
        if !self.measurement.chars().all(is_valid_measurement_char) {
            return Err(PointValidationError::InvalidMeasurementChar);
        }
        if self.fields.is_empty() {
            return Err(PointValidationError::NoFields);
        }
        for (k, v) in &self.tags {
            if k.is_empty() {
                return Err(PointValidationError::EmptyKey("tag"));
            }
            if k.len() > MAX_NAME_LEN || v.len() > MAX_NAME_LEN {
                return Err(PointValidationError::KeyTooLong(k.clone()));
            }
            if contains_disallowed_key_char(k) || contains_disallowed_key_char(v) {
                return Err(PointValidationError::InvalidKeyChar(k.clone()));
            }
        }
        for (k, v) in &self.fields {
            if k.is_empty() {
                return Err(PointValidationError::EmptyKey("field"));
            }
            if k.len() > MAX_NAME_LEN {
                return Err(PointValidationError::KeyTooLong(k.clone()));
            }
            if k.chars().any(|c| matches!(c, '=' | ' ' | ',')) {
                return Err(PointValidationError::InvalidKeyChar(k.clone()));
            }
            if !v.is_valid() {
                return Err(PointValidationError::UnrepresentableField(k.clone()));
            }
        }
        Ok(())
    }

    /// Identity used by batch-optimization dedup: measurement + sorted tags
    /// + timestamp.
    pub fn identity_key(&self) -> (String, i64, Vec<(String, String)>) {
        (
            self.measurement.clone(),
            self.timestamp_ns,
            self.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )
    }
}

pub struct StoragePointBuilder {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp_ns: i64,
}

impl StoragePointBuilder {
    /// Null tag values are dropped rather than emitted empty, per §4.2 step 3.
    pub fn tag(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.tags.insert(key.into(), value);
        }
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn build(self) -> StoragePoint {
        StoragePoint {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp_ns: self.timestamp_ns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_measurement() {
        let point = StoragePoint::builder("", 0)
            .field("state", FieldValue::Bool(true))
            .build();
        assert_eq!(point.validate(), Err(PointValidationError::EmptyMeasurement));
    }

    #[test]
    fn rejects_tag_with_equals_sign() {
        let mut point = StoragePoint::builder("light", 0)
            .field("state", FieldValue::Bool(true))
            .build();
        point.tags.insert("bad=key".into(), "v".into());
        assert!(matches!(
            point.validate(),
            Err(PointValidationError::InvalidKeyChar(_))
        ));
    }

    #[test]
    fn null_tag_is_dropped_not_emitted_empty() {
        let point = StoragePoint::builder("light", 0)
            .tag("area", None)
            .field("state", FieldValue::Bool(true))
            .build();
        assert!(!point.tags.contains_key("area"));
    }
}
