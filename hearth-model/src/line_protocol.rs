//! Bit-exact line-protocol encoder/decoder (§4.3 "Serialization").
use crate::point::{FieldValue, StoragePoint};
use std::collections::BTreeMap;
use thiserror::Error;

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ").replace('=', "\\=")
}

fn escape_field_key(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_field_string(s: &str) -> String {
    s.replace('"', "\\\"")
}

fn encode_field_value(v: &FieldValue) -> String {
    match v {
        FieldValue::Int(i) => format!("{i}i"),
        FieldValue::Float(f) => format!("{f}"),
        FieldValue::Bool(b) => b.to_string(),
        FieldValue::Str(s) => format!("\"{}\"", escape_field_string(s)),
    }
}

/// Serialize one point to its canonical line-protocol line (no trailing
/// newline). Caller is responsible for validating the point first —
/// this never fails on a point that already passed `validate()`.
pub fn encode_point(point: &StoragePoint) -> String {
    let mut out = escape_measurement(&point.measurement);
    for (k, v) in &point.tags {
        out.push(',');
        out.push_str(&escape_tag(k));
        out.push('=');
        out.push_str(&escape_tag(v));
    }
    out.push(' ');
    let mut first = true;
    for (k, v) in &point.fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&escape_field_key(k));
        out.push('=');
        out.push_str(&encode_field_value(v));
    }
    out.push(' ');
    out.push_str(&point.timestamp_ns.to_string());
    out
}

/// Serialize a batch, one line per point, newline-separated (no trailing
/// newline after the last line).
pub fn encode_batch(points: &[StoragePoint]) -> String {
    points.iter().map(encode_point).collect::<Vec<_>>().join("\n")
}

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("missing fields/timestamp section")]
    Truncated,
    #[error("invalid field value: {0}")]
    InvalidFieldValue(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

fn unescape(s: &str, extra: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if next == ',' || next == ' ' || extra.contains(&next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// Split on unescaped commas.
fn split_unescaped(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                current.push(c);
                current.push(next);
                chars.next();
                continue;
            }
        }
        if c == ',' {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

fn parse_field_value(raw: &str) -> Result<FieldValue, ParseError> {
    if let Some(stripped) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(FieldValue::Str(unescape(stripped, &['"'])));
    }
    if raw == "true" {
        return Ok(FieldValue::Bool(true));
    }
    if raw == "false" {
        return Ok(FieldValue::Bool(false));
    }
    if let Some(stripped) = raw.strip_suffix('i') {
        return stripped
            .parse::<i64>()
            .map(FieldValue::Int)
            .map_err(|_| ParseError::InvalidFieldValue(raw.to_string()));
    }
    raw.parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|_| ParseError::InvalidFieldValue(raw.to_string()))
}

/// Parse a single line back into a `StoragePoint`. Used by the round-trip
/// test in §8 and available to anything that needs to read back spilled
/// overflow batches.
pub fn parse_point(line: &str) -> Result<StoragePoint, ParseError> {
    let mut space_split = line.splitn(3, ' ');
    let head = space_split.next().ok_or(ParseError::Truncated)?;
    let fields_raw = space_split.next().ok_or(ParseError::Truncated)?;
    let ts_raw = space_split.next().ok_or(ParseError::Truncated)?;

    let head_parts = split_unescaped(head);
    let measurement = unescape(&head_parts[0], &['=']);
    let mut tags = BTreeMap::new();
    for part in &head_parts[1..] {
        let mut kv = part.splitn(2, '=');
        let k = kv.next().unwrap_or_default();
        let v = kv.next().unwrap_or_default();
        tags.insert(unescape(k, &['=']), unescape(v, &['=']));
    }

    let mut fields = BTreeMap::new();
    for part in split_fields(fields_raw) {
        let eq = part
            .find('=')
            .ok_or_else(|| ParseError::InvalidFieldValue(part.clone()))?;
        let (k, v) = part.split_at(eq);
        let v = &v[1..];
        fields.insert(unescape(k, &[]), parse_field_value(v)?);
    }

    let timestamp_ns = ts_raw
        .parse::<i64>()
        .map_err(|_| ParseError::InvalidTimestamp(ts_raw.to_string()))?;

    Ok(StoragePoint {
        measurement,
        tags,
        fields,
        timestamp_ns,
    })
}

/// Split the field section on unescaped commas that are not inside a
/// quoted string value.
fn split_fields(s: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                current.push(c);
                current.push(next);
                chars.next();
                continue;
            }
        }
        if c == '"' {
            in_quotes = !in_quotes;
            current.push(c);
            continue;
        }
        if c == ',' && !in_quotes {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::StoragePoint;

    #[test]
    fn encodes_happy_path_point_bit_exact() {
        let point = StoragePoint::builder("light", 1_735_689_600_000_000_000)
            .tag("entity_id", Some("light.kitchen".into()))
            .field("brightness", FieldValue::Int(200))
            .field("state", FieldValue::Str("on".into()))
            .build();

        assert_eq!(
            encode_point(&point),
            "light,entity_id=light.kitchen brightness=200i,state=\"on\" 1735689600000000000"
        );
    }

    #[test]
    fn round_trips_escaped_values() {
        let point = StoragePoint::builder("my measure,name", 42)
            .tag("k=ey", Some("val ue".into()))
            .field("msg", FieldValue::Str("say \"hi\"".into()))
            .field("count", FieldValue::Int(-7))
            .field("ratio", FieldValue::Float(0.5))
            .field("ok", FieldValue::Bool(false))
            .build();

        let line = encode_point(&point);
        let parsed = parse_point(&line).unwrap();
        assert_eq!(parsed, point);
    }

    #[test]
    fn batch_round_trips_as_a_multiset() {
        let a = StoragePoint::builder("m", 1)
            .field("f", FieldValue::Int(1))
            .build();
        let b = StoragePoint::builder("m", 2)
            .field("f", FieldValue::Int(2))
            .build();
        let encoded = encode_batch(&[a.clone(), b.clone()]);
        let parsed: Vec<_> = encoded
            .lines()
            .map(|l| parse_point(l).unwrap())
            .collect();
        assert_eq!(parsed, vec![a, b]);
    }
}
