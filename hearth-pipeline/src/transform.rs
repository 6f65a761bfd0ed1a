use hearth_model::{Event, FieldValue, StoragePoint, Value};
use std::collections::BTreeMap;

/// Converts an event (plus any registry attributes merged in by the
/// connection manager, §4.1/§9) into one or more storage points. A
/// registered transform may return more than one point for a single event
/// (e.g. one point per sub-metric); the pipeline never partially delivers
/// the result (§8 invariant 1).
pub trait Transform: Send + Sync {
    fn transform(&self, event: &Event, registry_attributes: Option<&BTreeMap<String, Value>>) -> Vec<StoragePoint>;
}

/// Built-in transform used when no transform is registered for an event's
/// type: measurement = domain, tags = entity_id plus any scalar registry
/// attributes, fields = every scalar event attribute. Non-scalar
/// attributes (maps/lists) are skipped — they have no line-protocol field
/// representation.
pub struct DefaultTransform;

impl Transform for DefaultTransform {
    fn transform(&self, event: &Event, registry_attributes: Option<&BTreeMap<String, Value>>) -> Vec<StoragePoint> {
        let mut builder =
            StoragePoint::builder(event.domain.clone(), event.timestamp_ns).tag("entity_id", Some(event.entity_id.clone()));

        if let Some(registry) = registry_attributes {
            for (key, value) in registry {
                if value.is_scalar() {
                    let rendered = value.to_display_string();
                    builder = builder.tag(key.clone(), if rendered.is_empty() { None } else { Some(rendered) });
                }
            }
        }

        let mut has_field = false;
        for (key, value) in &event.attributes {
            let Some(field_value) = value_to_field(value) else {
                continue;
            };
            builder = builder.field(key.clone(), field_value);
            has_field = true;
        }

        if !has_field {
            // Every point needs at least one field (§3 invariant); fall
            // back to a presence marker rather than dropping the event.
            builder = builder.field("present", FieldValue::Bool(true));
        }

        vec![builder.build()]
    }
}

fn value_to_field(value: &Value) -> Option<FieldValue> {
    match value {
        Value::String(s) => Some(FieldValue::Str(s.clone())),
        Value::Int(i) => Some(FieldValue::Int(*i)),
        Value::Float(f) => Some(FieldValue::Float(*f)),
        Value::Bool(b) => Some(FieldValue::Bool(*b)),
        Value::Map(_) | Value::List(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_transform_produces_one_point_with_entity_tag() {
        let event = Event::new("light", "light.kitchen", "state_changed", 1_700_000_000_000_000_000)
            .with_attribute("state", "on")
            .with_attribute("brightness", 200_i64);

        let points = DefaultTransform.transform(&event, None);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].measurement, "light");
        assert_eq!(points[0].tags.get("entity_id"), Some(&"light.kitchen".to_string()));
        assert_eq!(points[0].fields.get("brightness"), Some(&FieldValue::Int(200)));
    }

    #[test]
    fn registry_attributes_merge_as_tags() {
        let event = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("state", "on");
        let mut registry = BTreeMap::new();
        registry.insert("area_id".to_string(), Value::String("kitchen".to_string()));

        let points = DefaultTransform.transform(&event, Some(&registry));
        assert_eq!(points[0].tags.get("area_id"), Some(&"kitchen".to_string()));
    }

    #[test]
    fn default_transform_encodes_to_the_exact_line_protocol_line() {
        let event = Event::new("light", "light.kitchen", "state_changed", 1_735_689_600_000_000_000)
            .with_attribute("state", "on")
            .with_attribute("brightness", 200_i64);

        let points = DefaultTransform.transform(&event, None);
        assert_eq!(
            hearth_model::line_protocol::encode_point(&points[0]),
            "light,entity_id=light.kitchen brightness=200i,state=\"on\" 1735689600000000000"
        );
    }

    #[test]
    fn event_with_no_scalar_attributes_still_yields_a_point() {
        let mut nested = BTreeMap::new();
        nested.insert("inner".to_string(), Value::String("x".to_string()));
        let event = Event::new("light", "light.kitchen", "state_changed", 0).with_attribute("nested", Value::Map(nested));

        let points = DefaultTransform.transform(&event, None);
        assert_eq!(points.len(), 1);
        assert!(points[0].fields.contains_key("present"));
    }
}
