use dashmap::DashMap;
use hearth_model::Value;
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Device/area/entity metadata learned from `*_registry_updated` frames.
/// Deliberately opaque: this crate does not model the registry's schema,
/// it just mirrors whatever attribute map the upstream sends so the
/// pipeline's transform step can merge it into a point's tags (§4.1, §9).
#[derive(Debug, Default)]
pub struct RegistryCache {
    entities: DashMap<String, BTreeMap<String, Value>>,
}

fn json_object_to_attrs(json: &Json) -> BTreeMap<String, Value> {
    json.as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| (k.clone(), json_value_to_model_value(v)))
                .collect()
        })
        .unwrap_or_default()
}

fn json_value_to_model_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::String(String::new()),
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => n.as_i64().map(Value::Int).unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(0.0))),
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(json_value_to_model_value).collect()),
        Json::Object(_) => Value::Map(json_object_to_attrs(json)),
    }
}

impl RegistryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a `device_registry_updated`/`entity_registry_updated`
    /// payload. The `entity_id` key identifies the row; everything else in
    /// the payload becomes its attribute map, replacing any prior entry.
    pub fn apply_update(&self, data: &Json) {
        let Some(entity_id) = data.get("entity_id").and_then(Json::as_str) else {
            return;
        };
        self.entities.insert(entity_id.to_string(), json_object_to_attrs(data));
    }

    pub fn lookup(&self, entity_id: &str) -> Option<BTreeMap<String, Value>> {
        self.entities.get(entity_id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_and_looks_up_registry_rows() {
        let cache = RegistryCache::new();
        cache.apply_update(&serde_json::json!({
            "entity_id": "light.kitchen",
            "area_id": "kitchen",
            "name": "Kitchen Light",
        }));

        let attrs = cache.lookup("light.kitchen").unwrap();
        assert_eq!(attrs.get("area_id"), Some(&Value::String("kitchen".to_string())));
        assert!(cache.lookup("light.bedroom").is_none());
    }

    #[test]
    fn update_with_no_entity_id_is_ignored() {
        let cache = RegistryCache::new();
        cache.apply_update(&serde_json::json!({"area_id": "kitchen"}));
        assert!(cache.is_empty());
    }
}
