use crate::error::{ConnectionError, Result};
use hearth_model::{Event, Value};
use serde_json::Value as Json;

/// Outgoing handshake frames (§6).
pub enum ClientFrame {
    Auth { access_token: String },
    SubscribeEvents { id: u64, event_type: String },
}

impl ClientFrame {
    pub fn to_json_string(&self) -> String {
        let value = match self {
            ClientFrame::Auth { access_token } => serde_json::json!({
                "type": "auth",
                "access_token": access_token,
            }),
            ClientFrame::SubscribeEvents { id, event_type } => serde_json::json!({
                "id": id,
                "type": "subscribe_events",
                "event_type": event_type,
            }),
        };
        value.to_string()
    }
}

/// Decoded inbound envelope kinds (§4.1 "Event decoding").
pub enum ServerFrame {
    AuthOk,
    AuthInvalid { message: String },
    SubscriptionResult { id: u64, success: bool, error: Option<String> },
    Event { event_type: String, time_fired_ns: i64, data: Json },
    RegistryUpdate { event_type: String, data: Json },
    Unknown,
}

/// Parses one text frame from the upstream channel. A JSON syntax error is
/// a malformed-frame condition (logged, counted, channel stays up); it is
/// never treated as a channel-level failure.
pub fn parse_server_frame(text: &str) -> Result<ServerFrame> {
    let root: Json = serde_json::from_str(text).map_err(|e| ConnectionError::MalformedFrame(e.to_string()))?;

    let frame_type = root
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| ConnectionError::MalformedFrame("missing type field".to_string()))?;

    match frame_type {
        "auth_ok" => Ok(ServerFrame::AuthOk),
        "auth_invalid" => {
            let message = root
                .get("message")
                .and_then(Json::as_str)
                .unwrap_or("authentication rejected")
                .to_string();
            Ok(ServerFrame::AuthInvalid { message })
        }
        "result" => {
            let id = root
                .get("id")
                .and_then(Json::as_u64)
                .ok_or_else(|| ConnectionError::MalformedFrame("result frame missing id".to_string()))?;
            let success = root.get("success").and_then(Json::as_bool).unwrap_or(false);
            let error = root
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Json::as_str)
                .map(|s| s.to_string());
            Ok(ServerFrame::SubscriptionResult { id, success, error })
        }
        "event" => {
            let event = root
                .get("event")
                .ok_or_else(|| ConnectionError::MalformedFrame("event frame missing event field".to_string()))?;
            let event_type = event
                .get("event_type")
                .and_then(Json::as_str)
                .ok_or_else(|| ConnectionError::MalformedFrame("event missing event_type".to_string()))?
                .to_string();
            let data = event.get("data").cloned().unwrap_or(Json::Null);

            if event_type == "device_registry_updated" || event_type == "entity_registry_updated" {
                return Ok(ServerFrame::RegistryUpdate { event_type, data });
            }

            let time_fired_ns = event
                .get("time_fired")
                .and_then(Json::as_str)
                .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.timestamp_nanos_opt().unwrap_or(0))
                .unwrap_or(0);

            Ok(ServerFrame::Event {
                event_type,
                time_fired_ns,
                data,
            })
        }
        _ => Ok(ServerFrame::Unknown),
    }
}

fn json_to_value(json: &Json) -> Value {
    match json {
        Json::Null => Value::String(String::new()),
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        Json::String(s) => Value::String(s.clone()),
        Json::Array(items) => Value::List(items.iter().map(json_to_value).collect()),
        Json::Object(map) => Value::Map(map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect()),
    }
}

/// Decodes a `state_changed` payload into an `Event`. Other event types
/// that are neither registry updates nor `state_changed` still decode —
/// their `data` object becomes the attribute bag verbatim — since the
/// connection manager is not limited to a single subscribed event type.
pub fn decode_event(event_type: &str, time_fired_ns: i64, data: &Json) -> Option<Event> {
    let entity_id = data.get("entity_id").and_then(Json::as_str)?.to_string();
    let domain = entity_id.split('.').next().unwrap_or("unknown").to_string();

    let mut event = Event::new(domain, entity_id, event_type.to_string(), time_fired_ns);

    if let Some(new_state) = data.get("new_state") {
        if let Some(state) = new_state.get("state").and_then(Json::as_str) {
            event = event.with_attribute("state", Value::String(state.to_string()));
        }
        if let Some(attrs) = new_state.get("attributes").and_then(Json::as_object) {
            for (k, v) in attrs {
                event = event.with_attribute(k.clone(), json_to_value(v));
            }
        }
    } else if let Some(obj) = data.as_object() {
        for (k, v) in obj {
            if k != "entity_id" {
                event = event.with_attribute(k.clone(), json_to_value(v));
            }
        }
    }

    Some(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_auth_ok() {
        assert!(matches!(parse_server_frame(r#"{"type":"auth_ok"}"#).unwrap(), ServerFrame::AuthOk));
    }

    #[test]
    fn parses_auth_invalid_with_message() {
        let frame = parse_server_frame(r#"{"type":"auth_invalid","message":"bad token"}"#).unwrap();
        match frame {
            ServerFrame::AuthInvalid { message } => assert_eq!(message, "bad token"),
            _ => panic!("expected AuthInvalid"),
        }
    }

    #[test]
    fn parses_subscription_result() {
        let frame = parse_server_frame(r#"{"id":1,"type":"result","success":true}"#).unwrap();
        match frame {
            ServerFrame::SubscriptionResult { id, success, error } => {
                assert_eq!(id, 1);
                assert!(success);
                assert!(error.is_none());
            }
            _ => panic!("expected SubscriptionResult"),
        }
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        assert!(parse_server_frame("not json").is_err());
    }

    #[test]
    fn decodes_state_changed_event() {
        let data = serde_json::json!({
            "entity_id": "light.kitchen",
            "new_state": {"state": "on", "attributes": {"brightness": 200}},
        });
        let event = decode_event("state_changed", 1_735_689_600_000_000_000, &data).unwrap();
        assert_eq!(event.domain, "light");
        assert_eq!(event.entity_id, "light.kitchen");
        assert_eq!(event.attribute("state"), Some(&Value::String("on".to_string())));
        assert_eq!(event.attribute("brightness"), Some(&Value::Int(200)));
    }

    #[test]
    fn registry_update_routes_separately_from_events() {
        let frame = parse_server_frame(
            r#"{"id":2,"type":"event","event":{"event_type":"device_registry_updated","data":{"action":"update"}}}"#,
        )
        .unwrap();
        assert!(matches!(frame, ServerFrame::RegistryUpdate { .. }));
    }
}
