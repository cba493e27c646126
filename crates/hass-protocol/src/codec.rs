//! JSON text-frame codec
//!
//! The transport delivers whole frames, so there is no buffering here:
//! one envelope is one text frame.

use serde_json::{Map, Value};

use crate::error::ProtocolError;
use crate::id::MessageId;
use crate::message::{ClientMessage, MessageKind, ServerMessage, ServiceFailure};

/// Encode a client message as the payload of a text frame
pub fn encode(message: &ClientMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(&message.to_value()).map_err(ProtocolError::Serialization)
}

/// Decode the payload of a text frame into a server message
///
/// A frame with a well-formed envelope but an unrecognized `type` decodes to
/// [`ServerMessage::Unknown`] rather than an error.
pub fn decode(text: &str) -> Result<ServerMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::InvalidJson)?;
    let mut fields = match value {
        Value::Object(map) => map,
        _ => return Err(ProtocolError::NotAnObject),
    };

    let kind = match fields.remove("type") {
        Some(Value::String(kind)) => kind,
        Some(_) => {
            return Err(ProtocolError::InvalidField {
                kind: "envelope",
                field: "type",
                expected: "string",
            })
        }
        None => {
            return Err(ProtocolError::MissingField {
                kind: "envelope",
                field: "type",
            })
        }
    };

    let Some(known) = MessageKind::from_wire(&kind) else {
        let id = optional_id(&fields, "envelope")?;
        return Ok(ServerMessage::Unknown { kind, id });
    };

    let message = match known {
        MessageKind::AuthRequired => ServerMessage::AuthRequired {
            ha_version: optional_string(&fields, "ha_version"),
        },
        MessageKind::AuthOk => ServerMessage::AuthOk {
            ha_version: optional_string(&fields, "ha_version"),
        },
        MessageKind::AuthInvalid => ServerMessage::AuthInvalid {
            message: optional_string(&fields, "message"),
        },
        MessageKind::Result => decode_result(&mut fields)?,
        MessageKind::Event => {
            let id = required_id(&fields, "event")?;
            let event = fields.remove("event").ok_or(ProtocolError::MissingField {
                kind: "event",
                field: "event",
            })?;
            ServerMessage::Event { id, event }
        }
        MessageKind::Pong => ServerMessage::Pong {
            id: optional_id(&fields, "pong")?,
        },
        // Client-to-server kinds echoed back are not something we act on
        MessageKind::Auth | MessageKind::Ping => ServerMessage::Unknown {
            id: optional_id(&fields, "envelope")?,
            kind,
        },
    };

    Ok(message)
}

fn decode_result(fields: &mut Map<String, Value>) -> Result<ServerMessage, ProtocolError> {
    let id = required_id(fields, "result")?;
    let success = match fields.get("success") {
        Some(Value::Bool(success)) => *success,
        Some(_) => {
            return Err(ProtocolError::InvalidField {
                kind: "result",
                field: "success",
                expected: "boolean",
            })
        }
        None => {
            return Err(ProtocolError::MissingField {
                kind: "result",
                field: "success",
            })
        }
    };

    let outcome = if success {
        Ok(fields.remove("result").unwrap_or(Value::Null))
    } else {
        Err(service_failure(fields.remove("error")))
    };

    Ok(ServerMessage::Result { id, outcome })
}

fn service_failure(error: Option<Value>) -> ServiceFailure {
    match error {
        Some(Value::Object(map)) => ServiceFailure {
            code: optional_string(&map, "code").unwrap_or_default(),
            message: optional_string(&map, "message")
                .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        },
        Some(Value::String(message)) => ServiceFailure {
            code: String::new(),
            message,
        },
        Some(other) => ServiceFailure {
            code: String::new(),
            message: other.to_string(),
        },
        None => ServiceFailure {
            code: String::new(),
            message: "unknown error".to_string(),
        },
    }
}

fn required_id(fields: &Map<String, Value>, kind: &'static str) -> Result<MessageId, ProtocolError> {
    optional_id(fields, kind)?.ok_or(ProtocolError::MissingField { kind, field: "id" })
}

fn optional_id(
    fields: &Map<String, Value>,
    kind: &'static str,
) -> Result<Option<MessageId>, ProtocolError> {
    match fields.get("id") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|id| Some(MessageId::new(id)))
            .ok_or(ProtocolError::InvalidField {
                kind,
                field: "id",
                expected: "non-negative integer",
            }),
    }
}

fn optional_string(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_command() {
        let mut params = Map::new();
        params.insert("event_type".into(), json!("state_changed"));
        let msg = ClientMessage::Command {
            id: MessageId::new(5),
            command: "subscribe_events".to_string(),
            params,
        };

        let text = encode(&msg).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({"id": 5, "type": "subscribe_events", "event_type": "state_changed"})
        );
    }

    #[test]
    fn test_encode_ping() {
        let text = encode(&ClientMessage::Ping {
            id: MessageId::new(9),
        })
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"id": 9, "type": "ping"}));
    }

    #[test]
    fn test_decode_auth_phase() {
        assert_eq!(
            decode(r#"{"type":"auth_required","ha_version":"2024.1.0"}"#).unwrap(),
            ServerMessage::AuthRequired {
                ha_version: Some("2024.1.0".to_string())
            }
        );
        assert_eq!(
            decode(r#"{"type":"auth_ok"}"#).unwrap(),
            ServerMessage::AuthOk { ha_version: None }
        );
        assert_eq!(
            decode(r#"{"type":"auth_invalid","message":"Invalid password"}"#).unwrap(),
            ServerMessage::AuthInvalid {
                message: Some("Invalid password".to_string())
            }
        );
    }

    #[test]
    fn test_decode_success_result() {
        let msg = decode(r#"{"id":1,"type":"result","success":true,"result":[{"entity_id":"light.kitchen"}]}"#)
            .unwrap();
        assert_eq!(
            msg,
            ServerMessage::Result {
                id: MessageId::new(1),
                outcome: Ok(json!([{"entity_id": "light.kitchen"}])),
            }
        );
    }

    #[test]
    fn test_decode_success_without_result_is_null() {
        let msg = decode(r#"{"id":4,"type":"result","success":true}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Result {
                id: MessageId::new(4),
                outcome: Ok(Value::Null),
            }
        );
    }

    #[test]
    fn test_decode_failed_result() {
        let msg = decode(
            r#"{"id":2,"type":"result","success":false,"error":{"code":"not_found","message":"Service not found."}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::Result { id, outcome } => {
                assert_eq!(id, MessageId::new(2));
                let failure = outcome.unwrap_err();
                assert_eq!(failure.code, "not_found");
                assert_eq!(failure.message, "Service not found.");
            }
            other => panic!("Expected Result message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_failed_result_with_string_error() {
        let msg = decode(r#"{"id":2,"type":"result","success":false,"error":"nope"}"#).unwrap();
        match msg {
            ServerMessage::Result { outcome, .. } => {
                assert_eq!(outcome.unwrap_err().message, "nope");
            }
            other => panic!("Expected Result message, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_event() {
        let msg = decode(r#"{"type":"event","id":5,"event":{"x":1}}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Event {
                id: MessageId::new(5),
                event: json!({"x": 1}),
            }
        );
    }

    #[test]
    fn test_decode_pong() {
        assert_eq!(
            decode(r#"{"id":12,"type":"pong"}"#).unwrap(),
            ServerMessage::Pong {
                id: Some(MessageId::new(12))
            }
        );
    }

    #[test]
    fn test_decode_unknown_type() {
        let msg = decode(r#"{"id":3,"type":"something_new","foo":"bar"}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Unknown {
                kind: "something_new".to_string(),
                id: Some(MessageId::new(3)),
            }
        );
    }

    #[test]
    fn test_decode_invalid_json() {
        assert!(matches!(
            decode("{not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_decode_not_an_object() {
        assert!(matches!(decode("[1,2,3]"), Err(ProtocolError::NotAnObject)));
    }

    #[test]
    fn test_decode_missing_type() {
        assert!(matches!(
            decode(r#"{"id":1}"#),
            Err(ProtocolError::MissingField { field: "type", .. })
        ));
    }

    #[test]
    fn test_decode_result_missing_id() {
        assert!(matches!(
            decode(r#"{"type":"result","success":true}"#),
            Err(ProtocolError::MissingField {
                kind: "result",
                field: "id"
            })
        ));
    }

    #[test]
    fn test_decode_result_missing_success() {
        assert!(matches!(
            decode(r#"{"id":1,"type":"result"}"#),
            Err(ProtocolError::MissingField {
                kind: "result",
                field: "success"
            })
        ));
    }

    #[test]
    fn test_decode_event_missing_payload() {
        assert!(matches!(
            decode(r#"{"id":1,"type":"event"}"#),
            Err(ProtocolError::MissingField {
                kind: "event",
                field: "event"
            })
        ));
    }

    #[test]
    fn test_decode_negative_id() {
        assert!(matches!(
            decode(r#"{"id":-1,"type":"result","success":true}"#),
            Err(ProtocolError::InvalidField { field: "id", .. })
        ));
    }
}
