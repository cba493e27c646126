//! Message types for the Home Assistant WebSocket protocol
//!
//! Every frame is a JSON object with a `type` field and, for everything
//! except the authentication phase, an integer `id`. The remaining fields
//! depend on the type and are passed through to callers verbatim.
//!
//! # Message Flow
//!
//! 1. Server sends `auth_required` as soon as the socket opens
//! 2. Client sends `auth` carrying the access token
//! 3. Server answers `auth_ok` or `auth_invalid`
//! 4. Client sends commands (`get_states`, `call_service`, ...) tagged with an `id`
//! 5. Server answers each with a `result` carrying the same `id`
//! 6. For `subscribe_events`, the server keeps pushing `event` frames tagged
//!    with the id of the subscribe command
//! 7. `ping` / `pong` keep the connection alive

use serde_json::{Map, Value};
use std::fmt;

use crate::id::MessageId;

/// Value of the `type` field for each message kind this client understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Server challenge sent right after the socket opens
    AuthRequired,
    /// Client credential
    Auth,
    /// Credential accepted
    AuthOk,
    /// Credential rejected
    AuthInvalid,
    /// Answer to a command
    Result,
    /// Push notification for a subscription
    Event,
    /// Keepalive request
    Ping,
    /// Keepalive response
    Pong,
}

impl MessageKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::AuthRequired => "auth_required",
            MessageKind::Auth => "auth",
            MessageKind::AuthOk => "auth_ok",
            MessageKind::AuthInvalid => "auth_invalid",
            MessageKind::Result => "result",
            MessageKind::Event => "event",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
        }
    }

    /// Parse a wire name
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "auth_required" => Some(Self::AuthRequired),
            "auth" => Some(Self::Auth),
            "auth_ok" => Some(Self::AuthOk),
            "auth_invalid" => Some(Self::AuthInvalid),
            "result" => Some(Self::Result),
            "event" => Some(Self::Event),
            "ping" => Some(Self::Ping),
            "pong" => Some(Self::Pong),
            _ => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by the server in a `result` frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFailure {
    /// Machine-readable error code (e.g. `not_found`), empty if the server sent none
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// Messages sent by the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Credential frame answering `auth_required`
    Auth {
        /// Long-lived access token
        access_token: String,
    },

    /// Keepalive request
    Ping {
        /// Correlation id
        id: MessageId,
    },

    /// Any other command (`get_states`, `call_service`, `subscribe_events`, ...)
    Command {
        /// Correlation id
        id: MessageId,
        /// Command name, sent as `type`
        command: String,
        /// Command-specific fields, merged into the envelope
        params: Map<String, Value>,
    },
}

impl ClientMessage {
    /// Correlation id, if this message carries one
    pub fn id(&self) -> Option<MessageId> {
        match self {
            ClientMessage::Auth { .. } => None,
            ClientMessage::Ping { id } | ClientMessage::Command { id, .. } => Some(*id),
        }
    }

    /// Wire name sent in the `type` field
    pub fn type_name(&self) -> &str {
        match self {
            ClientMessage::Auth { .. } => MessageKind::Auth.as_str(),
            ClientMessage::Ping { .. } => MessageKind::Ping.as_str(),
            ClientMessage::Command { command, .. } => command,
        }
    }

    /// Build the JSON envelope for this message
    pub fn to_value(&self) -> Value {
        let mut envelope = Map::new();
        match self {
            ClientMessage::Auth { access_token } => {
                envelope.insert("type".into(), Value::from(MessageKind::Auth.as_str()));
                envelope.insert("access_token".into(), Value::from(access_token.as_str()));
            }
            ClientMessage::Ping { id } => {
                envelope.insert("id".into(), Value::from(id.as_u64()));
                envelope.insert("type".into(), Value::from(MessageKind::Ping.as_str()));
            }
            ClientMessage::Command {
                id,
                command,
                params,
            } => {
                envelope.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
                // Envelope keys win over anything smuggled in through params
                envelope.insert("id".into(), Value::from(id.as_u64()));
                envelope.insert("type".into(), Value::from(command.as_str()));
            }
        }
        Value::Object(envelope)
    }
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Authentication challenge
    AuthRequired {
        /// Server version, if advertised
        ha_version: Option<String>,
    },

    /// Credential accepted
    AuthOk {
        /// Server version, if advertised
        ha_version: Option<String>,
    },

    /// Credential rejected
    AuthInvalid {
        /// Reason given by the server
        message: Option<String>,
    },

    /// Answer to a command
    Result {
        /// Id of the command being answered
        id: MessageId,
        /// `result` payload on success, the server's error otherwise
        outcome: Result<Value, ServiceFailure>,
    },

    /// Push notification for a subscription
    Event {
        /// Id of the subscribe command this event belongs to
        id: MessageId,
        /// Event payload, opaque to the protocol layer
        event: Value,
    },

    /// Keepalive response
    Pong {
        /// Id of the ping being answered
        id: Option<MessageId>,
    },

    /// A well-formed frame of a type this client does not handle
    Unknown {
        /// Value of the `type` field
        kind: String,
        /// Id, if present
        id: Option<MessageId>,
    },
}

impl ServerMessage {
    /// Correlation id, if this message carries one
    pub fn id(&self) -> Option<MessageId> {
        match self {
            ServerMessage::Result { id, .. } | ServerMessage::Event { id, .. } => Some(*id),
            ServerMessage::Pong { id } | ServerMessage::Unknown { id, .. } => *id,
            _ => None,
        }
    }

    /// Wire name of the `type` field
    pub fn type_name(&self) -> &str {
        match self {
            ServerMessage::AuthRequired { .. } => MessageKind::AuthRequired.as_str(),
            ServerMessage::AuthOk { .. } => MessageKind::AuthOk.as_str(),
            ServerMessage::AuthInvalid { .. } => MessageKind::AuthInvalid.as_str(),
            ServerMessage::Result { .. } => MessageKind::Result.as_str(),
            ServerMessage::Event { .. } => MessageKind::Event.as_str(),
            ServerMessage::Pong { .. } => MessageKind::Pong.as_str(),
            ServerMessage::Unknown { kind, .. } => kind,
        }
    }
}
