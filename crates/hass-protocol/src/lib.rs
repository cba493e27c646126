//! hass-protocol: Wire protocol for the Home Assistant WebSocket API
//!
//! This crate defines the JSON message envelopes exchanged with a Home
//! Assistant server over a single WebSocket connection, and the codec that
//! turns them into text frames and back.

pub mod codec;
pub mod error;
pub mod id;
pub mod message;

pub use codec::{decode, encode};
pub use error::ProtocolError;
pub use id::MessageId;
pub use message::{ClientMessage, MessageKind, ServerMessage, ServiceFailure};
