//! hass-client: Home Assistant WebSocket client runtime
//!
//! One authenticated WebSocket carries many concurrent request/response
//! exchanges plus a stream of pushed events. This crate multiplexes them:
//!
//! - a correlation table matches each `result` to the command that asked for it
//! - a subscription registry hands each `event` to its subscriber
//! - a single receive loop reads the socket, a single writer task writes it
//! - a state machine tracks the connection lifecycle
//!
//! [`HassClient`] is the entry point; [`HassApi`] adds typed helpers for
//! the common Home Assistant commands.

pub mod api;
pub mod client;
mod connection;
pub mod correlation;
pub mod reconnect;
pub mod state;
pub mod subscription;
pub mod transport;

pub use api::HassApi;
pub use client::HassClient;
pub use correlation::{CorrelationTable, PendingSlot};
pub use reconnect::ExponentialBackoff;
pub use state::StateMachine;
pub use subscription::{EventHandler, SubscriptionRegistry};
