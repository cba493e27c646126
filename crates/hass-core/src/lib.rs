//! hass-core: Core types, errors and configuration for hass-link
//!
//! This crate provides the error taxonomy, the connection lifecycle states,
//! the Home Assistant entity models and the configuration structures shared
//! by the client runtime and the CLI.

pub mod config;
pub mod entity;
pub mod error;
pub mod types;

pub use entity::{EntityState, HvacMode, StateChangedEvent};
pub use error::{ClientError, ConfigError, HassError};
pub use types::ConnectionState;
