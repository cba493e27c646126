//! hass-cli: Command-line interface for hass-link
//!
//! Provides the `hass` CLI for inspecting and controlling a Home Assistant
//! server over its WebSocket API.

pub mod commands;
pub mod output;
pub mod session;
