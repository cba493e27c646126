//! Connectivity check

use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::Value;

use hass_client::HassApi;

use crate::output::print_success;

/// Send a keepalive ping and time a `get_config` round trip
///
/// `connect_time` is how long the handshake took, measured by the caller.
pub async fn ping_command(api: &HassApi, connect_time: Duration) -> Result<()> {
    api.client().ping().await?;

    let started = Instant::now();
    let config = api.get_config().await?;
    let round_trip = started.elapsed();

    let version = config
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("unknown version");
    let location = config
        .get("location_name")
        .and_then(Value::as_str)
        .unwrap_or("Home Assistant");

    print_success(&format!("Connected to {} ({})", location, version));
    println!("Handshake:  {} ms", connect_time.as_millis());
    println!("Round trip: {} ms", round_trip.as_millis());
    Ok(())
}
