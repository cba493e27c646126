//! Service calls: generic, lights and climate

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use hass_client::HassApi;
use hass_core::HvacMode;

use crate::output::print_success;

/// What to do with a light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightAction {
    On,
    Off,
    Toggle,
}

/// Call an arbitrary service
///
/// `data` is a JSON object merged into `service_data`.
pub async fn call_command(
    api: &HassApi,
    domain: &str,
    service: &str,
    entity: Option<&str>,
    data: Option<&str>,
) -> Result<()> {
    let data = match data {
        Some(raw) => parse_service_data(raw)?,
        None => Map::new(),
    };

    let result = api
        .call_service(domain, service, entity, data)
        .await
        .with_context(|| format!("Service call {}.{} failed", domain, service))?;

    print_success(&format!("Called {}.{}", domain, service));
    if !result.is_null() {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

/// Switch, dim or recolor a light
pub async fn light_command(
    api: &HassApi,
    action: LightAction,
    entity: &str,
    brightness: Option<u8>,
    rgb: Option<[u8; 3]>,
) -> Result<()> {
    match action {
        LightAction::On => api.turn_on_light(entity, brightness, rgb).await?,
        LightAction::Off => api.turn_off_light(entity).await?,
        LightAction::Toggle => api.toggle_light(entity).await?,
    }

    let verb = match action {
        LightAction::On => "Turned on",
        LightAction::Off => "Turned off",
        LightAction::Toggle => "Toggled",
    };
    print_success(&format!("{} {}", verb, entity));
    Ok(())
}

/// Set a thermostat's target temperature
pub async fn climate_temperature_command(api: &HassApi, entity: &str, temperature: f64) -> Result<()> {
    api.set_temperature(entity, temperature).await?;
    print_success(&format!("Set {} to {}", entity, temperature));
    Ok(())
}

/// Set a thermostat's HVAC mode
pub async fn climate_mode_command(api: &HassApi, entity: &str, mode: HvacMode) -> Result<()> {
    api.set_hvac_mode(entity, mode).await?;
    print_success(&format!("Set {} to {}", entity, mode.as_str()));
    Ok(())
}

/// Parse `r,g,b` into a color triple
pub fn parse_rgb(raw: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected r,g,b but got '{}'", raw));
    }

    let mut rgb = [0u8; 3];
    for (slot, part) in rgb.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{}' is not a value between 0 and 255", part))?;
    }
    Ok(rgb)
}

fn parse_service_data(raw: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).context("--data is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("--data must be a JSON object"),
    }
}
