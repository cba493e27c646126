//! Home Assistant entity models
//!
//! These mirror the payloads returned by `get_states` and pushed in
//! `state_changed` events. Unknown fields are ignored; attributes are kept
//! as raw JSON since their shape depends on the entity's domain.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// State of a single entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Entity identifier (e.g. `light.kitchen`)
    pub entity_id: String,
    /// Current state (e.g. `on`, `off`, `20.5`)
    pub state: String,
    /// Domain-specific attributes (brightness, temperature, ...)
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Timestamp of the last state change
    #[serde(default)]
    pub last_changed: Option<String>,
    /// Timestamp of the last update
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl EntityState {
    /// Domain part of the entity id (`light` for `light.kitchen`)
    pub fn domain(&self) -> &str {
        self.entity_id
            .split_once('.')
            .map(|(domain, _)| domain)
            .unwrap_or(&self.entity_id)
    }

    /// `friendly_name` attribute, falling back to the entity id
    pub fn friendly_name(&self) -> &str {
        self.attributes
            .get("friendly_name")
            .and_then(Value::as_str)
            .unwrap_or(&self.entity_id)
    }

    /// Whether the entity reports itself as on
    pub fn is_on(&self) -> bool {
        self.state == "on"
    }
}

/// Payload of a `state_changed` event
#[derive(Debug, Clone, PartialEq)]
pub struct StateChangedEvent {
    /// Entity whose state changed
    pub entity_id: String,
    /// State before the change (absent when the entity was just added)
    pub old_state: Option<EntityState>,
    /// State after the change (absent when the entity was removed)
    pub new_state: Option<EntityState>,
}

#[derive(Deserialize)]
struct RawEvent {
    event_type: String,
    data: RawStateChange,
}

#[derive(Deserialize)]
struct RawStateChange {
    entity_id: String,
    #[serde(default)]
    old_state: Option<EntityState>,
    #[serde(default)]
    new_state: Option<EntityState>,
}

impl StateChangedEvent {
    /// Parse a raw event payload, returning `None` for other event types or
    /// payloads that do not match the expected shape
    pub fn from_event(event: &Value) -> Option<Self> {
        let raw: RawEvent = serde_json::from_value(event.clone()).ok()?;
        if raw.event_type != "state_changed" {
            return None;
        }
        Some(Self {
            entity_id: raw.data.entity_id,
            old_state: raw.data.old_state,
            new_state: raw.data.new_state,
        })
    }
}

/// HVAC operating mode for climate entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    /// Off
    Off,
    /// Heating only
    Heat,
    /// Cooling only
    Cool,
    /// Heat or cool to stay within a range
    HeatCool,
    /// Device decides
    Auto,
    /// Dehumidify
    Dry,
    /// Fan only
    FanOnly,
}

impl HvacMode {
    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            HvacMode::Off => "off",
            HvacMode::Heat => "heat",
            HvacMode::Cool => "cool",
            HvacMode::HeatCool => "heat_cool",
            HvacMode::Auto => "auto",
            HvacMode::Dry => "dry",
            HvacMode::FanOnly => "fan_only",
        }
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HvacMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(HvacMode::Off),
            "heat" => Ok(HvacMode::Heat),
            "cool" => Ok(HvacMode::Cool),
            "heat_cool" => Ok(HvacMode::HeatCool),
            "auto" => Ok(HvacMode::Auto),
            "dry" => Ok(HvacMode::Dry),
            "fan_only" => Ok(HvacMode::FanOnly),
            other => Err(format!("unknown HVAC mode: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kitchen() -> EntityState {
        serde_json::from_value(json!({
            "entity_id": "light.kitchen",
            "state": "on",
            "attributes": {"friendly_name": "Kitchen", "brightness": 200},
            "last_changed": "2024-01-01T00:00:00+00:00",
            "last_updated": "2024-01-01T00:00:00+00:00",
            "context": {"id": "abc"}
        }))
        .unwrap()
    }

    #[test]
    fn test_entity_domain_and_name() {
        let entity = kitchen();
        assert_eq!(entity.domain(), "light");
        assert_eq!(entity.friendly_name(), "Kitchen");
        assert!(entity.is_on());
    }

    #[test]
    fn test_friendly_name_falls_back_to_id() {
        let entity: EntityState =
            serde_json::from_value(json!({"entity_id": "sensor.temp", "state": "20.5"})).unwrap();
        assert_eq!(entity.friendly_name(), "sensor.temp");
        assert!(entity.attributes.is_empty());
    }

    #[test]
    fn test_state_changed_event_parse() {
        let payload = json!({
            "event_type": "state_changed",
            "data": {
                "entity_id": "light.kitchen",
                "old_state": {"entity_id": "light.kitchen", "state": "off"},
                "new_state": {"entity_id": "light.kitchen", "state": "on"}
            }
        });

        let event = StateChangedEvent::from_event(&payload).unwrap();
        assert_eq!(event.entity_id, "light.kitchen");
        assert_eq!(event.old_state.unwrap().state, "off");
        assert_eq!(event.new_state.unwrap().state, "on");
    }

    #[test]
    fn test_state_changed_event_removed_entity() {
        let payload = json!({
            "event_type": "state_changed",
            "data": {"entity_id": "light.gone", "old_state": {"entity_id": "light.gone", "state": "on"}, "new_state": null}
        });

        let event = StateChangedEvent::from_event(&payload).unwrap();
        assert!(event.new_state.is_none());
    }

    #[test]
    fn test_other_event_type_is_ignored() {
        let payload = json!({"event_type": "call_service", "data": {"entity_id": "x"}});
        assert!(StateChangedEvent::from_event(&payload).is_none());
    }

    #[test]
    fn test_hvac_mode_parse() {
        assert_eq!("heat_cool".parse::<HvacMode>().unwrap(), HvacMode::HeatCool);
        assert_eq!(HvacMode::FanOnly.to_string(), "fan_only");
        assert!("warp".parse::<HvacMode>().is_err());
    }
}
