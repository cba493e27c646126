//! Typed helpers for common Home Assistant commands

use serde_json::{json, Map, Value};

use hass_core::{ClientError, EntityState, HvacMode, StateChangedEvent};
use hass_protocol::MessageId;

use crate::client::HassClient;

/// High-level API over a connected [`HassClient`]
#[derive(Clone)]
pub struct HassApi {
    client: HassClient,
}

impl HassApi {
    /// Wrap a client
    pub fn new(client: HassClient) -> Self {
        Self { client }
    }

    /// The underlying client
    pub fn client(&self) -> &HassClient {
        &self.client
    }

    /// Fetch the state of every entity
    pub async fn get_states(&self) -> Result<Vec<EntityState>, ClientError> {
        let result = self.client.send_command("get_states", Map::new()).await?;
        let states: Vec<EntityState> = serde_json::from_value(result)
            .map_err(|e| ClientError::Protocol(format!("unexpected get_states result: {}", e)))?;
        tracing::debug!("Fetched {} entities", states.len());
        Ok(states)
    }

    /// Fetch the state of one entity, `None` if it does not exist
    pub async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>, ClientError> {
        let states = self.get_states().await?;
        Ok(states.into_iter().find(|s| s.entity_id == entity_id))
    }

    /// Server configuration (location, units, time zone, version)
    pub async fn get_config(&self) -> Result<Value, ClientError> {
        self.client.send_command("get_config", Map::new()).await
    }

    /// Every service the server offers, grouped by domain
    pub async fn get_services(&self) -> Result<Value, ClientError> {
        self.client.send_command("get_services", Map::new()).await
    }

    /// Call `domain.service`, optionally targeting one entity
    ///
    /// `entity_id` and `data` are combined into `service_data`, which is
    /// left out entirely when both are empty.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: Option<&str>,
        data: Map<String, Value>,
    ) -> Result<Value, ClientError> {
        let mut service_data = Map::new();
        if let Some(entity_id) = entity_id {
            service_data.insert("entity_id".into(), Value::from(entity_id));
        }
        service_data.extend(data);

        let mut params = Map::new();
        params.insert("domain".into(), Value::from(domain));
        params.insert("service".into(), Value::from(service));
        if !service_data.is_empty() {
            params.insert("service_data".into(), Value::Object(service_data));
        }

        tracing::info!(
            "Calling service {}.{} on {}",
            domain,
            service,
            entity_id.unwrap_or("(no target)")
        );
        self.client.send_command("call_service", params).await
    }

    /// Turn a light on, optionally setting brightness (0-255) and color
    pub async fn turn_on_light(
        &self,
        entity_id: &str,
        brightness: Option<u8>,
        rgb_color: Option<[u8; 3]>,
    ) -> Result<(), ClientError> {
        let mut data = Map::new();
        if let Some(brightness) = brightness {
            data.insert("brightness".into(), Value::from(brightness));
        }
        if let Some(rgb) = rgb_color {
            data.insert("rgb_color".into(), json!(rgb));
        }
        self.call_service("light", "turn_on", Some(entity_id), data)
            .await
            .map(|_| ())
    }

    /// Turn a light off
    pub async fn turn_off_light(&self, entity_id: &str) -> Result<(), ClientError> {
        self.call_service("light", "turn_off", Some(entity_id), Map::new())
            .await
            .map(|_| ())
    }

    /// Toggle a light
    pub async fn toggle_light(&self, entity_id: &str) -> Result<(), ClientError> {
        self.call_service("light", "toggle", Some(entity_id), Map::new())
            .await
            .map(|_| ())
    }

    /// Set a thermostat's target temperature, in the server's unit
    pub async fn set_temperature(&self, entity_id: &str, temperature: f64) -> Result<(), ClientError> {
        let mut data = Map::new();
        data.insert("temperature".into(), json!(temperature));
        self.call_service("climate", "set_temperature", Some(entity_id), data)
            .await
            .map(|_| ())
    }

    /// Set a thermostat's HVAC mode
    pub async fn set_hvac_mode(&self, entity_id: &str, mode: HvacMode) -> Result<(), ClientError> {
        let mut data = Map::new();
        data.insert("hvac_mode".into(), Value::from(mode.as_str()));
        self.call_service("climate", "set_hvac_mode", Some(entity_id), data)
            .await
            .map(|_| ())
    }

    /// Subscribe to `state_changed` events
    ///
    /// Payloads that do not parse as a state change are skipped.
    pub async fn subscribe_state_changes<F>(&self, mut handler: F) -> Result<MessageId, ClientError>
    where
        F: FnMut(StateChangedEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.client
            .subscribe(
                Some("state_changed"),
                move |event: Value| -> anyhow::Result<()> {
                    match StateChangedEvent::from_event(&event) {
                        Some(change) => handler(change),
                        None => {
                            tracing::debug!("Skipping event that is not a state change");
                            Ok(())
                        }
                    }
                },
            )
            .await
    }
}
