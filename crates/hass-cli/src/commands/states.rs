//! Entity listing and inspection

use anyhow::Result;

use hass_client::HassApi;
use hass_core::config::AppConfig;

use crate::output::{format_entities, format_entity};

/// List entities
///
/// Without `domain` the configured default domains are shown unless `all`
/// is set. Favorites come first.
pub async fn states_command(
    api: &HassApi,
    app: &AppConfig,
    domain: Option<&str>,
    all: bool,
    long: bool,
) -> Result<()> {
    let mut entities = api.get_states().await?;
    let total = entities.len();

    entities.retain(|e| match domain {
        Some(domain) => e.domain().eq_ignore_ascii_case(domain),
        None => all || app.includes_domain(e.domain()),
    });
    app.sort_entities(&mut entities);

    tracing::debug!("Showing {} of {} entities", entities.len(), total);
    println!("{}", format_entities(&entities, app, long));
    Ok(())
}

/// Show a single entity
pub async fn state_command(api: &HassApi, entity_id: &str) -> Result<()> {
    match api.get_state(entity_id).await? {
        Some(entity) => {
            print!("{}", format_entity(&entity));
            Ok(())
        }
        None => anyhow::bail!("Entity not found: {}", entity_id),
    }
}
