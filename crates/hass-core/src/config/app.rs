//! Presentation preferences consumed by the CLI

use serde::{Deserialize, Serialize};

use crate::entity::EntityState;

/// Application-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Entity ids listed before all others
    pub favorites: Vec<String>,

    /// Entity filter settings
    pub filters: FiltersConfig,
}

/// Which entity domains are shown by default
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FiltersConfig {
    /// Domains to include when no explicit filter is given
    pub domains: Vec<String>,
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            domains: ["light", "climate", "switch", "fan", "cover", "media_player"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl AppConfig {
    /// Check if an entity is marked as favorite
    pub fn is_favorite(&self, entity_id: &str) -> bool {
        self.favorites.iter().any(|f| f == entity_id)
    }

    /// Check if a domain passes the default filter
    pub fn includes_domain(&self, domain: &str) -> bool {
        self.filters.domains.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }

    /// Sort entities favorites first, then by entity id
    pub fn sort_entities(&self, entities: &mut [EntityState]) {
        entities.sort_by(|a, b| {
            let fav_a = self.is_favorite(&a.entity_id);
            let fav_b = self.is_favorite(&b.entity_id);
            fav_b.cmp(&fav_a).then_with(|| a.entity_id.cmp(&b.entity_id))
        });
    }
}
