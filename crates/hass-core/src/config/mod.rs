//! Configuration management for hass-link
//!
//! Settings come from up to three layers, later ones winning:
//!
//! 1. TOML files, merged table by table (e.g. a project file, then the user file)
//! 2. `HASS_URL` / `HASS_TOKEN` environment variables
//! 3. Explicit overrides from the caller (CLI flags)

mod app;
mod connection;
pub mod serde_utils;

pub use app::{AppConfig, FiltersConfig};
pub use connection::{
    normalize_websocket_url, AccessToken, BackoffConfig, ConnectionConfig, WEBSOCKET_PATH,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable holding the server URL
pub const ENV_URL: &str = "HASS_URL";

/// Environment variable holding the access token
pub const ENV_TOKEN: &str = "HASS_TOKEN";

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    /// How to reach and authenticate with the server
    pub connection: ConnectionConfig,

    /// Presentation preferences
    pub app: AppConfig,
}

impl ConfigFile {
    /// Apply URL/token overrides; `None` leaves the current value in place
    pub fn apply_overrides(&mut self, url: Option<String>, token: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.connection.url = url;
        }
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.connection.token = AccessToken::new(token);
        }
    }

    /// Apply `HASS_URL` / `HASS_TOKEN` from the process environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(std::env::var(ENV_URL).ok(), std::env::var(ENV_TOKEN).ok());
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hass-link")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let table = read_table(path)?;
    let config: T = toml::Value::Table(table).try_into()?;
    Ok(config)
}

/// Load and merge several files; missing files are skipped
///
/// Tables are merged recursively, so a later file only needs the keys it
/// changes. Returns the default configuration if none of the files exist.
pub fn load_layered(paths: &[PathBuf]) -> Result<ConfigFile, ConfigError> {
    let mut merged = toml::Table::new();

    for path in paths {
        if !path.exists() {
            tracing::debug!("Config layer {:?} not present, skipping", path);
            continue;
        }
        tracing::debug!("Loading config layer {:?}", path);
        let layer = read_table(path)?;
        deep_merge(&mut merged, layer);
    }

    let config: ConfigFile = toml::Value::Table(merged).try_into()?;
    Ok(config)
}

/// Save configuration to a file
pub fn save_config<T: serde::Serialize>(path: &Path, config: &T) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ConfigError::Invalid(format!("Failed to create config dir: {}", e)))?;
    }

    std::fs::write(path, content)
        .map_err(|e| ConfigError::Invalid(format!("Failed to write config: {}", e)))?;

    Ok(())
}

/// Merge `overlay` into `base`; nested tables merge, everything else replaces
pub fn deep_merge(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let table: toml::Table = toml::from_str(&content)?;
    Ok(table)
}
