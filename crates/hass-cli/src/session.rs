//! Configuration resolution and client setup shared by all commands

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use hass_client::{HassApi, HassClient};
use hass_core::config::{self, ConfigFile};

/// Project-local configuration file, read before the user file
pub const PROJECT_CONFIG_FILE: &str = "hass-link.toml";

/// Options every command accepts
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Explicit configuration file; replaces the layered lookup
    pub config: Option<PathBuf>,
    /// Server URL override
    pub url: Option<String>,
    /// Access token override
    pub token: Option<String>,
    /// Command timeout override, in seconds
    pub timeout: Option<u64>,
}

impl GlobalOptions {
    /// Files consulted, lowest priority first
    pub fn config_paths(&self) -> Vec<PathBuf> {
        match &self.config {
            Some(path) => vec![path.clone()],
            None => vec![PathBuf::from(PROJECT_CONFIG_FILE), config::default_config_path()],
        }
    }

    /// File that `config init` writes and `config show` reads
    pub fn primary_config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config::default_config_path)
    }

    /// Resolve the effective configuration: files, then environment, then flags
    pub fn resolve(&self) -> Result<ConfigFile> {
        if let Some(path) = &self.config {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
        }

        let mut config = config::load_layered(&self.config_paths())
            .context("Failed to load configuration")?;
        config.apply_env();
        config.apply_overrides(self.url.clone(), self.token.clone());
        if let Some(secs) = self.timeout {
            config.connection.command_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// Resolve the configuration and open an authenticated connection
pub async fn connect(options: &GlobalOptions) -> Result<(ConfigFile, HassApi)> {
    let config = options.resolve()?;
    config
        .connection
        .validate()
        .context("Connection settings are incomplete (set --url/--token or HASS_URL/HASS_TOKEN)")?;

    tracing::debug!("Connecting to {}", config.connection.websocket_url());
    let client = HassClient::new(config.connection.clone());
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.connection.url))?;

    Ok((config, HassApi::new(client)))
}
