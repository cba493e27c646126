//! Config command implementations

use std::path::Path;

use anyhow::{Context, Result};

use hass_core::config::{self, ConfigFile};

use crate::output::{print_info, print_success, print_warning};
use crate::session::GlobalOptions;

/// Show the effective configuration with the token redacted
pub fn config_show(options: &GlobalOptions) -> Result<()> {
    for path in options.config_paths() {
        if path.exists() {
            print_info(&format!("Loaded: {}", path.display()));
        } else {
            tracing::debug!("Not present: {}", path.display());
        }
    }

    let config = options.resolve()?;
    println!();
    println!("{}", render_redacted(&config)?);
    Ok(())
}

/// Print the path `config init` writes to
pub fn config_path(options: &GlobalOptions) {
    println!("{}", options.primary_config_path().display());
}

/// Initialize a commented default configuration file
pub fn config_init(options: &GlobalOptions, force: bool) -> Result<()> {
    let path = options.primary_config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }

    write_default_config(&path)?;
    print_success(&format!("Created configuration file: {}", path.display()));
    print_info("Set connection.url and connection.token, or export HASS_URL / HASS_TOKEN");
    Ok(())
}

/// Check that the effective configuration can be used to connect
pub fn config_validate(options: &GlobalOptions) -> Result<()> {
    let config = options.resolve()?;

    config
        .connection
        .validate()
        .context("Configuration is invalid")?;

    if config.connection.auto_reconnect && config.connection.backoff.initial.is_zero() {
        print_warning("backoff.initial is 0: reconnect attempts will not wait");
    }

    print_success(&format!(
        "Configuration is valid (endpoint {})",
        config.connection.websocket_url()
    ));
    Ok(())
}

fn write_default_config(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    }
    std::fs::write(path, generate_default_config())
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

fn render_redacted(config: &ConfigFile) -> Result<String> {
    let mut value = toml::Value::try_from(config).context("Failed to render configuration")?;
    if let Some(toml::Value::Table(connection)) = value.get_mut("connection") {
        let shown = if config.connection.token.is_empty() {
            "<not set>"
        } else {
            "<redacted>"
        };
        connection.insert("token".to_string(), toml::Value::String(shown.to_string()));
    }
    Ok(toml::to_string_pretty(&value)?)
}

/// Generate default configuration content
fn generate_default_config() -> String {
    format!(
        r#"# hass-link configuration
#
# Lookup order: ./{project}, then this file. HASS_URL and HASS_TOKEN
# override both; command-line flags override everything.

[connection]
# Home Assistant base URL; http(s) is rewritten to ws(s) and
# /api/websocket is appended
url = "http://homeassistant.local:8123"

# Long-lived access token (Profile -> Security in the Home Assistant UI)
token = ""

# Seconds to wait for each command's result
command_timeout = 30

# Seconds allowed for connecting and authenticating
connect_timeout = 10

# Seconds between keepalive pings (0 disables keepalive)
keepalive_interval = 30

# Seconds of silence before the connection is considered dead
keepalive_timeout = 90

# Reconnect automatically after the connection drops
auto_reconnect = false

[connection.backoff]
# Initial retry delay in seconds
initial = 1
# Maximum retry delay in seconds
max = 60
# Backoff multiplier
multiplier = 2.0
# Jitter factor
jitter = 0.25

[app]
# Entities listed first by `hass states`
favorites = []

[app.filters]
# Domains shown by `hass states` without --domain or --all
domains = ["light", "climate", "switch", "fan", "cover", "media_player"]
"#,
        project = crate::session::PROJECT_CONFIG_FILE
    )
}
