//! Connection configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::serde_utils::duration_secs;
use crate::error::ConfigError;

/// Path of the WebSocket endpoint on a Home Assistant server
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// Long-lived access token
///
/// Opaque to the client; never printed by `Debug`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token string
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `auth` frame only
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether no token has been configured
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("AccessToken(<empty>)")
        } else {
            f.write_str("AccessToken(<redacted>)")
        }
    }
}

impl From<String> for AccessToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// Configuration for the WebSocket client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server URL. `http(s)://host:8123` is accepted and normalized,
    /// see [`ConnectionConfig::websocket_url`].
    pub url: String,

    /// Access token sent during the handshake
    pub token: AccessToken,

    /// Deadline for each command's result
    #[serde(with = "duration_secs")]
    pub command_timeout: Duration,

    /// Deadline for the transport handshake plus authentication
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Interval between keepalive pings (0 disables keepalive)
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,

    /// Silence after which the connection is considered dead
    #[serde(with = "duration_secs")]
    pub keepalive_timeout: Duration,

    /// Reconnect automatically after an unexpected loss
    pub auto_reconnect: bool,

    /// Backoff configuration for reconnections
    pub backoff: BackoffConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: AccessToken::default(),
            command_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(90),
            auto_reconnect: false,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ConnectionConfig {
    /// Create a config for the given server and token, other fields default
    pub fn new(url: impl Into<String>, token: impl Into<AccessToken>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    /// WebSocket URL derived from `url`
    ///
    /// `http://` becomes `ws://`, `https://` becomes `wss://`, and
    /// `/api/websocket` is appended when missing.
    pub fn websocket_url(&self) -> String {
        normalize_websocket_url(&self.url)
    }

    /// Whether keepalive pings are enabled
    pub fn keepalive_enabled(&self) -> bool {
        !self.keepalive_interval.is_zero()
    }

    /// Check that the fields needed to connect are present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingField("connection.url".to_string()));
        }
        if self.token.is_empty() {
            return Err(ConfigError::MissingField("connection.token".to_string()));
        }

        let url = self.websocket_url();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "unsupported URL scheme in '{}' (expected http, https, ws or wss)",
                self.url
            )));
        }
        if self.command_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "command_timeout must be greater than zero".to_string(),
            ));
        }
        if self.keepalive_enabled() && self.keepalive_timeout <= self.keepalive_interval {
            return Err(ConfigError::Invalid(
                "keepalive_timeout must be longer than keepalive_interval".to_string(),
            ));
        }
        Ok(())
    }
}

/// Normalize a Home Assistant server URL into its WebSocket endpoint
pub fn normalize_websocket_url(url: &str) -> String {
    let url = url.trim();
    let url = if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        url.to_string()
    };

    if url.ends_with(WEBSOCKET_PATH) {
        url
    } else {
        format!("{}{}", url.trim_end_matches('/'), WEBSOCKET_PATH)
    }
}

/// Exponential backoff configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Initial delay
    #[serde(with = "duration_secs")]
    pub initial: Duration,

    /// Maximum delay
    #[serde(with = "duration_secs")]
    pub max: Duration,

    /// Multiplier for each retry
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.25,
        }
    }
}
