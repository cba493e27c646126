//! Core error types for hass-link

use hass_protocol::{MessageId, ProtocolError, ServiceFailure};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::ConnectionState;

/// Top-level error type for the hass-link crates
#[derive(Error, Debug)]
pub enum HassError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Client error
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the connection and its command dispatcher
///
/// Cloneable because teardown resolves every pending request with the same value.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Handshake or I/O failure on the socket
    #[error("Transport error: {0}")]
    Transport(String),

    /// Server rejected the access token
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Server did not follow the challenge/credential/result handshake
    #[error("Unexpected handshake message: {0}")]
    UnexpectedHandshake(String),

    /// A frame could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An identifier was allocated while a request with the same id was still pending
    #[error("Duplicate request identifier: {0}")]
    DuplicateIdentifier(MessageId),

    /// Server rejected a command
    #[error("Service error: {message}")]
    Service {
        /// Machine-readable code, empty if the server sent none
        code: String,
        /// Human-readable message
        message: String,
    },

    /// No response within the deadline
    #[error("Command '{command}' timed out after {timeout:?}")]
    CommandTimeout {
        /// Command name
        command: String,
        /// Deadline that elapsed
        timeout: Duration,
    },

    /// The connection is not in the `Connected` state
    #[error("Not connected")]
    NotConnected,

    /// The connection was torn down while the request was pending
    #[error("Connection closed")]
    ConnectionClosed,

    /// Lifecycle transition not allowed from the current state
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// State at the time of the request
        from: ConnectionState,
        /// Requested state
        to: ConnectionState,
    },
}

impl ClientError {
    /// Whether this error means the whole connection is gone (as opposed to
    /// one command failing on a healthy connection)
    pub fn is_connection_level(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_)
                | ClientError::AuthenticationFailed(_)
                | ClientError::UnexpectedHandshake(_)
                | ClientError::NotConnected
                | ClientError::ConnectionClosed
        )
    }

    /// Whether a failed connection attempt is worth retrying
    ///
    /// Credential and handshake failures will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Transport(_) | ClientError::ConnectionClosed
        )
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError::Protocol(err.to_string())
    }
}

impl From<ServiceFailure> for ClientError {
    fn from(failure: ServiceFailure) -> Self {
        ClientError::Service {
            code: failure.code,
            message: failure.message,
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_failure_conversion() {
        let err: ClientError = ServiceFailure {
            code: "not_found".to_string(),
            message: "Unable to find service light.explode".to_string(),
        }
        .into();

        assert_eq!(
            err.to_string(),
            "Service error: Unable to find service light.explode"
        );
        assert!(!err.is_connection_level());
    }

    #[test]
    fn test_connection_level_classification() {
        assert!(ClientError::ConnectionClosed.is_connection_level());
        assert!(ClientError::NotConnected.is_connection_level());
        assert!(!ClientError::CommandTimeout {
            command: "get_states".to_string(),
            timeout: Duration::from_secs(1),
        }
        .is_connection_level());
    }

    #[test]
    fn test_auth_failure_is_not_retryable() {
        assert!(ClientError::Transport("refused".to_string()).is_retryable());
        assert!(!ClientError::AuthenticationFailed("bad token".to_string()).is_retryable());
        assert!(!ClientError::UnexpectedHandshake("result".to_string()).is_retryable());
    }
}
