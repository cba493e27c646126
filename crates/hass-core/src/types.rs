//! Core domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a connection to Home Assistant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection (initial and terminal state)
    #[default]
    Disconnected,
    /// Transport handshake in progress
    Connecting,
    /// Challenge received, credential sent, waiting for the verdict
    Authenticating,
    /// Authenticated and accepting commands
    Connected,
    /// Connection lost, a new attempt is scheduled
    Reconnecting,
}

impl ConnectionState {
    /// Whether commands may be dispatched in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Whether a handshake is underway
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Authenticating
                | ConnectionState::Reconnecting
        )
    }

    /// Check whether moving from `self` to `next` is a legal transition.
    ///
    /// Moving to `Disconnected` is always allowed: teardown may happen
    /// from anywhere.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (_, Disconnected) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Authenticating) | (Connecting, Reconnecting) => true,
            (Authenticating, Connected) | (Authenticating, Reconnecting) => true,
            (Connected, Reconnecting) => true,
            (Reconnecting, Connecting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Authenticating => write!(f, "authenticating"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", Connected), "connected");
        assert_eq!(format!("{}", Authenticating), "authenticating");
        assert_eq!(format!("{}", Disconnected), "disconnected");
    }

    #[test]
    fn test_happy_path_transitions() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Authenticating));
        assert!(Authenticating.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Disconnected));
    }

    #[test]
    fn test_teardown_always_allowed() {
        for state in [Disconnected, Connecting, Authenticating, Connected, Reconnecting] {
            assert!(state.can_transition_to(Disconnected));
        }
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Authenticating));
        assert!(!Connecting.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Connected.can_transition_to(Connected));
        assert!(!Reconnecting.can_transition_to(Connected));
    }

    #[test]
    fn test_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), Disconnected);
        assert!(!ConnectionState::default().is_connected());
    }
}
