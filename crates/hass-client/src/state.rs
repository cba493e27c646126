//! Connection lifecycle state, published on a watch channel

use tokio::sync::watch;

use hass_core::{ClientError, ConnectionState};

/// Guards lifecycle transitions and notifies observers
///
/// Every change goes through the allowed-transition table in
/// [`ConnectionState::can_transition_to`].
#[derive(Debug)]
pub struct StateMachine {
    tx: watch::Sender<ConnectionState>,
}

impl StateMachine {
    /// Create a state machine in `Disconnected`
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// Current state
    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Receiver that observes every subsequent transition
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `next`, returning the state that was left
    ///
    /// Moving to the current state is a no-op success.
    pub fn transition(&self, next: ConnectionState) -> Result<ConnectionState, ClientError> {
        self.apply(None, next)
    }

    /// Move to `next` only if the current state is `expected`
    pub fn transition_from(
        &self,
        expected: ConnectionState,
        next: ConnectionState,
    ) -> Result<(), ClientError> {
        self.apply(Some(expected), next).map(|_| ())
    }

    fn apply(
        &self,
        expected: Option<ConnectionState>,
        next: ConnectionState,
    ) -> Result<ConnectionState, ClientError> {
        let mut outcome = Ok(next);

        self.tx.send_if_modified(|state| {
            let from = *state;
            let allowed = match expected {
                Some(expected) => from == expected && from.can_transition_to(next),
                None => from == next || from.can_transition_to(next),
            };

            if !allowed {
                outcome = Err(ClientError::InvalidTransition { from, to: next });
                return false;
            }

            outcome = Ok(from);
            if from == next {
                return false;
            }
            *state = next;
            true
        });

        if let Ok(from) = outcome {
            if from != next {
                tracing::debug!(from = %from, to = %next, "Connection state changed");
            }
        }
        outcome
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}
