//! Correlation table: which commands are still waiting for a result
//!
//! Each in-flight command owns a oneshot receiver; the table keeps the
//! matching sender under the command's id until the receive loop resolves
//! it, the dispatcher cancels it, or the connection tears down.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use hass_core::ClientError;
use hass_protocol::MessageId;

/// Outcome delivered to a waiting command
pub type CommandResult = Result<Value, ClientError>;

/// Receiving side of a registered request
#[derive(Debug)]
pub struct PendingSlot {
    id: MessageId,
    receiver: oneshot::Receiver<CommandResult>,
}

impl PendingSlot {
    /// Id the slot was registered under
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Wait for the slot to be resolved
    ///
    /// A slot whose sender was dropped without a value reports
    /// `ConnectionClosed`.
    pub async fn wait(&mut self) -> CommandResult {
        (&mut self.receiver)
            .await
            .unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Take a result that has already arrived, without waiting
    pub fn try_take(&mut self) -> Option<CommandResult> {
        self.receiver.try_recv().ok()
    }
}

/// Outstanding requests indexed by correlation id
#[derive(Debug, Default)]
pub struct CorrelationTable {
    pending: DashMap<MessageId, oneshot::Sender<CommandResult>>,
}

impl CorrelationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Register an empty slot for `id`
    pub fn allocate(&self, id: MessageId) -> Result<PendingSlot, ClientError> {
        match self.pending.entry(id) {
            Entry::Occupied(_) => Err(ClientError::DuplicateIdentifier(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                slot.insert(tx);
                Ok(PendingSlot { id, receiver: rx })
            }
        }
    }

    /// Fulfil and remove the slot for `id`
    ///
    /// Returns `false` when no slot exists. A late or duplicate server
    /// response lands here and is only logged.
    pub fn resolve(&self, id: MessageId, result: CommandResult) -> bool {
        let Some((_, tx)) = self.pending.remove(&id) else {
            tracing::warn!(id = %id, "Result for unknown request, ignoring");
            return false;
        };

        if tx.send(result).is_err() {
            tracing::debug!(id = %id, "Caller stopped waiting before the result arrived");
        }
        true
    }

    /// Remove the slot for `id` without resolving it
    ///
    /// Returns `false` if the slot was already gone, in which case a result
    /// may be sitting in the caller's receiver.
    pub fn cancel(&self, id: MessageId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Resolve every registered slot with `error` and empty the table
    ///
    /// Returns the number of slots resolved.
    pub fn resolve_all_with(&self, error: ClientError) -> usize {
        let ids: Vec<MessageId> = self.pending.iter().map(|entry| *entry.key()).collect();

        let mut resolved = 0;
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(error.clone()));
                resolved += 1;
            }
        }
        resolved
    }

    /// Whether a slot is registered for `id`
    pub fn contains(&self, id: MessageId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of outstanding requests
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_allocate_and_resolve() {
        let table = CorrelationTable::new();
        let mut slot = table.allocate(MessageId(1)).unwrap();
        assert!(table.contains(MessageId(1)));

        assert!(table.resolve(MessageId(1), Ok(json!([1, 2]))));
        assert!(table.is_empty());
        assert_eq!(slot.wait().await.unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_duplicate_allocate_fails() {
        let table = CorrelationTable::new();
        let _slot = table.allocate(MessageId(7)).unwrap();

        let err = table.allocate(MessageId(7)).unwrap_err();
        assert_eq!(err, ClientError::DuplicateIdentifier(MessageId(7)));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_resolve_leaves_others_alone() {
        let table = CorrelationTable::new();
        let mut slot = table.allocate(MessageId(1)).unwrap();

        assert!(!table.resolve(MessageId(99), Ok(Value::Null)));
        assert!(table.contains(MessageId(1)));

        table.resolve(MessageId(1), Ok(json!("ok")));
        assert_eq!(slot.wait().await.unwrap(), json!("ok"));
    }

    #[test]
    fn test_cancel_after_resolve_is_false() {
        let table = CorrelationTable::new();
        let mut slot = table.allocate(MessageId(3)).unwrap();

        table.resolve(MessageId(3), Ok(json!(true)));
        assert!(!table.cancel(MessageId(3)));
        assert_eq!(slot.try_take(), Some(Ok(json!(true))));
    }

    #[test]
    fn test_cancel_removes_slot() {
        let table = CorrelationTable::new();
        let mut slot = table.allocate(MessageId(4)).unwrap();

        assert!(table.cancel(MessageId(4)));
        assert!(!table.contains(MessageId(4)));
        assert_eq!(slot.try_take(), None);
    }

    #[test]
    fn test_resolve_after_caller_gave_up() {
        let table = CorrelationTable::new();
        let slot = table.allocate(MessageId(5)).unwrap();
        drop(slot);

        assert!(table.resolve(MessageId(5), Ok(Value::Null)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_all_with_closes_everything() {
        let table = CorrelationTable::new();
        let mut slots: Vec<_> = (1..=3)
            .map(|n| table.allocate(MessageId(n)).unwrap())
            .collect();

        assert_eq!(table.resolve_all_with(ClientError::ConnectionClosed), 3);
        assert!(table.is_empty());

        for slot in &mut slots {
            assert_eq!(slot.wait().await, Err(ClientError::ConnectionClosed));
        }
    }
}
