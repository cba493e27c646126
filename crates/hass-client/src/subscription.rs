//! Subscription registry
//!
//! Every subscription gets its own worker task fed by an unbounded queue.
//! The receive loop only enqueues, so a slow or broken handler never holds
//! up the socket, and events for one subscription are handled in the order
//! the server sent them. Nothing orders events across subscriptions.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc;

use hass_core::ClientError;
use hass_protocol::MessageId;

/// Receives the events pushed for one subscription
#[async_trait]
pub trait EventHandler: Send + 'static {
    /// Handle one event payload
    ///
    /// An error is logged and the next event is still delivered.
    async fn handle(&mut self, event: Value) -> anyhow::Result<()>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: FnMut(Value) -> anyhow::Result<()> + Send + 'static,
{
    async fn handle(&mut self, event: Value) -> anyhow::Result<()> {
        (self)(event)
    }
}

/// Active subscriptions indexed by the id of their subscribe command
#[derive(Default)]
pub struct SubscriptionRegistry {
    workers: DashMap<MessageId, mpsc::UnboundedSender<Value>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            workers: DashMap::new(),
        }
    }

    /// Register `handler` under `id` and start its worker
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(
        &self,
        id: MessageId,
        handler: Box<dyn EventHandler>,
    ) -> Result<(), ClientError> {
        match self.workers.entry(id) {
            Entry::Occupied(_) => Err(ClientError::DuplicateIdentifier(id)),
            Entry::Vacant(slot) => {
                let (tx, rx) = mpsc::unbounded_channel();
                slot.insert(tx);
                tokio::spawn(run_worker(id, handler, rx));
                tracing::debug!(subscription = %id, "Subscription registered");
                Ok(())
            }
        }
    }

    /// Queue `event` for the subscription `id`
    ///
    /// Events for unknown subscriptions are dropped; this happens for
    /// subscriptions that were already torn down.
    pub fn deliver(&self, id: MessageId, event: Value) -> bool {
        match self.workers.get(&id) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                tracing::debug!(subscription = %id, "Event for unknown subscription, dropping");
                false
            }
        }
    }

    /// Remove a subscription
    ///
    /// Events already queued are still handled, then the worker exits.
    pub fn unregister(&self, id: MessageId) -> bool {
        let removed = self.workers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscription = %id, "Subscription removed");
        }
        removed
    }

    /// Remove every subscription, returning how many there were
    pub fn clear(&self) -> usize {
        let count = self.workers.len();
        self.workers.clear();
        count
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: MessageId) -> bool {
        self.workers.contains_key(&id)
    }

    /// Number of active subscriptions
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

async fn run_worker(
    id: MessageId,
    mut handler: Box<dyn EventHandler>,
    mut events: mpsc::UnboundedReceiver<Value>,
) {
    while let Some(event) = events.recv().await {
        match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(subscription = %id, "Event handler failed: {:#}", e);
            }
            Err(panic) => {
                tracing::error!(
                    subscription = %id,
                    "Event handler panicked: {}",
                    panic_message(panic.as_ref())
                );
            }
        }
    }
    tracing::debug!(subscription = %id, "Subscription worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    async fn recv(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    fn forwarding(tx: mpsc::UnboundedSender<Value>) -> Box<dyn EventHandler> {
        Box::new(move |event: Value| -> anyhow::Result<()> {
            let _ = tx.send(event);
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_deliver_preserves_order() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(MessageId(5), forwarding(tx)).unwrap();

        for n in 0..50 {
            assert!(registry.deliver(MessageId(5), json!(n)));
        }
        for n in 0..50 {
            assert_eq!(recv(&mut rx).await, json!(n));
        }
    }

    #[tokio::test]
    async fn test_unknown_subscription_is_ignored() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.deliver(MessageId(42), json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_duplicate_register_fails() {
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.register(MessageId(1), forwarding(tx.clone())).unwrap();

        let err = registry.register(MessageId(1), forwarding(tx)).unwrap_err();
        assert_eq!(err, ClientError::DuplicateIdentifier(MessageId(1)));
    }

    #[tokio::test]
    async fn test_handler_panic_does_not_stop_worker() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry
            .register(
                MessageId(2),
                Box::new(move |event: Value| -> anyhow::Result<()> {
                    if event == json!("boom") {
                        panic!("handler exploded");
                    }
                    let _ = tx.send(event);
                    Ok(())
                }),
            )
            .unwrap();

        registry.deliver(MessageId(2), json!("boom"));
        registry.deliver(MessageId(2), json!("after"));

        assert_eq!(recv(&mut rx).await, json!("after"));
    }

    #[tokio::test]
    async fn test_handler_error_does_not_affect_other_subscriptions() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry
            .register(
                MessageId(1),
                Box::new(|_event: Value| -> anyhow::Result<()> {
                    anyhow::bail!("always fails")
                }),
            )
            .unwrap();
        registry.register(MessageId(2), forwarding(tx)).unwrap();

        registry.deliver(MessageId(1), json!(1));
        registry.deliver(MessageId(2), json!(2));
        registry.deliver(MessageId(1), json!(3));
        registry.deliver(MessageId(2), json!(4));

        assert_eq!(recv(&mut rx).await, json!(2));
        assert_eq!(recv(&mut rx).await, json!(4));
    }

    #[tokio::test]
    async fn test_unregister_drains_then_stops() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(MessageId(9), forwarding(tx)).unwrap();

        registry.deliver(MessageId(9), json!("queued"));
        assert!(registry.unregister(MessageId(9)));
        assert!(!registry.deliver(MessageId(9), json!("late")));

        assert_eq!(recv(&mut rx).await, json!("queued"));
        // Worker dropped the handler, which held the only sender
        let closed = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(closed.is_none());
    }

    #[tokio::test]
    async fn test_clear_counts_subscriptions() {
        let registry = SubscriptionRegistry::new();
        for n in 1..=3 {
            let (tx, _rx) = mpsc::unbounded_channel();
            registry.register(MessageId(n), forwarding(tx)).unwrap();
        }

        assert_eq!(registry.clear(), 3);
        assert!(registry.is_empty());
    }
}
