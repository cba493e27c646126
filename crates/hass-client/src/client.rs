//! Command dispatcher and connection lifecycle
//!
//! [`HassClient`] is the entry point collaborators use: connect, send
//! commands, manage subscriptions, close. It is cheap to clone; all clones
//! share one connection, so any number of tasks can dispatch concurrently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use hass_core::config::ConnectionConfig;
use hass_core::{ClientError, ConnectionState};
use hass_protocol::{ClientMessage, MessageId};

use crate::connection::{authenticate, Connection, Teardown};
use crate::reconnect::ExponentialBackoff;
use crate::state::StateMachine;
use crate::subscription::EventHandler;
use crate::transport;

/// Client for the Home Assistant WebSocket API
///
/// # Example
///
/// ```no_run
/// use hass_client::HassClient;
/// use hass_core::config::ConnectionConfig;
///
/// # async fn run() -> Result<(), hass_core::ClientError> {
/// let client = HassClient::new(ConnectionConfig::new("http://homeassistant.local:8123", "token"));
/// client.connect().await?;
///
/// let states = client.send_command("get_states", Default::default()).await?;
/// println!("{} entities", states.as_array().map_or(0, |s| s.len()));
///
/// client.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct HassClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ConnectionConfig,
    state: Arc<StateMachine>,
    connection: RwLock<Option<Arc<Connection>>>,
    supervisor_started: AtomicBool,
}

impl HassClient {
    /// Create a disconnected client
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                state: Arc::new(StateMachine::new()),
                connection: RwLock::new(None),
                supervisor_started: AtomicBool::new(false),
            }),
        }
    }

    /// Configuration this client was created with
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.current()
    }

    /// Whether commands can be sent right now
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver notified of every state transition
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Open the socket and authenticate
    ///
    /// Succeeds immediately if already connected. Fails with
    /// `InvalidTransition` while another attempt is in progress, with
    /// `AuthenticationFailed` if the token is rejected, and with
    /// `UnexpectedHandshake` if the server does not follow the handshake.
    /// On any failure the client is left `Disconnected`.
    pub async fn connect(&self) -> Result<(), ClientError> {
        match self.inner.state.current() {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Disconnected => {}
            from => {
                return Err(ClientError::InvalidTransition {
                    from,
                    to: ConnectionState::Connecting,
                });
            }
        }
        self.inner
            .state
            .transition_from(ConnectionState::Disconnected, ConnectionState::Connecting)?;

        if let Err(e) = self.inner.establish().await {
            tracing::warn!("Connection attempt failed: {}", e);
            let _ = self.inner.state.transition(ConnectionState::Disconnected);
            return Err(e);
        }

        ClientInner::ensure_reconnect_supervisor(&self.inner);
        Ok(())
    }

    /// Connect, retrying transport failures with backoff
    ///
    /// Authentication and handshake failures are returned at once since
    /// retrying them would fail the same way.
    pub async fn connect_with_retry(
        &self,
        mut backoff: ExponentialBackoff,
    ) -> Result<(), ClientError> {
        loop {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    let delay = backoff.next_delay();
                    tracing::warn!("Connection failed: {}. Retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Close the connection
    ///
    /// Every in-flight command resolves with `ConnectionClosed`; afterwards
    /// commands fail with `NotConnected`. Calling it again is harmless.
    pub async fn close(&self) {
        if let Some(connection) = self.inner.replace_connection(None) {
            if connection.teardown(Teardown::Requested) {
                connection.wait_flushed().await;
            }
        }
        // Also stops a handshake or reconnect that is still underway
        let _ = self.inner.state.transition(ConnectionState::Disconnected);
    }

    /// Send a command and wait for its result, bounded by `command_timeout`
    pub async fn send_command(
        &self,
        command: &str,
        params: Map<String, Value>,
    ) -> Result<Value, ClientError> {
        self.send_command_with_timeout(command, params, self.inner.config.command_timeout)
            .await
    }

    /// Send a command and wait at most `timeout` for its result
    ///
    /// `params` are merged into the envelope next to `id` and `type`.
    pub async fn send_command_with_timeout(
        &self,
        command: &str,
        params: Map<String, Value>,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let connection = self.live_connection()?;
        let id = connection.next_id();
        dispatch(&connection, id, command, params, timeout).await
    }

    /// Subscribe to bus events, optionally limited to one event type
    ///
    /// Returns the subscription id, which is also the id of the
    /// `subscribe_events` command. The handler stays registered until
    /// [`unsubscribe`](Self::unsubscribe) or the connection ends.
    pub async fn subscribe<H: EventHandler>(
        &self,
        event_type: Option<&str>,
        handler: H,
    ) -> Result<MessageId, ClientError> {
        let mut params = Map::new();
        if let Some(event_type) = event_type {
            params.insert("event_type".into(), Value::from(event_type));
        }
        self.subscribe_command("subscribe_events", params, handler)
            .await
    }

    /// Issue any subscription-style command (e.g. `subscribe_trigger`)
    ///
    /// The server tags every event for the subscription with the id of the
    /// command that created it, so that id is the key. The handler is in
    /// place before the command goes out, so no early event is missed.
    pub async fn subscribe_command<H: EventHandler>(
        &self,
        command: &str,
        params: Map<String, Value>,
        handler: H,
    ) -> Result<MessageId, ClientError> {
        let connection = self.live_connection()?;
        let id = connection.next_id();
        connection.subscriptions().register(id, Box::new(handler))?;

        match dispatch(
            &connection,
            id,
            command,
            params,
            self.inner.config.command_timeout,
        )
        .await
        {
            Ok(_) => {
                tracing::info!(subscription = %id, command, "Subscribed");
                Ok(id)
            }
            Err(e) => {
                connection.subscriptions().unregister(id);
                Err(e)
            }
        }
    }

    /// Subscribe and receive events on a channel instead of a handler
    pub async fn subscribe_channel(
        &self,
        event_type: Option<&str>,
    ) -> Result<(MessageId, mpsc::UnboundedReceiver<Value>), ClientError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .subscribe(event_type, move |event: Value| -> anyhow::Result<()> {
                // A dropped receiver just means nobody is listening any more
                let _ = tx.send(event);
                Ok(())
            })
            .await?;
        Ok((id, rx))
    }

    /// Cancel a subscription
    ///
    /// The local handler is removed whatever the server answers.
    pub async fn unsubscribe(&self, subscription: MessageId) -> Result<(), ClientError> {
        let connection = self.live_connection()?;
        if !connection.subscriptions().unregister(subscription) {
            tracing::debug!(subscription = %subscription, "Not subscribed locally");
        }

        let mut params = Map::new();
        params.insert("subscription".into(), Value::from(subscription.as_u64()));
        let id = connection.next_id();
        dispatch(
            &connection,
            id,
            "unsubscribe_events",
            params,
            self.inner.config.command_timeout,
        )
        .await
        .map(|_| ())
    }

    /// Send a keepalive `ping` without waiting for the `pong`
    pub async fn ping(&self) -> Result<(), ClientError> {
        let connection = self.live_connection()?;
        let ping = ClientMessage::Ping {
            id: connection.next_id(),
        };
        connection.send(&ping).await
    }

    /// Number of commands waiting for a result
    pub fn pending_requests(&self) -> usize {
        self.inner
            .current_connection()
            .map_or(0, |c| c.pending().len())
    }

    /// Whether a command with this id is still waiting for its result
    pub fn is_pending(&self, id: MessageId) -> bool {
        self.inner
            .current_connection()
            .is_some_and(|c| c.pending().contains(id))
    }

    /// Number of active subscriptions
    pub fn subscription_count(&self) -> usize {
        self.inner
            .current_connection()
            .map_or(0, |c| c.subscriptions().len())
    }

    fn live_connection(&self) -> Result<Arc<Connection>, ClientError> {
        if !self.inner.state.current().is_connected() {
            return Err(ClientError::NotConnected);
        }
        match self.inner.current_connection() {
            Some(connection) if !connection.is_closed() => Ok(connection),
            _ => Err(ClientError::NotConnected),
        }
    }
}

/// Register, send, and wait for one command under a pre-allocated id
async fn dispatch(
    connection: &Connection,
    id: MessageId,
    command: &str,
    params: Map<String, Value>,
    timeout: Duration,
) -> Result<Value, ClientError> {
    let mut slot = connection.pending().allocate(id)?;

    // Teardown may have swept the table just before the slot went in
    if connection.is_closed() {
        connection.pending().cancel(id);
        return Err(ClientError::NotConnected);
    }

    let deadline = Instant::now() + timeout;
    let timed_out = || ClientError::CommandTimeout {
        command: command.to_string(),
        timeout,
    };

    tracing::debug!(id = %id, command, "Sending command");
    let message = ClientMessage::Command {
        id,
        command: command.to_string(),
        params,
    };

    match tokio::time::timeout_at(deadline, connection.send(&message)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            connection.pending().cancel(id);
            return Err(if e.is_connection_level() {
                ClientError::ConnectionClosed
            } else {
                e
            });
        }
        Err(_) => {
            connection.pending().cancel(id);
            return Err(timed_out());
        }
    }

    match tokio::time::timeout_at(deadline, slot.wait()).await {
        Ok(result) => result,
        Err(_) => {
            if connection.pending().cancel(id) {
                tracing::warn!(id = %id, command, "Command timed out after {:?}", timeout);
                Err(timed_out())
            } else {
                // Resolved between the deadline and the cancel
                slot.try_take().unwrap_or_else(|| Err(timed_out()))
            }
        }
    }
}

impl ClientInner {
    fn current_connection(&self) -> Option<Arc<Connection>> {
        self.connection.read().ok().and_then(|slot| slot.clone())
    }

    fn replace_connection(&self, connection: Option<Arc<Connection>>) -> Option<Arc<Connection>> {
        let mut slot = self
            .connection
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, connection)
    }

    /// Transport handshake, authentication and task startup
    ///
    /// Expects `Connecting`; on success the state is `Connected`. On failure
    /// the caller decides where the state machine goes next.
    async fn establish(&self) -> Result<(), ClientError> {
        let url = self.config.websocket_url();
        tracing::info!("Connecting to {}", url);

        let handshake = async {
            let (mut writer, mut reader) = transport::connect(&url).await?;
            let version =
                authenticate(&self.state, &mut writer, &mut reader, &self.config.token).await?;
            Ok::<_, ClientError>((writer, reader, version))
        };

        let (writer, reader, version) =
            tokio::time::timeout(self.config.connect_timeout, handshake)
                .await
                .map_err(|_| {
                    ClientError::Transport(format!(
                        "handshake did not complete within {:?}",
                        self.config.connect_timeout
                    ))
                })??;

        let (connection, outbound) = Connection::open(Arc::clone(&self.state), &self.config);
        self.replace_connection(Some(Arc::clone(&connection)));

        // Connected before the reader starts, so a loss observed by the
        // reader always happens from Connected
        if self
            .state
            .transition_from(ConnectionState::Authenticating, ConnectionState::Connected)
            .is_err()
        {
            connection.teardown(Teardown::Requested);
            return Err(ClientError::ConnectionClosed);
        }
        connection.start(writer, reader, outbound, &self.config);

        tracing::info!(
            "Connected to Home Assistant {}",
            version.as_deref().unwrap_or("(version unknown)")
        );
        Ok(())
    }

    async fn reconnect_once(&self) -> Result<(), ClientError> {
        self.state
            .transition_from(ConnectionState::Reconnecting, ConnectionState::Connecting)?;

        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                let next = if e.is_retryable() {
                    ConnectionState::Reconnecting
                } else {
                    ConnectionState::Disconnected
                };
                // Fails only if close() ran in the meantime
                self.state.transition(next)?;
                Err(e)
            }
        }
    }

    fn ensure_reconnect_supervisor(this: &Arc<Self>) {
        if !this.config.auto_reconnect || this.supervisor_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let backoff = ExponentialBackoff::from_config(&this.config.backoff);
        tokio::spawn(supervise(
            Arc::downgrade(this),
            this.state.subscribe(),
            backoff,
        ));
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let slot = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = slot.take() {
            connection.teardown(Teardown::Requested);
        }
    }
}

/// Reconnect after unexpected losses until the client is closed or dropped
///
/// Subscriptions die with the connection they were made on; collaborators
/// watch for `Connected` and subscribe again.
async fn supervise(
    inner: Weak<ClientInner>,
    mut changes: watch::Receiver<ConnectionState>,
    mut backoff: ExponentialBackoff,
) {
    while changes.changed().await.is_ok() {
        if *changes.borrow_and_update() != ConnectionState::Reconnecting {
            continue;
        }

        backoff.reset();
        loop {
            let delay = backoff.next_delay();
            tracing::info!("Reconnecting in {:?}", delay);
            tokio::time::sleep(delay).await;

            let Some(inner) = inner.upgrade() else {
                return;
            };
            match inner.reconnect_once().await {
                Ok(()) => {
                    tracing::info!("Reconnected");
                    break;
                }
                Err(ClientError::InvalidTransition { .. }) => {
                    tracing::debug!("Reconnect abandoned, client was closed");
                    break;
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!("Reconnect attempt failed: {}", e);
                }
                Err(e) => {
                    tracing::error!("Giving up reconnecting: {}", e);
                    break;
                }
            }
        }
    }
}
