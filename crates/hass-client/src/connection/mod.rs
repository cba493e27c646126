//! One authenticated WebSocket connection and the tasks that drive it
//!
//! A [`Connection`] is created after the handshake succeeds and owns:
//!
//! - the correlation table and subscription registry (no state outlives it)
//! - the id counter for this socket
//! - the outbound queue feeding the single writer task
//! - a cancellation token shared by the reader, writer and keepalive tasks
//!
//! Teardown happens once, from whichever side notices first.

mod handshake;
mod keepalive;
mod reader;
mod writer;

pub(crate) use handshake::authenticate;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use hass_core::config::ConnectionConfig;
use hass_core::{ClientError, ConnectionState};
use hass_protocol::{encode, ClientMessage, MessageId};

use crate::correlation::CorrelationTable;
use crate::state::StateMachine;
use crate::subscription::SubscriptionRegistry;
use crate::transport::{WsReader, WsWriter};

/// Capacity of the outbound frame queue
const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// How long `close()` waits for the writer to flush the close frame
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// A frame waiting for the writer task
pub(crate) struct Outbound {
    text: String,
    ack: oneshot::Sender<Result<(), ClientError>>,
}

/// Why a connection is being torn down
#[derive(Debug)]
pub(crate) enum Teardown {
    /// `close()` was called
    Requested,
    /// The transport failed or the server went silent
    Lost(ClientError),
}

pub(crate) struct Connection {
    pending: CorrelationTable,
    subscriptions: SubscriptionRegistry,
    next_id: AtomicU64,
    outbound: mpsc::Sender<Outbound>,
    cancel: CancellationToken,
    writer_done: CancellationToken,
    closed: AtomicBool,
    opened_at: Instant,
    /// Milliseconds after `opened_at` at which the last frame arrived
    last_activity: AtomicU64,
    state: Arc<StateMachine>,
    auto_reconnect: bool,
}

impl Connection {
    fn new(
        state: Arc<StateMachine>,
        auto_reconnect: bool,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let connection = Arc::new(Self {
            pending: CorrelationTable::new(),
            subscriptions: SubscriptionRegistry::new(),
            // Id 0 is never used; the server would reject it anyway
            next_id: AtomicU64::new(1),
            outbound,
            cancel: CancellationToken::new(),
            writer_done: CancellationToken::new(),
            closed: AtomicBool::new(false),
            opened_at: Instant::now(),
            last_activity: AtomicU64::new(0),
            state,
            auto_reconnect,
        });
        (connection, outbound_rx)
    }

    /// Create the connection for an authenticated socket
    ///
    /// The returned receiver feeds the writer; hand it back to
    /// [`Connection::start`] once the connection has been published.
    pub(crate) fn open(
        state: Arc<StateMachine>,
        config: &ConnectionConfig,
    ) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        Self::new(state, config.auto_reconnect)
    }

    /// Start the reader, writer and keepalive tasks
    pub(crate) fn start(
        self: &Arc<Self>,
        writer: WsWriter,
        reader: WsReader,
        outbound: mpsc::Receiver<Outbound>,
        config: &ConnectionConfig,
    ) {
        tokio::spawn(writer::run(writer, outbound, Arc::clone(self)));
        tokio::spawn(reader::run(reader, Arc::clone(self)));
        if config.keepalive_enabled() {
            tokio::spawn(keepalive::run(
                Arc::clone(self),
                config.keepalive_interval,
                config.keepalive_timeout,
            ));
        }
    }

    /// Allocate the next correlation id
    pub(crate) fn next_id(&self) -> MessageId {
        MessageId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn pending(&self) -> &CorrelationTable {
        &self.pending
    }

    pub(crate) fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Hand a message to the writer and wait until it is on the wire
    pub(crate) async fn send(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let text = encode(message)?;
        let (ack, ack_rx) = oneshot::channel();

        self.outbound
            .send(Outbound { text, ack })
            .await
            .map_err(|_| ClientError::ConnectionClosed)?;

        ack_rx.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    /// Record inbound traffic for the keepalive check
    fn touch(&self) {
        let elapsed = self.opened_at.elapsed().as_millis() as u64;
        self.last_activity.store(elapsed, Ordering::Relaxed);
    }

    /// Time since the last inbound frame (or since the connection opened)
    fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_activity.load(Ordering::Relaxed));
        self.opened_at.elapsed().saturating_sub(last)
    }

    /// Tear the connection down; only the first call has any effect
    ///
    /// Stops every task, moves the state machine out of `Connected`, fails
    /// every pending request with `ConnectionClosed` and drops all
    /// subscriptions. Returns `false` if the connection was already down.
    pub(crate) fn teardown(&self, cause: Teardown) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();

        let next = match &cause {
            Teardown::Requested => {
                tracing::info!("Connection closed");
                ConnectionState::Disconnected
            }
            Teardown::Lost(err) => {
                tracing::warn!("Connection lost: {}", err);
                if self.auto_reconnect && self.state.current().is_connected() {
                    ConnectionState::Reconnecting
                } else {
                    ConnectionState::Disconnected
                }
            }
        };
        if self.state.transition(next).is_err() {
            let _ = self.state.transition(ConnectionState::Disconnected);
        }

        let pending = self.pending.resolve_all_with(ClientError::ConnectionClosed);
        let subscriptions = self.subscriptions.clear();
        tracing::debug!(
            pending,
            subscriptions,
            "Resolved outstanding requests after teardown"
        );
        true
    }

    /// Wait (bounded) for the writer to send its close frame
    pub(crate) async fn wait_flushed(&self) {
        if tokio::time::timeout(CLOSE_GRACE, self.writer_done.cancelled())
            .await
            .is_err()
        {
            tracing::debug!("Writer did not finish within {:?}", CLOSE_GRACE);
        }
    }
}
