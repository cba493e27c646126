//! Receive loop
//!
//! The only task reading from the socket. Frames are handled strictly in
//! arrival order; results go to the correlation table, events to the
//! subscription registry.

use std::sync::Arc;

use hass_core::ClientError;
use hass_protocol::{decode, ServerMessage};

use super::{Connection, Teardown};
use crate::transport::{WsFrame, WsReader};

pub(super) async fn run(mut reader: WsReader, connection: Arc<Connection>) {
    let cause = loop {
        let frame = tokio::select! {
            _ = connection.cancel.cancelled() => return,
            frame = reader.recv() => frame,
        };

        let frame = match frame {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => break e,
            None => break ClientError::Transport("connection closed by server".to_string()),
        };
        connection.touch();

        match frame {
            WsFrame::Text(text) => route(&connection, &text),
            WsFrame::Binary(data) => {
                tracing::debug!("Ignoring binary frame ({} bytes)", data.len());
            }
            WsFrame::Ping(_) | WsFrame::Pong(_) => {}
            WsFrame::Close { code, reason } => {
                tracing::info!("Server sent close frame ({} {})", code, reason);
                break ClientError::Transport(format!("closed by server ({})", code));
            }
        }
    };

    connection.teardown(Teardown::Lost(cause));
}

/// Decode one text frame and hand it to its consumer
fn route(connection: &Connection, text: &str) {
    let message = match decode(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Discarding malformed frame: {}", e);
            return;
        }
    };

    match message {
        ServerMessage::Result { id, outcome } => {
            connection
                .pending
                .resolve(id, outcome.map_err(ClientError::from));
        }
        ServerMessage::Event { id, event } => {
            connection.subscriptions.deliver(id, event);
        }
        ServerMessage::Pong { id } => {
            tracing::trace!("Pong {:?}", id);
        }
        handshake @ (ServerMessage::AuthRequired { .. }
        | ServerMessage::AuthOk { .. }
        | ServerMessage::AuthInvalid { .. }) => {
            tracing::warn!(
                "Ignoring {} received after authentication",
                handshake.type_name()
            );
        }
        ServerMessage::Unknown { kind, id } => {
            tracing::warn!("Ignoring message of unknown type '{}' (id {:?})", kind, id);
        }
    }
}
