//! Keepalive: periodic `ping`, teardown on prolonged silence

use std::sync::Arc;
use std::time::Duration;

use hass_core::ClientError;
use hass_protocol::ClientMessage;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{Connection, Teardown};

pub(super) async fn run(connection: Arc<Connection>, interval: Duration, timeout: Duration) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = connection.cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let idle = connection.idle_for();
        if idle >= timeout {
            connection.teardown(Teardown::Lost(ClientError::Transport(format!(
                "no traffic from server for {:?}",
                idle
            ))));
            return;
        }

        let ping = ClientMessage::Ping {
            id: connection.next_id(),
        };
        tokio::select! {
            _ = connection.cancel.cancelled() => return,
            result = connection.send(&ping) => {
                if let Err(e) = result {
                    // The writer already tore the connection down
                    tracing::debug!("Keepalive ping not sent: {}", e);
                    return;
                }
            }
        }
    }
}
