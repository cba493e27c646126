//! Single writer task
//!
//! Owns the write half of the socket. Callers never touch the sink; they
//! queue frames and wait for the ack.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::{Connection, Outbound, Teardown};
use crate::transport::WsWriter;

/// Upper bound on sending the close frame while shutting down
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

pub(super) async fn run(
    mut writer: WsWriter,
    mut outbound: mpsc::Receiver<Outbound>,
    connection: Arc<Connection>,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = connection.cancel.cancelled() => break,
            frame = outbound.recv() => frame,
        };

        let Some(Outbound { text, ack }) = frame else {
            break;
        };

        match writer.send_text(text).await {
            Ok(()) => {
                let _ = ack.send(Ok(()));
            }
            Err(e) => {
                let _ = ack.send(Err(e.clone()));
                connection.teardown(Teardown::Lost(e));
                break;
            }
        }
    }

    // Callers still queued get ConnectionClosed from their dropped ack
    drop(outbound);

    match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => tracing::debug!("Close frame sent"),
        Ok(Err(e)) => tracing::debug!("Could not send close frame: {}", e),
        Err(_) => tracing::debug!("Timed out sending close frame"),
    }
    connection.writer_done.cancel();
}
