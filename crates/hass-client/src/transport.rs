//! WebSocket transport
//!
//! Thin wrapper around `tokio-tungstenite` that hands out separate
//! reader/writer halves. The writer half is owned by exactly one task
//! (see `connection::writer`); the reader half by the receive loop.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use hass_core::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A frame received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum WsFrame {
    /// UTF-8 text frame, carrying one JSON envelope
    Text(String),
    /// Binary frame (not used by Home Assistant)
    Binary(Vec<u8>),
    /// Transport-level ping
    Ping(Vec<u8>),
    /// Transport-level pong
    Pong(Vec<u8>),
    /// Close frame
    Close {
        /// Close code (1005 when the peer sent none)
        code: u16,
        /// Close reason
        reason: String,
    },
}

/// Write half of a WebSocket connection
pub struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

impl WsWriter {
    /// Send a text frame
    pub async fn send_text(&mut self, text: String) -> Result<(), ClientError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| ClientError::Transport(format!("send failed: {}", e)))
    }

    /// Send a close frame and flush the sink
    pub async fn close(&mut self) -> Result<(), ClientError> {
        self.sink
            .close()
            .await
            .map_err(|e| ClientError::Transport(format!("close failed: {}", e)))
    }
}

/// Read half of a WebSocket connection
pub struct WsReader {
    stream: SplitStream<WsStream>,
}

impl WsReader {
    /// Receive the next frame, `None` once the stream has ended
    pub async fn recv(&mut self) -> Option<Result<WsFrame, ClientError>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(Message::Text(text)) => WsFrame::Text(text),
                Ok(Message::Binary(data)) => WsFrame::Binary(data),
                Ok(Message::Ping(data)) => WsFrame::Ping(data),
                Ok(Message::Pong(data)) => WsFrame::Pong(data),
                Ok(Message::Close(close)) => {
                    let (code, reason) = close
                        .map(|c| (u16::from(c.code), c.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    WsFrame::Close { code, reason }
                }
                // Raw frames are only produced when writing
                Ok(Message::Frame(_)) => continue,
                Err(e) => {
                    return Some(Err(ClientError::Transport(format!("read failed: {}", e))));
                }
            };
            return Some(Ok(frame));
        }
    }
}

/// Open a WebSocket connection to `url` (`ws://` or `wss://`)
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader), ClientError> {
    tracing::debug!("Opening WebSocket to {}", url);

    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| ClientError::Transport(format!("failed to connect to {}: {}", url, e)))?;

    let (sink, stream) = stream.split();
    Ok((WsWriter { sink }, WsReader { stream }))
}
