//! In-process mock of the Home Assistant WebSocket endpoint
//!
//! Each accepted connection runs a per-test script against a [`Peer`].

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use hass_client::HassClient;
use hass_core::config::ConnectionConfig;
use hass_core::ConnectionState;

/// Token the mock server accepts
pub const VALID_TOKEN: &str = "valid-token";

/// Mock server listening on a random loopback port
pub struct MockServer {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Start a server; `script` is run for every connection with its
    /// zero-based index
    pub async fn start<F, Fut>(script: F) -> Self
    where
        F: Fn(usize, Peer) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&connections);

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                tokio::spawn(script(index, Peer { ws }));
            }
        });

        Self {
            addr,
            connections,
            task,
        }
    }

    /// Server URL in the form users configure it (`http://host:port`)
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Number of TCP connections accepted so far
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Client configuration pointing at this server, keepalive disabled
    pub fn config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new(self.url(), VALID_TOKEN);
        config.command_timeout = Duration::from_secs(5);
        config.connect_timeout = Duration::from_secs(5);
        config.keepalive_interval = Duration::ZERO;
        config
    }

    /// Connected client for this server
    pub async fn client(&self) -> HassClient {
        let client = HassClient::new(self.config());
        client.connect().await.unwrap();
        client
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Server side of one connection
pub struct Peer {
    ws: WebSocketStream<TcpStream>,
}

impl Peer {
    /// Send a JSON frame
    pub async fn send(&mut self, value: Value) {
        let _ = self.ws.send(Message::Text(value.to_string())).await;
    }

    /// Send a raw text frame
    pub async fn send_raw(&mut self, text: &str) {
        let _ = self.ws.send(Message::Text(text.to_string())).await;
    }

    /// Next JSON frame from the client, `None` once it is gone
    pub async fn recv(&mut self) -> Option<Value> {
        loop {
            match self.ws.next().await? {
                Ok(Message::Text(text)) => return serde_json::from_str(&text).ok(),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Next command, answering keepalive pings along the way
    pub async fn recv_command(&mut self) -> Option<Value> {
        loop {
            let message = self.recv().await?;
            if message["type"] == "ping" {
                self.send(json!({"id": message["id"], "type": "pong"})).await;
                continue;
            }
            return Some(message);
        }
    }

    /// Run the server half of the handshake; `true` if the token was accepted
    pub async fn authenticate(&mut self) -> bool {
        self.send(json!({"type": "auth_required", "ha_version": "2024.1.0"}))
            .await;

        let Some(auth) = self.recv().await else {
            return false;
        };
        if auth["type"] == "auth" && auth["access_token"] == VALID_TOKEN {
            self.send(json!({"type": "auth_ok", "ha_version": "2024.1.0"}))
                .await;
            true
        } else {
            self.send(json!({"type": "auth_invalid", "message": "Invalid access token or password"}))
                .await;
            false
        }
    }

    /// Successful result for command `id`
    pub async fn reply(&mut self, id: &Value, result: Value) {
        self.send(json!({"id": id, "type": "result", "success": true, "result": result}))
            .await;
    }

    /// Failed result for command `id`
    pub async fn reply_error(&mut self, id: &Value, code: &str, message: &str) {
        self.send(json!({
            "id": id,
            "type": "result",
            "success": false,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    /// Push an event for subscription `id`
    pub async fn event(&mut self, id: &Value, event: Value) {
        self.send(json!({"id": id, "type": "event", "event": event}))
            .await;
    }

    /// Send a close frame and drop the socket
    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }

    /// Read and ignore everything until the client goes away
    pub async fn drain(mut self) {
        while self.recv().await.is_some() {}
    }

    /// Answer every command with `null` and every ping with a pong
    pub async fn serve(mut self) {
        while let Some(command) = self.recv_command().await {
            self.reply(&command["id"], Value::Null).await;
        }
    }
}

/// Wait until the client reaches `expected`, panicking after five seconds
pub async fn wait_for_state(client: &HassClient, expected: ConnectionState) {
    let mut changes = client.state_changes();
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *changes.borrow_and_update() == expected {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    })
    .await;

    assert!(
        reached.is_ok(),
        "client never reached {:?}, currently {:?}",
        expected,
        client.state()
    );
    assert_eq!(client.state(), expected);
}
