//! WebSocket transport
//!
//! One session task per connection attempt. The session reports
//! `connecting`, then `connected` once the handshake completes, then
//! `disconnected` when the socket closes or fails.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::driver::Transport;
use super::state::ConnectionState;

/// Interval between keepalive pings on an open socket
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Deadline for the WebSocket handshake
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Transport backed by a WebSocket sync server
pub struct WebSocketTransport {
    url: String,
    peer_id: String,
    handshake_timeout: Duration,
    status_tx: mpsc::Sender<ConnectionState>,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    /// Create a transport and the status channel to feed the connection task
    pub fn new(url: impl Into<String>) -> (Self, mpsc::Receiver<ConnectionState>) {
        let (status_tx, status_rx) = mpsc::channel(16);
        let peer_id = format!("huddle-{}", &uuid::Uuid::new_v4().to_string()[..8]);

        let transport = Self {
            url: url.into(),
            peer_id,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            status_tx,
            session: Mutex::new(None),
        };
        (transport, status_rx)
    }

    /// Override how long a connection attempt may wait for the handshake
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    fn abort_session(&self) -> bool {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        match session.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) {
        self.abort_session();

        let handle = tokio::spawn(run_session(
            self.url.clone(),
            self.peer_id.clone(),
            self.handshake_timeout,
            self.status_tx.clone(),
        ));
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    fn disconnect(&self) {
        if self.abort_session() {
            debug!(peer_id = %self.peer_id, "Session closed");
        }
        if self
            .status_tx
            .try_send(ConnectionState::Disconnected)
            .is_err()
        {
            debug!("Status receiver gone or full");
        }
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.abort_session();
    }
}

async fn run_session(
    url: String,
    peer_id: String,
    handshake_timeout: Duration,
    status_tx: mpsc::Sender<ConnectionState>,
) {
    let _ = status_tx.send(ConnectionState::Connecting).await;
    info!(%url, %peer_id, "Connecting to sync server");

    let handshake = tokio::time::timeout(handshake_timeout, connect_async(url.as_str()));
    let ws_stream = match handshake.await {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            warn!(%url, error = %e, "Connection failed");
            let _ = status_tx.send(ConnectionState::Disconnected).await;
            return;
        }
        Err(_) => {
            warn!(
                %url,
                timeout_ms = handshake_timeout.as_millis() as u64,
                "Timeout waiting for sync server handshake"
            );
            let _ = status_tx.send(ConnectionState::Disconnected).await;
            return;
        }
    };

    let _ = status_tx.send(ConnectionState::Connected).await;
    info!(%url, "Connected to sync server");

    let (mut write, mut read) = ws_stream.split();
    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    keepalive.tick().await;

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    info!("Sync server closed the connection");
                    break;
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Connection error");
                    break;
                }
                Some(Ok(_)) => {}
            },
            _ = keepalive.tick() => {
                if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                    warn!(error = %e, "Keepalive failed");
                    break;
                }
            }
        }
    }

    let _ = status_tx.send(ConnectionState::Disconnected).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_format() {
        let (transport, _status_rx) = WebSocketTransport::new("ws://localhost:1");
        assert!(transport.peer_id().starts_with("huddle-"));
        assert_eq!(transport.peer_id().len(), "huddle-".len() + 8);
        assert_eq!(transport.url(), "ws://localhost:1");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_disconnected() {
        // Bind then drop to get a port nothing listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (transport, mut status_rx) = WebSocketTransport::new(format!("ws://127.0.0.1:{port}"));
        transport.connect();

        let first = tokio::time::timeout(Duration::from_secs(5), status_rx.recv())
            .await
            .unwrap();
        assert_eq!(first, Some(ConnectionState::Connecting));
        let second = tokio::time::timeout(Duration::from_secs(5), status_rx.recv())
            .await
            .unwrap();
        assert_eq!(second, Some(ConnectionState::Disconnected));
    }

    #[tokio::test]
    async fn test_stalled_handshake_times_out() {
        // Accept sockets and hold them open without ever answering
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let (transport, mut status_rx) = WebSocketTransport::new(format!("ws://127.0.0.1:{port}"));
        let transport = transport.with_handshake_timeout(Duration::from_millis(200));
        transport.connect();

        let first = tokio::time::timeout(Duration::from_secs(5), status_rx.recv())
            .await
            .unwrap();
        assert_eq!(first, Some(ConnectionState::Connecting));
        let second = tokio::time::timeout(Duration::from_secs(5), status_rx.recv())
            .await
            .expect("stalled handshake should end the attempt");
        assert_eq!(second, Some(ConnectionState::Disconnected));

        server.abort();
    }

    #[test]
    fn test_default_handshake_timeout() {
        let (transport, _status_rx) = WebSocketTransport::new("ws://localhost:1");
        assert_eq!(transport.handshake_timeout, HANDSHAKE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_disconnect_reports_immediately() {
        let (transport, mut status_rx) = WebSocketTransport::new("ws://127.0.0.1:9");
        transport.disconnect();
        assert_eq!(status_rx.recv().await, Some(ConnectionState::Disconnected));
    }
}
