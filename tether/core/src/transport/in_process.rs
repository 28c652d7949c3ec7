//! In-Process Transport
//!
//! Channel-based connector for embedded backends and tests. The connector and
//! an [`InProcessServer`] are created as a pair; every successful `connect`
//! hands the server a [`ServerConnection`] it can write frames to.
//!
//! # Usage
//!
//! ```ignore
//! let (connector, mut server) = InProcessConnector::new_pair();
//!
//! // Give the connector to the connection manager, then on the backend side:
//! let mut conn = server.accept().await.unwrap();
//! conn.send_envelope("text_chunk", "r1", json!({ "text": "Hi" })).await;
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::protocol::Frame;

use super::traits::{StreamConnector, StreamLink, TransportError, LINK_CAPACITY};

/// Shared switches between the connector and its server
#[derive(Debug, Default)]
struct Switches {
    refuse: AtomicBool,
    attempts: AtomicU32,
}

/// In-process connector using tokio channels
#[derive(Clone, Debug)]
pub struct InProcessConnector {
    accept_tx: mpsc::UnboundedSender<ServerConnection>,
    switches: Arc<Switches>,
    capacity: usize,
}

/// Backend side of an in-process connector
#[derive(Debug)]
pub struct InProcessServer {
    accept_rx: mpsc::UnboundedReceiver<ServerConnection>,
    switches: Arc<Switches>,
}

/// One accepted link, seen from the backend
///
/// Dropping it closes the link from the client's point of view.
#[derive(Debug)]
pub struct ServerConnection {
    /// Session the client connected with
    pub session_id: String,
    to_client: mpsc::Sender<Frame>,
    from_client: mpsc::Receiver<String>,
}

impl InProcessConnector {
    /// Create a connector and its server
    #[must_use]
    pub fn new_pair() -> (Self, InProcessServer) {
        Self::new_pair_with_capacity(LINK_CAPACITY)
    }

    /// Create with custom channel capacity
    #[must_use]
    pub fn new_pair_with_capacity(capacity: usize) -> (Self, InProcessServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let switches = Arc::new(Switches::default());

        let connector = Self {
            accept_tx,
            switches: Arc::clone(&switches),
            capacity,
        };
        (connector, InProcessServer { accept_rx, switches })
    }
}

#[async_trait]
impl StreamConnector for InProcessConnector {
    async fn connect(&self, session_id: &str) -> Result<StreamLink, TransportError> {
        self.switches.attempts.fetch_add(1, Ordering::SeqCst);

        if self.switches.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "In-process server refusing connections".to_string(),
            ));
        }

        let (link, from_client, to_client) = StreamLink::channel(self.capacity);
        let conn = ServerConnection {
            session_id: session_id.to_string(),
            to_client,
            from_client,
        };

        self.accept_tx
            .send(conn)
            .map_err(|_| TransportError::ConnectionFailed("In-process server dropped".to_string()))?;

        Ok(link)
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}

impl InProcessServer {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<ServerConnection> {
        self.accept_rx.recv().await
    }

    /// Take an already-queued connection without waiting
    pub fn try_accept(&mut self) -> Option<ServerConnection> {
        self.accept_rx.try_recv().ok()
    }

    /// Make subsequent connects fail (or succeed again)
    pub fn set_refusing(&self, refuse: bool) {
        self.switches.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connect attempts seen so far, refused ones included
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.switches.attempts.load(Ordering::SeqCst)
    }
}

impl ServerConnection {
    /// Send a raw frame
    ///
    /// Returns `false` once the client side is gone.
    pub async fn send_frame(&self, frame: Frame) -> bool {
        self.to_client.send(frame).await.is_ok()
    }

    /// Send a JSON envelope built from its parts
    pub async fn send_envelope(&self, event: &str, run_id: &str, payload: Value) -> bool {
        let envelope = json!({ "event": event, "run_id": run_id, "payload": payload });
        self.send_frame(Frame::Envelope(envelope.to_string())).await
    }

    /// Wait for the next wire string written by the client
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Take a wire string written by the client without waiting
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_frame, EventKind};

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let (connector, mut server) = InProcessConnector::new_pair();

        let mut link = connector.connect("sess-1").await.unwrap();
        let mut conn = server.accept().await.unwrap();
        assert_eq!(conn.session_id, "sess-1");

        assert!(conn.send_envelope("text_chunk", "r1", json!({ "text": "Hi" })).await);
        let frame = link.inbound.recv().await.unwrap();
        let event = decode_frame(&frame).unwrap();
        assert_eq!(event.kind(), Some(EventKind::TextChunk));

        link.outbound.send("hello".to_string()).await.unwrap();
        assert_eq!(conn.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_refusing() {
        let (connector, server) = InProcessConnector::new_pair();
        server.set_refusing(true);

        let result = connector.connect("sess-1").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert_eq!(server.attempts(), 1);

        server.set_refusing(false);
        assert!(connector.connect("sess-1").await.is_ok());
        assert_eq!(server.attempts(), 2);
    }

    #[tokio::test]
    async fn test_dropping_server_connection_closes_link() {
        let (connector, mut server) = InProcessConnector::new_pair();
        let mut link = connector.connect("sess-1").await.unwrap();

        let conn = server.accept().await.unwrap();
        drop(conn);

        assert!(link.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_after_server_dropped() {
        let (connector, server) = InProcessConnector::new_pair();
        drop(server);
        assert!(connector.connect("sess-1").await.is_err());
    }
}
