//! Transport Traits
//!
//! The one seam every transport implements. A connector opens a [`StreamLink`]
//! for a session: a sender for outbound wire strings and a receiver of inbound
//! [`Frame`]s. The link is closed when the inbound receiver yields `None`.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::Frame;

/// Channel capacity used by the bundled connectors
pub const LINK_CAPACITY: usize = 256;

/// Errors that can occur during transport operations
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection to the backend failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// The attempt did not complete in time
    #[error("Connection timed out after {0} ms")]
    Timeout(u64),

    /// The backend answered with a non-success status
    #[error("Unexpected status {0}")]
    Status(u16),

    /// IO error from the underlying transport
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open link to the backend for one session
#[derive(Debug)]
pub struct StreamLink {
    /// Wire strings to write to the backend
    pub outbound: mpsc::Sender<String>,
    /// Frames read from the backend; `None` means the link closed
    pub inbound: mpsc::Receiver<Frame>,
}

impl StreamLink {
    /// Create a link and the peer ends of its channels
    ///
    /// Returns the link plus the receiver of outbound strings and the sender
    /// of inbound frames, for the connector's I/O tasks.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>, mpsc::Sender<Frame>) {
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound) = mpsc::channel(capacity);
        (Self { outbound, inbound }, outbound_rx, inbound_tx)
    }
}

/// Opens links to the backend
///
/// Implementations spawn whatever I/O tasks they need and bridge them to the
/// link's channels. They must not retry: reconnection policy belongs to the
/// connection manager.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a link for `session_id`
    async fn connect(&self, session_id: &str) -> Result<StreamLink, TransportError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("Connection failed"));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err = TransportError::from(io_err);
        assert!(err.to_string().contains("IO error"));

        assert_eq!(
            TransportError::Timeout(250).to_string(),
            "Connection timed out after 250 ms"
        );
    }

    #[tokio::test]
    async fn test_link_channel_wiring() {
        let (mut link, mut outbound_rx, inbound_tx) = StreamLink::channel(4);

        link.outbound.send("ping".to_string()).await.unwrap();
        assert_eq!(outbound_rx.recv().await.as_deref(), Some("ping"));

        inbound_tx
            .send(Frame::Envelope("{}".to_string()))
            .await
            .unwrap();
        assert_eq!(link.inbound.recv().await, Some(Frame::Envelope("{}".to_string())));

        drop(inbound_tx);
        assert_eq!(link.inbound.recv().await, None);
    }
}
