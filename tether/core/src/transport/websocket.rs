//! WebSocket Transport
//!
//! Client-side socket connector. Each text message from the backend is one
//! JSON envelope; outbound wire strings are written as text messages. A read
//! task and a write task bridge the socket halves to the link channels.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::Frame;
use crate::transport::session_url;
use crate::transport::traits::{StreamConnector, StreamLink, TransportError, LINK_CAPACITY};

/// Connector for `ws://` / `wss://` endpoints
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    /// Endpoint, optionally containing `{session}`
    endpoint: String,
}

impl WebSocketConnector {
    /// Create a connector for an endpoint
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Get the endpoint template
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl StreamConnector for WebSocketConnector {
    async fn connect(&self, session_id: &str) -> Result<StreamLink, TransportError> {
        let url = session_url(&self.endpoint, session_id);

        let (socket, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{url}: {e}")))?;

        let (mut sink, mut stream) = socket.split();
        let (link, mut outbound_rx, inbound_tx) = StreamLink::channel(LINK_CAPACITY);

        // Read task: socket -> inbound frames
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        if inbound_tx.send(Frame::Envelope(text)).await.is_err() {
                            tracing::debug!("Frame receiver dropped");
                            break;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        tracing::debug!(frame = ?frame, "Socket closed by backend");
                        break;
                    }
                    // Binary frames are not part of the protocol; ping/pong is
                    // answered by tungstenite itself.
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Socket read error");
                        break;
                    }
                }
            }
        });

        // Write task: outbound strings -> socket
        tokio::spawn(async move {
            while let Some(wire) = outbound_rx.recv().await {
                if let Err(e) = sink.send(Message::Text(wire)).await {
                    tracing::warn!(error = %e, "Socket write error");
                    break;
                }
            }
            let _ = sink.close().await;
            reader.abort();
        });

        tracing::info!(url = %url, "WebSocket connected");
        Ok(link)
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 9 (discard) on localhost is not expected to speak WebSocket
        let connector = WebSocketConnector::new("ws://127.0.0.1:9/ws");
        let result = connector.connect("abc").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[test]
    fn test_endpoint_accessor() {
        let connector = WebSocketConnector::new("ws://host/{session}");
        assert_eq!(connector.endpoint(), "ws://host/{session}");
        assert_eq!(connector.name(), "websocket");
    }
}
