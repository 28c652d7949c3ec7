//! Text-Stream Transport
//!
//! Opens a long-lived HTTP GET and decodes its body as `event:`/`data:`
//! records. The stream is receive-only: chat content for this transport goes
//! over an HTTP POST (see [`crate::commands`]), and outbound wire strings such
//! as heartbeat pings are discarded.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use crate::protocol::sse;
use crate::transport::session_url;
use crate::transport::traits::{StreamConnector, StreamLink, TransportError, LINK_CAPACITY};

/// Connector for `http://` / `https://` event-stream endpoints
#[derive(Clone, Debug)]
pub struct SseConnector {
    endpoint: String,
    http: reqwest::Client,
}

impl SseConnector {
    /// Create a connector for an endpoint
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, connect_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Self::with_client(endpoint, http))
    }

    /// Create a connector sharing an existing HTTP client
    #[must_use]
    pub fn with_client(endpoint: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }
}

#[async_trait]
impl StreamConnector for SseConnector {
    async fn connect(&self, session_id: &str) -> Result<StreamLink, TransportError> {
        let url = session_url(&self.endpoint, session_id);

        let response = self
            .http
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{url}: {e}")))?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        let (link, mut outbound_rx, inbound_tx) = StreamLink::channel(LINK_CAPACITY);

        let reader = tokio::spawn(async move {
            let frames = sse::frames(response.bytes_stream());
            futures::pin_mut!(frames);

            while let Some(frame) = frames.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "Event stream read error");
                        return;
                    }
                };
                if inbound_tx.send(frame).await.is_err() {
                    return;
                }
            }
            tracing::debug!("Event stream ended");
        });

        // Receive-only: drain outbound until the link is dropped
        tokio::spawn(async move {
            while let Some(wire) = outbound_rx.recv().await {
                tracing::trace!(len = wire.len(), "Discarding outbound frame on event stream");
            }
            reader.abort();
        });

        tracing::info!(url = %url, "Event stream connected");
        Ok(link)
    }

    fn name(&self) -> &'static str {
        "sse"
    }
}
