//! Transport Layer for the Agent Event Stream
//!
//! Provides abstraction over the mechanisms that carry the backend's event
//! stream to this client:
//! - `WebSocket`: bidirectional socket, one JSON envelope per text message
//! - `Sse`: HTTP text stream of `event:`/`data:` records (receive-only)
//! - `InProcess`: direct channel pair (embedded backends, tests)
//!
//! # Design Philosophy
//!
//! A connector only knows how to open one link for one session. Everything
//! stateful (heartbeat, reconnection, session continuity) lives in the
//! connection manager, so every transport gets the same lifecycle for free.

pub mod in_process;
pub mod sse;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

use serde::{Deserialize, Serialize};

// Re-exports for convenience
pub use in_process::{InProcessConnector, InProcessServer, ServerConnection};
pub use sse::SseConnector;
pub use traits::{StreamConnector, StreamLink, TransportError};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;

/// Transport type selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Socket transport carrying JSON envelopes
    #[default]
    WebSocket,
    /// Text-stream transport carrying `event:`/`data:` records
    Sse,
}

impl TransportKind {
    /// Parse from a configuration string
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "websocket" | "ws" | "socket" => Some(Self::WebSocket),
            "sse" | "stream" | "text-stream" => Some(Self::Sse),
            _ => None,
        }
    }
}

/// Placeholder in an endpoint template replaced by the session identifier
pub const SESSION_PLACEHOLDER: &str = "{session}";

/// Build the stream URL for a session
///
/// Endpoints may embed `{session}`; otherwise the identifier is appended as a
/// `session_id` query parameter.
#[must_use]
pub fn session_url(endpoint: &str, session_id: &str) -> String {
    if endpoint.contains(SESSION_PLACEHOLDER) {
        return endpoint.replace(SESSION_PLACEHOLDER, session_id);
    }
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    format!("{endpoint}{separator}session_id={session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_url_template() {
        assert_eq!(
            session_url("ws://host/ws/{session}/events", "abc"),
            "ws://host/ws/abc/events"
        );
    }

    #[test]
    fn test_session_url_query() {
        assert_eq!(session_url("ws://host/ws", "abc"), "ws://host/ws?session_id=abc");
        assert_eq!(
            session_url("http://host/stream?v=2", "abc"),
            "http://host/stream?v=2&session_id=abc"
        );
    }

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!(TransportKind::parse("WS"), Some(TransportKind::WebSocket));
        assert_eq!(TransportKind::parse("sse"), Some(TransportKind::Sse));
        assert_eq!(TransportKind::parse("carrier-pigeon"), None);
    }
}
