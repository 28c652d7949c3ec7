//! Protocol Codec
//!
//! Typed view of the agent-execution stream. Inbound frames arrive either as a
//! JSON envelope (`{event, run_id, payload}`) on a socket or as `event:`/`data:`
//! pairs on a text stream; both decode into the same [`Event`]. Outbound chat
//! content and heartbeat pings are serialized here as well.
//!
//! # Wire Rules
//!
//! - The envelope must carry a string `event`, a string `run_id` and an object
//!   `payload`. Anything else is a protocol error.
//! - Known event names decode into a tagged payload. A payload whose shape does
//!   not match its event name is rejected, never coerced.
//! - Unknown event names pass through as [`EventPayload::Unknown`] so newer
//!   backends do not break older clients.
//!
//! Apart from [`ChatContent::now`], nothing here touches I/O, logging or clocks.

pub mod sse;

use std::fmt;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Names of the events the client understands
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A run began on the backend
    RunStarted,
    /// A tool invocation began
    ToolCallStarted,
    /// A tool invocation produced its result
    ToolCallFinished,
    /// A slice of streamed text
    TextChunk,
    /// The run reached a terminal state
    RunFinished,
    /// The backend reported an application error
    Error,
    /// Result of a previously submitted command
    CommandResult,
    /// Backend-side view of the connection
    ConnectionState,
}

impl EventKind {
    /// All known kinds, in wire-table order
    pub const ALL: [EventKind; 8] = [
        Self::RunStarted,
        Self::ToolCallStarted,
        Self::ToolCallFinished,
        Self::TextChunk,
        Self::RunFinished,
        Self::Error,
        Self::CommandResult,
        Self::ConnectionState,
    ];

    /// Look up a kind by its wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }

    /// Wire name of this kind
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run_started",
            Self::ToolCallStarted => "tool_call_started",
            Self::ToolCallFinished => "tool_call_finished",
            Self::TextChunk => "text_chunk",
            Self::RunFinished => "run_finished",
            Self::Error => "error",
            Self::CommandResult => "command_result",
            Self::ConnectionState => "connection_state",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload of `run_started`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStartedPayload {
    /// Echo of the input that triggered the run, when the backend sends it
    #[serde(default)]
    pub input: Option<String>,
}

/// Payload of `tool_call_started`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallStartedPayload {
    /// Name of the tool being invoked
    pub tool_name: String,
    /// Backend identifier for the call, if any
    #[serde(default)]
    pub tool_call_id: Option<String>,
    /// Tool arguments, passed through untouched
    #[serde(default)]
    pub args: Value,
    /// Character offset the backend suggests for the tool card
    #[serde(default)]
    pub insert_index: Option<usize>,
}

/// Outcome reported by `tool_call_finished`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    /// The tool produced a result
    Success,
    /// The tool failed
    Error,
}

/// Payload of `tool_call_finished`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFinishedPayload {
    /// Name of the tool that finished (the only matching key)
    pub tool_name: String,
    /// Whether the call succeeded
    pub status: ToolOutcome,
    /// Tool result, passed through untouched
    #[serde(default)]
    pub result: Option<Value>,
    /// Late anchor suggestion; ignored once the call is anchored
    #[serde(default)]
    pub insert_index: Option<usize>,
}

/// Author of a text chunk
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkRole {
    /// Part of the assistant's streamed answer
    #[default]
    Assistant,
    /// Out-of-band system notice, never part of the assistant stream
    System,
}

/// Payload of `text_chunk`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextChunkPayload {
    /// The text delta
    #[serde(alias = "content")]
    pub text: String,
    /// Who authored the chunk
    #[serde(default)]
    pub role: ChunkRole,
    /// Session-wide visitor mode flag carried by system chunks
    #[serde(default)]
    pub visitor_mode: Option<bool>,
}

/// Terminal status carried by `run_finished`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunOutcome {
    /// The run completed normally
    #[default]
    Completed,
    /// The run ended in failure
    Error,
}

/// Payload of `run_finished`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunFinishedPayload {
    /// How the run ended
    #[serde(default)]
    pub status: RunOutcome,
    /// Failure description when `status` is `error`
    #[serde(default)]
    pub error: Option<String>,
}

/// Payload of `error`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error
    pub message: String,
    /// Optional machine-readable code
    #[serde(default)]
    pub code: Option<String>,
}

/// Status of a command result
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    /// The command succeeded
    Success,
    /// The command failed
    Error,
}

/// Result of a command, both as an inbound event and as an HTTP response body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Outcome
    pub status: CommandStatus,
    /// Human-readable summary
    pub message: String,
    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandResult {
    /// Build an error result from a message
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    /// Check whether the result reports success
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == CommandStatus::Success
    }
}

/// Payload of `connection_state`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatePayload {
    /// Backend-reported state label
    pub state: String,
}

/// Tagged payload, one variant per event name
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// `run_started`
    RunStarted(RunStartedPayload),
    /// `tool_call_started`
    ToolCallStarted(ToolCallStartedPayload),
    /// `tool_call_finished`
    ToolCallFinished(ToolCallFinishedPayload),
    /// `text_chunk`
    TextChunk(TextChunkPayload),
    /// `run_finished`
    RunFinished(RunFinishedPayload),
    /// `error`
    Error(ErrorPayload),
    /// `command_result`
    CommandResult(CommandResult),
    /// `connection_state`
    ConnectionState(ConnectionStatePayload),
    /// Any event name this client does not know
    Unknown {
        /// The unrecognized event name
        event: String,
        /// Raw payload object
        payload: Value,
    },
}

/// A decoded inbound event
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// Backend run identifier from the envelope
    pub run_id: String,
    /// Typed payload
    pub payload: EventPayload,
}

impl Event {
    /// Create an event
    #[must_use]
    pub fn new(run_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            run_id: run_id.into(),
            payload,
        }
    }

    /// Known kind of this event, `None` for pass-through events
    #[must_use]
    pub fn kind(&self) -> Option<EventKind> {
        match &self.payload {
            EventPayload::RunStarted(_) => Some(EventKind::RunStarted),
            EventPayload::ToolCallStarted(_) => Some(EventKind::ToolCallStarted),
            EventPayload::ToolCallFinished(_) => Some(EventKind::ToolCallFinished),
            EventPayload::TextChunk(_) => Some(EventKind::TextChunk),
            EventPayload::RunFinished(_) => Some(EventKind::RunFinished),
            EventPayload::Error(_) => Some(EventKind::Error),
            EventPayload::CommandResult(_) => Some(EventKind::CommandResult),
            EventPayload::ConnectionState(_) => Some(EventKind::ConnectionState),
            EventPayload::Unknown { .. } => None,
        }
    }

    /// Wire name of this event
    #[must_use]
    pub fn name(&self) -> &str {
        match &self.payload {
            EventPayload::Unknown { event, .. } => event,
            _ => self.kind().map_or("", EventKind::as_str),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Reasons a frame is dropped
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON or lacks the envelope fields
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The payload is present but not a JSON object
    #[error("Payload for '{event}' is not an object")]
    PayloadNotObject {
        /// Event name of the offending frame
        event: String,
    },

    /// The payload does not match the shape required by its event name
    #[error("Invalid payload for '{event}': {reason}")]
    InvalidPayload {
        /// Event name of the offending frame
        event: String,
        /// Deserializer message
        reason: String,
    },
}

/// A raw frame as delivered by a transport
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// A JSON envelope from a socket transport
    Envelope(String),
    /// An `event:`/`data:` record from a text-stream transport
    Sse {
        /// Event name from the `event:` line
        event: String,
        /// Joined `data:` lines
        data: String,
    },
}

#[derive(Deserialize)]
struct RawEnvelope {
    event: String,
    run_id: String,
    payload: Value,
}

/// Parse a JSON envelope into an event, returning `None` on any protocol error
///
/// Never panics. Use [`decode_event`] when the rejection reason matters.
#[must_use]
pub fn parse_event(raw: &str) -> Option<Event> {
    decode_event(raw).ok()
}

/// Decode a JSON envelope into an event
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the envelope or payload is malformed.
pub fn decode_event(raw: &str) -> Result<Event, ProtocolError> {
    let envelope: RawEnvelope = serde_json::from_str(raw)
        .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;
    decode_parts(&envelope.event, envelope.run_id, envelope.payload)
}

/// Decode any transport frame
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the frame is malformed.
pub fn decode_frame(frame: &Frame) -> Result<Event, ProtocolError> {
    match frame {
        Frame::Envelope(raw) => decode_event(raw),
        Frame::Sse { event, data } => sse::decode_record(event, data),
    }
}

/// Decode an already-split event name, run id and payload
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the payload is not an object or does not
/// match the shape required by `event`.
pub fn decode_parts(event: &str, run_id: String, payload: Value) -> Result<Event, ProtocolError> {
    if !payload.is_object() {
        return Err(ProtocolError::PayloadNotObject {
            event: event.to_string(),
        });
    }

    let Some(kind) = EventKind::from_name(event) else {
        return Ok(Event::new(
            run_id,
            EventPayload::Unknown {
                event: event.to_string(),
                payload,
            },
        ));
    };

    let payload = match kind {
        EventKind::RunStarted => EventPayload::RunStarted(typed(event, payload)?),
        EventKind::ToolCallStarted => EventPayload::ToolCallStarted(typed(event, payload)?),
        EventKind::ToolCallFinished => EventPayload::ToolCallFinished(typed(event, payload)?),
        EventKind::TextChunk => EventPayload::TextChunk(typed(event, payload)?),
        EventKind::RunFinished => EventPayload::RunFinished(typed(event, payload)?),
        EventKind::Error => EventPayload::Error(typed(event, payload)?),
        EventKind::CommandResult => EventPayload::CommandResult(typed(event, payload)?),
        EventKind::ConnectionState => EventPayload::ConnectionState(typed(event, payload)?),
    };

    Ok(Event::new(run_id, payload))
}

fn typed<T: serde::de::DeserializeOwned>(event: &str, payload: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
        event: event.to_string(),
        reason: e.to_string(),
    })
}

// ============================================================================
// Encoding
// ============================================================================

/// Chat content as submitted by the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatContent {
    /// The text the user typed
    pub content: String,
    /// RFC 3339 timestamp of submission
    pub client_timestamp: String,
    /// Minutes west of UTC at submission time
    pub timezone_offset: i32,
}

impl ChatContent {
    /// Stamp content with an explicit time and offset
    #[must_use]
    pub fn at(content: impl Into<String>, at: DateTime<Utc>, timezone_offset: i32) -> Self {
        Self {
            content: content.into(),
            client_timestamp: at.to_rfc3339(),
            timezone_offset,
        }
    }

    /// Stamp content with the local clock
    #[must_use]
    pub fn now(content: impl Into<String>) -> Self {
        let local = Local::now();
        let offset = -local.offset().local_minus_utc() / 60;
        Self::at(content, local.with_timezone(&Utc), offset)
    }
}

/// Messages the client writes to a socket transport
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// User chat content
    Message {
        /// Session the content belongs to
        session_id: String,
        /// The chat content
        #[serde(flatten)]
        chat: ChatContent,
    },
    /// Heartbeat
    Ping {
        /// Milliseconds since the Unix epoch
        timestamp: i64,
    },
}

impl OutboundMessage {
    /// Serialize to the wire string
    #[must_use]
    pub fn to_wire(&self) -> String {
        // Plain strings and integers only; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Encode chat content for a socket transport
#[must_use]
pub fn encode_command(chat: &ChatContent, session_id: &str) -> String {
    OutboundMessage::Message {
        session_id: session_id.to_string(),
        chat: chat.clone(),
    }
    .to_wire()
}

/// Encode a heartbeat ping
#[must_use]
pub fn encode_ping(timestamp_ms: i64) -> String {
    OutboundMessage::Ping {
        timestamp: timestamp_ms,
    }
    .to_wire()
}

/// Body of an HTTP command request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Command text, without the leading slash
    pub command: String,
    /// Session the command applies to
    pub session_id: String,
    /// Identifier from the identity provider
    pub identifier: String,
    /// Signature over the command, for privileged commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}
