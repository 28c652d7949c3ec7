//! Run State Machine
//!
//! Canonical conversation state and the transitions driven by inbound events.
//!
//! [`update`] is the single entry point: it mutates [`ChatState`] for one
//! event and returns the [`RunEffect`]s the owner must carry out (timers are
//! not the reducer's business). Given the same state, event and clock reading,
//! it always produces the same result.
//!
//! # Ordering Tolerance
//!
//! Backends do not guarantee that `run_started` precedes the first chunk, so
//! the stream target is found by the streaming flag first and by run id only
//! as a fallback. That keeps a run's text in one message instead of forking a
//! duplicate bubble when events race.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::connection::ConnectionState;
use crate::protocol::{
    ChunkRole, CommandResult, ErrorPayload, Event, EventPayload, RunOutcome, ToolCallFinishedPayload,
    ToolCallStartedPayload, ToolOutcome,
};

/// Milliseconds since the Unix epoch
#[must_use]
pub fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random identifier
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Client-side run identifier, allocated on `run_started`
    RunId
);
string_id!(
    /// Message identifier
    MessageId
);
string_id!(
    /// Tool call identifier (backend-provided when available)
    ToolCallId
);

// ============================================================================
// Data Model
// ============================================================================

/// Lifecycle status of the current run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run in progress
    #[default]
    Idle,
    /// Run started, nothing streamed yet
    Thinking,
    /// A tool call is executing
    ToolRunning,
    /// Text is streaming
    StreamingText,
    /// Finished normally, waiting to settle
    Completed,
    /// Finished with an error, waiting to settle
    Error,
}

impl RunStatus {
    /// Whether the run has finished
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Whether a run is in progress
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Thinking | Self::ToolRunning | Self::StreamingText)
    }
}

/// The current run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Client-side identifier; `None` before the first run
    pub run_id: Option<RunId>,
    /// Identifier the backend used in the envelope
    pub backend_run_id: Option<String>,
    /// Lifecycle status
    pub status: RunStatus,
    /// When `run_started` arrived
    pub start_time: Option<u64>,
    /// When the run finished
    pub end_time: Option<u64>,
    /// Tool calls started during this run
    pub active_tool_calls: Vec<ToolCall>,
}

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The local user
    Human,
    /// The backend agent
    Assistant,
    /// Out-of-band notices and command results
    System,
    /// Tool output
    Tool,
}

/// Message body
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text
    Text {
        /// The text
        text: String,
    },
    /// A command the user issued
    Command {
        /// Command text, without the leading slash
        command: String,
    },
    /// Result of a command
    CommandResult {
        /// The result
        result: CommandResult,
    },
}

/// Status of a tool call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    /// Still executing
    Running,
    /// Finished with a result
    Completed,
    /// Finished with a failure
    Error,
}

/// A tool invocation anchored in an assistant message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier
    pub id: ToolCallId,
    /// Tool name, the only key `tool_call_finished` matches on
    pub tool_name: String,
    /// Arguments as sent by the backend
    pub args: Value,
    /// Execution status
    pub status: ToolCallStatus,
    /// Result once finished
    pub result: Option<Value>,
    /// When the call started
    pub start_time: u64,
    /// When the call finished
    pub end_time: Option<u64>,
    /// Character offset of the card in the owning message; `None` is unknown
    pub insert_index: Option<usize>,
}

/// A conversation entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Identifier
    pub id: MessageId,
    /// Author
    pub role: Role,
    /// Body
    pub content: MessageContent,
    /// Creation time
    pub timestamp: u64,
    /// Run the message belongs to
    pub run_id: Option<RunId>,
    /// Still receiving chunks
    pub is_streaming: bool,
    /// Tool calls anchored in this message
    pub tool_calls: Vec<ToolCall>,
}

impl Message {
    fn new(role: Role, content: MessageContent, timestamp: u64) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content,
            timestamp,
            run_id: None,
            is_streaming: false,
            tool_calls: Vec::new(),
        }
    }

    /// Displayable text of the message
    #[must_use]
    pub fn text(&self) -> &str {
        match &self.content {
            MessageContent::Text { text } => text,
            MessageContent::Command { command } => command,
            MessageContent::CommandResult { result } => &result.message,
        }
    }

    /// Text length in characters
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.text().chars().count()
    }

    fn push_text(&mut self, delta: &str) {
        if let MessageContent::Text { text } = &mut self.content {
            text.push_str(delta);
        }
    }

    fn is_stream_target(&self) -> bool {
        self.role == Role::Assistant && self.is_streaming
    }
}

/// Everything a renderer needs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatState {
    /// The current run
    pub run: Run,
    /// Append-only conversation
    pub messages: Vec<Message>,
    /// Whether the user may submit input
    pub input_enabled: bool,
    /// Most recent application error
    pub last_error: Option<String>,
    /// Restricted mode signalled by system chunks
    pub visitor_mode: bool,
    /// Mirror of the connection manager's state
    pub connection: ConnectionState,
    /// Set once reconnection gave up; cleared on the next successful connect
    pub reconnect_exhausted: bool,
    /// Backend-reported connection label
    pub backend_state: Option<String>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self {
            run: Run::default(),
            messages: Vec::new(),
            input_enabled: true,
            last_error: None,
            visitor_mode: false,
            connection: ConnectionState::default(),
            reconnect_exhausted: false,
            backend_state: None,
        }
    }
}

impl ChatState {
    /// Find a message by id
    #[must_use]
    pub fn message(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// The message currently receiving the assistant stream, if any
    #[must_use]
    pub fn streaming_message(&self) -> Option<&Message> {
        self.stream_target().map(|i| &self.messages[i])
    }

    /// Record the user's chat input
    pub fn push_human(&mut self, text: impl Into<String>, now: u64) -> MessageId {
        let message = Message::new(Role::Human, MessageContent::Text { text: text.into() }, now);
        self.push(message)
    }

    /// Record a command the user issued
    pub fn push_command(&mut self, command: impl Into<String>, now: u64) -> MessageId {
        let message = Message::new(
            Role::Human,
            MessageContent::Command {
                command: command.into(),
            },
            now,
        );
        self.push(message)
    }

    /// Record a command result as a completed system message
    pub fn push_command_result(&mut self, result: CommandResult, now: u64) -> MessageId {
        let message = Message::new(Role::System, MessageContent::CommandResult { result }, now);
        self.push(message)
    }

    /// Record a system notice
    pub fn push_system(&mut self, text: impl Into<String>, now: u64) -> MessageId {
        let message = Message::new(Role::System, MessageContent::Text { text: text.into() }, now);
        self.push(message)
    }

    fn push(&mut self, message: Message) -> MessageId {
        let id = message.id.clone();
        self.messages.push(message);
        id
    }

    /// Newest streaming assistant message
    fn stream_target(&self) -> Option<usize> {
        self.messages.iter().rposition(Message::is_stream_target)
    }

    /// Stream target, falling back to the newest assistant message of the
    /// current run
    fn text_target(&self) -> Option<usize> {
        self.stream_target().or_else(|| {
            let current = self.run.run_id.as_ref()?;
            self.messages
                .iter()
                .rposition(|m| m.role == Role::Assistant && m.run_id.as_ref() == Some(current))
        })
    }

    fn create_assistant(&mut self, now: u64) -> usize {
        let mut message = Message::new(
            Role::Assistant,
            MessageContent::Text {
                text: String::new(),
            },
            now,
        );
        if self.run.status.is_active() {
            message.run_id = self.run.run_id.clone();
            message.is_streaming = true;
        } else if self.run.status.is_terminal() {
            // Late output of a finished run: joins that run, already closed
            message.run_id = self.run.run_id.clone();
        } else {
            // Created before run_started: left for the next run to adopt
            message.is_streaming = true;
        }
        self.messages.push(message);
        self.messages.len() - 1
    }

    fn belongs_to_current_run(&self, index: usize) -> bool {
        self.run.run_id.is_some() && self.messages[index].run_id == self.run.run_id
    }

    /// Stop the stream target and the current run's assistant messages
    fn close_stream(&mut self) {
        let target = self.stream_target();
        for index in 0..self.messages.len() {
            if Some(index) == target
                || (self.messages[index].role == Role::Assistant && self.belongs_to_current_run(index))
            {
                self.messages[index].is_streaming = false;
            }
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Side effects requested by a transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunEffect {
    /// After the settle delay, call [`settle`] with this run id
    ScheduleSettle {
        /// Run that finished
        run_id: Option<RunId>,
    },
}

/// Apply one inbound event
pub fn update(state: &mut ChatState, event: &Event, now: u64) -> Vec<RunEffect> {
    match &event.payload {
        EventPayload::RunStarted(_) => {
            run_started(state, &event.run_id, now);
            vec![]
        }
        EventPayload::ToolCallStarted(payload) => {
            tool_call_started(state, payload, now);
            vec![]
        }
        EventPayload::ToolCallFinished(payload) => {
            tool_call_finished(state, payload, now);
            vec![]
        }
        EventPayload::TextChunk(chunk) => {
            if chunk.role == ChunkRole::System {
                system_chunk(state, &chunk.text, chunk.visitor_mode, now);
            } else {
                text_chunk(state, &chunk.text, now);
            }
            vec![]
        }
        EventPayload::RunFinished(payload) => run_finished(state, payload.status, payload.error.as_deref(), now),
        EventPayload::Error(payload) => error(state, payload, now),
        EventPayload::CommandResult(result) => {
            state.push_command_result(result.clone(), now);
            vec![]
        }
        EventPayload::ConnectionState(payload) => {
            state.backend_state = Some(payload.state.clone());
            vec![]
        }
        EventPayload::Unknown { .. } => vec![],
    }
}

/// Start a new run, superseding the previous one
///
/// A previous run that never finished is not finalized; its streaming message
/// keeps streaming and becomes the new run's stream target.
pub fn run_started(state: &mut ChatState, backend_run_id: &str, now: u64) {
    let run_id = RunId::new();

    for message in state
        .messages
        .iter_mut()
        .filter(|m| m.is_stream_target() && m.run_id.is_none())
    {
        message.run_id = Some(run_id.clone());
    }

    state.run = Run {
        run_id: Some(run_id),
        backend_run_id: Some(backend_run_id.to_string()),
        status: RunStatus::Thinking,
        start_time: Some(now),
        end_time: None,
        active_tool_calls: Vec::new(),
    };
    state.input_enabled = false;
    state.last_error = None;
}

/// Anchor a new tool call in the stream target
pub fn tool_call_started(state: &mut ChatState, payload: &ToolCallStartedPayload, now: u64) {
    if !state.run.status.is_terminal() {
        state.run.status = RunStatus::ToolRunning;
    }

    let index = match state.stream_target() {
        Some(index) => index,
        None => state.create_assistant(now),
    };
    let message = &mut state.messages[index];

    let text_len = message.char_len();
    let insert_index = if text_len > 0 {
        Some(text_len)
    } else {
        payload.insert_index
    };

    let call = ToolCall {
        id: payload
            .tool_call_id
            .as_deref()
            .map_or_else(ToolCallId::new, ToolCallId::from),
        tool_name: payload.tool_name.clone(),
        args: payload.args.clone(),
        status: ToolCallStatus::Running,
        result: None,
        start_time: now,
        end_time: None,
        insert_index,
    };

    message.tool_calls.push(call.clone());
    state.run.active_tool_calls.push(call);
}

/// Finish the first running call with a matching tool name
///
/// A finish with no running match (a duplicate, or one for an unknown tool)
/// changes nothing.
pub fn tool_call_finished(state: &mut ChatState, payload: &ToolCallFinishedPayload, now: u64) {
    let target = state.stream_target();

    let found = (0..state.messages.len())
        .filter(|&i| Some(i) == target || state.belongs_to_current_run(i))
        .find_map(|i| {
            state.messages[i]
                .tool_calls
                .iter()
                .position(|c| c.status == ToolCallStatus::Running && c.tool_name == payload.tool_name)
                .map(|j| (i, j))
        });

    let Some((msg_index, call_index)) = found else {
        return;
    };

    let message = &mut state.messages[msg_index];
    let text_len = message.char_len();
    let call = &mut message.tool_calls[call_index];

    call.status = match payload.status {
        ToolOutcome::Success => ToolCallStatus::Completed,
        ToolOutcome::Error => ToolCallStatus::Error,
    };
    call.result.clone_from(&payload.result);
    call.end_time = Some(now);
    if call.insert_index.is_none() {
        call.insert_index = Some(payload.insert_index.unwrap_or(text_len));
    }

    let finished = call.clone();
    if let Some(active) = state
        .run
        .active_tool_calls
        .iter_mut()
        .find(|c| c.id == finished.id)
    {
        *active = finished;
    }

    let any_running = state
        .run
        .active_tool_calls
        .iter()
        .any(|c| c.status == ToolCallStatus::Running);
    if state.run.status == RunStatus::ToolRunning && !any_running {
        state.run.status = RunStatus::Thinking;
    }
}

/// Append assistant text to the stream target
pub fn text_chunk(state: &mut ChatState, text: &str, now: u64) {
    if !state.run.status.is_terminal() {
        state.run.status = RunStatus::StreamingText;
    }

    let index = match state.text_target() {
        Some(index) => index,
        None => state.create_assistant(now),
    };
    state.messages[index].push_text(text);
}

/// Record an out-of-band system notice
pub fn system_chunk(state: &mut ChatState, text: &str, visitor_mode: Option<bool>, now: u64) {
    if let Some(visitor_mode) = visitor_mode {
        state.visitor_mode = visitor_mode;
    }
    if !text.is_empty() {
        state.push_system(text, now);
    }
}

/// Finalize the current run
pub fn run_finished(
    state: &mut ChatState,
    outcome: RunOutcome,
    error: Option<&str>,
    now: u64,
) -> Vec<RunEffect> {
    state.close_stream();

    state.run.end_time = Some(now);
    state.input_enabled = true;
    match outcome {
        RunOutcome::Completed => state.run.status = RunStatus::Completed,
        RunOutcome::Error => {
            state.run.status = RunStatus::Error;
            state.last_error = Some(error.unwrap_or("Run failed").to_string());
        }
    }

    vec![RunEffect::ScheduleSettle {
        run_id: state.run.run_id.clone(),
    }]
}

/// Record an application error
///
/// Ends the current run like a failed `run_finished`: its messages stop
/// streaming and the run settles to idle after the settle delay.
pub fn error(state: &mut ChatState, payload: &ErrorPayload, now: u64) -> Vec<RunEffect> {
    state.close_stream();

    state.run.status = RunStatus::Error;
    state.run.end_time = Some(now);
    state.last_error = Some(payload.message.clone());
    state.input_enabled = true;

    vec![RunEffect::ScheduleSettle {
        run_id: state.run.run_id.clone(),
    }]
}

/// Reset a finished run to idle
///
/// Only applies when `run_id` is still the current run and it is still
/// terminal; a run that started in the meantime is left alone. Returns whether
/// anything changed.
pub fn settle(state: &mut ChatState, run_id: Option<&RunId>) -> bool {
    if state.run.run_id.as_ref() != run_id || !state.run.status.is_terminal() {
        return false;
    }
    state.run.status = RunStatus::Idle;
    state.run.active_tool_calls.clear();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RunFinishedPayload, RunStartedPayload, TextChunkPayload};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn started() -> Event {
        Event::new("r1", EventPayload::RunStarted(RunStartedPayload::default()))
    }

    fn chunk(text: &str) -> Event {
        Event::new(
            "r1",
            EventPayload::TextChunk(TextChunkPayload {
                text: text.to_string(),
                role: ChunkRole::Assistant,
                visitor_mode: None,
            }),
        )
    }

    fn tool_start(name: &str, insert_index: Option<usize>) -> Event {
        Event::new(
            "r1",
            EventPayload::ToolCallStarted(ToolCallStartedPayload {
                tool_name: name.to_string(),
                tool_call_id: None,
                args: json!({ "q": "x" }),
                insert_index,
            }),
        )
    }

    fn tool_finish(name: &str, status: ToolOutcome) -> Event {
        Event::new(
            "r1",
            EventPayload::ToolCallFinished(ToolCallFinishedPayload {
                tool_name: name.to_string(),
                status,
                result: Some(json!("3 results")),
                insert_index: None,
            }),
        )
    }

    fn finished(outcome: RunOutcome) -> Event {
        Event::new(
            "r1",
            EventPayload::RunFinished(RunFinishedPayload {
                status: outcome,
                error: (outcome == RunOutcome::Error).then(|| "boom".to_string()),
            }),
        )
    }

    fn apply(state: &mut ChatState, events: &[Event]) -> Vec<RunEffect> {
        events
            .iter()
            .enumerate()
            .flat_map(|(i, e)| update(state, e, 1000 + i as u64))
            .collect()
    }

    #[test]
    fn test_run_started_resets_run() {
        let mut state = ChatState::default();
        state.last_error = Some("old".to_string());

        update(&mut state, &started(), 10);

        assert_eq!(state.run.status, RunStatus::Thinking);
        assert!(state.run.run_id.is_some());
        assert_eq!(state.run.backend_run_id.as_deref(), Some("r1"));
        assert_eq!(state.run.start_time, Some(10));
        assert!(!state.input_enabled);
        assert_eq!(state.last_error, None);
    }

    #[test]
    fn test_chunks_coalesce_into_one_message() {
        let mut state = ChatState::default();
        apply(&mut state, &[started(), chunk("Hel"), chunk("lo"), chunk(" there")]);

        assert_eq!(state.run.status, RunStatus::StreamingText);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].text(), "Hello there");
        assert!(state.messages[0].is_streaming);
        assert_eq!(state.messages[0].run_id, state.run.run_id);
    }

    #[test]
    fn test_chunk_before_run_started_is_adopted() {
        let mut state = ChatState::default();
        apply(&mut state, &[chunk("early "), started(), chunk("late")]);

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].text(), "early late");
        assert_eq!(state.messages[0].run_id, state.run.run_id);
    }

    #[test]
    fn test_run_finished_settles_message_and_input() {
        let mut state = ChatState::default();
        let effects = apply(&mut state, &[started(), chunk("done"), finished(RunOutcome::Completed)]);

        assert_eq!(state.run.status, RunStatus::Completed);
        assert!(!state.messages[0].is_streaming);
        assert!(state.input_enabled);
        assert_eq!(
            effects,
            vec![RunEffect::ScheduleSettle {
                run_id: state.run.run_id.clone()
            }]
        );

        let run_id = state.run.run_id.clone();
        assert!(settle(&mut state, run_id.as_ref()));
        assert_eq!(state.run.status, RunStatus::Idle);
        assert!(state.run.active_tool_calls.is_empty());
    }

    #[test]
    fn test_run_finished_with_error() {
        let mut state = ChatState::default();
        apply(&mut state, &[started(), finished(RunOutcome::Error)]);
        assert_eq!(state.run.status, RunStatus::Error);
        assert_eq!(state.last_error.as_deref(), Some("boom"));
        assert!(state.input_enabled);
    }

    #[test]
    fn test_stale_settle_is_ignored() {
        let mut state = ChatState::default();
        apply(&mut state, &[started(), finished(RunOutcome::Completed)]);
        let old = state.run.run_id.clone();

        update(&mut state, &started(), 2000);
        assert!(!settle(&mut state, old.as_ref()));
        assert_eq!(state.run.status, RunStatus::Thinking);
    }

    #[test]
    fn test_late_chunk_joins_finished_message() {
        let mut state = ChatState::default();
        apply(
            &mut state,
            &[started(), chunk("a"), finished(RunOutcome::Completed), chunk("b")],
        );

        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].text(), "ab");
        assert_eq!(state.run.status, RunStatus::Completed);
    }

    #[test]
    fn test_tool_call_lifecycle() {
        let mut state = ChatState::default();
        apply(&mut state, &[started(), chunk("Let me check"), tool_start("search", Some(99))]);

        assert_eq!(state.run.status, RunStatus::ToolRunning);
        let call = &state.messages[0].tool_calls[0];
        assert_eq!(call.status, ToolCallStatus::Running);
        // Existing text wins over the suggested offset
        assert_eq!(call.insert_index, Some(12));
        assert_eq!(state.run.active_tool_calls.len(), 1);

        apply(&mut state, &[tool_finish("search", ToolOutcome::Success)]);

        let call = &state.messages[0].tool_calls[0];
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.result, Some(json!("3 results")));
        assert!(call.end_time.is_some());
        assert_eq!(state.run.status, RunStatus::Thinking);
        assert_eq!(state.run.active_tool_calls[0].status, ToolCallStatus::Completed);
    }

    #[test]
    fn test_tool_before_text_uses_payload_index_or_locks_at_finish() {
        let mut state = ChatState::default();
        apply(&mut state, &[started(), tool_start("search", None), chunk("Looking up...")]);
        assert_eq!(state.messages[0].tool_calls[0].insert_index, None);

        apply(&mut state, &[tool_finish("search", ToolOutcome::Success), chunk(" done.")]);
        assert_eq!(state.messages[0].tool_calls[0].insert_index, Some(13));
    }

    #[test]
    fn test_duplicate_tool_finish_is_noop() {
        let mut state = ChatState::default();
        apply(
            &mut state,
            &[started(), tool_start("search", None), tool_finish("search", ToolOutcome::Success)],
        );
        let snapshot = state.clone();

        apply(&mut state, &[tool_finish("search", ToolOutcome::Error)]);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_same_named_calls_finish_first_match() {
        let mut state = ChatState::default();
        apply(
            &mut state,
            &[
                started(),
                tool_start("fetch", None),
                tool_start("fetch", None),
                tool_finish("fetch", ToolOutcome::Error),
            ],
        );

        let calls = &state.messages[0].tool_calls;
        assert_eq!(calls[0].status, ToolCallStatus::Error);
        assert_eq!(calls[1].status, ToolCallStatus::Running);
        assert_eq!(state.run.status, RunStatus::ToolRunning);
    }

    #[test]
    fn test_system_chunk_is_standalone() {
        let mut state = ChatState::default();
        let notice = Event::new(
            "r1",
            EventPayload::TextChunk(TextChunkPayload {
                text: "Visitor mode enabled".to_string(),
                role: ChunkRole::System,
                visitor_mode: Some(true),
            }),
        );
        apply(&mut state, &[started(), chunk("hi"), notice, chunk(" there")]);

        assert!(state.visitor_mode);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].text(), "hi there");
        assert_eq!(state.messages[1].role, Role::System);
        assert!(!state.messages[1].is_streaming);
    }

    #[test]
    fn test_error_event() {
        let mut state = ChatState::default();
        let err = Event::new(
            "r1",
            EventPayload::Error(ErrorPayload {
                message: "rate limited".to_string(),
                code: None,
            }),
        );
        apply(&mut state, &[started(), err]);

        assert_eq!(state.run.status, RunStatus::Error);
        assert_eq!(state.last_error.as_deref(), Some("rate limited"));
        assert!(state.input_enabled);
    }

    fn failure(message: &str) -> Event {
        Event::new(
            "r1",
            EventPayload::Error(ErrorPayload {
                message: message.to_string(),
                code: None,
            }),
        )
    }

    #[test]
    fn test_error_closes_stream_and_schedules_settle() {
        let mut state = ChatState::default();
        apply(&mut state, &[started(), chunk("partial")]);
        let effects = apply(&mut state, &[failure("backend crashed")]);

        assert_eq!(
            effects,
            vec![RunEffect::ScheduleSettle {
                run_id: state.run.run_id.clone()
            }]
        );
        assert!(!state.messages[0].is_streaming);
        assert!(state.run.end_time.is_some());

        let run_id = state.run.run_id.clone();
        assert!(settle(&mut state, run_id.as_ref()));
        assert_eq!(state.run.status, RunStatus::Idle);
    }

    #[test]
    fn test_run_after_error_gets_its_own_message() {
        let mut state = ChatState::default();
        apply(
            &mut state,
            &[
                started(),
                chunk("partial"),
                failure("backend crashed"),
                started(),
                chunk("fresh answer"),
                finished(RunOutcome::Completed),
            ],
        );

        let texts: Vec<(&str, bool)> = state
            .messages
            .iter()
            .map(|m| (m.text(), m.is_streaming))
            .collect();
        assert_eq!(texts, vec![("partial", false), ("fresh answer", false)]);
        assert_ne!(state.messages[0].run_id, state.messages[1].run_id);
    }

    #[test]
    fn test_late_chunk_of_textless_run_is_closed() {
        let mut state = ChatState::default();
        apply(&mut state, &[started(), finished(RunOutcome::Completed), chunk("late")]);

        assert_eq!(state.messages.len(), 1);
        assert!(!state.messages[0].is_streaming);
        assert_eq!(state.messages[0].run_id, state.run.run_id);

        // A second late chunk joins the same message
        apply(&mut state, &[chunk(" again")]);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].text(), "late again");

        // The next run does not adopt it
        apply(&mut state, &[started(), chunk("new")]);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].text(), "late again");
    }

    #[test]
    fn test_command_result_and_backend_state() {
        let mut state = ChatState::default();
        let result = Event::new(
            "",
            EventPayload::CommandResult(CommandResult::error("unknown command")),
        );
        let conn = Event::new(
            "",
            EventPayload::ConnectionState(crate::protocol::ConnectionStatePayload {
                state: "degraded".to_string(),
            }),
        );
        apply(&mut state, &[result, conn]);

        assert_eq!(state.messages[0].role, Role::System);
        assert_eq!(state.messages[0].text(), "unknown command");
        assert_eq!(state.backend_state.as_deref(), Some("degraded"));
    }

    #[test]
    fn test_unknown_event_changes_nothing() {
        let mut state = ChatState::default();
        let before = state.clone();
        let event = Event::new(
            "r1",
            EventPayload::Unknown {
                event: "tool_call_progress".to_string(),
                payload: json!({}),
            },
        );
        assert!(update(&mut state, &event, 1).is_empty());
        assert_eq!(state, before);
    }

    #[test]
    fn test_human_and_command_messages() {
        let mut state = ChatState::default();
        let id = state.push_human("hello", 5);
        state.push_command("status", 6);

        assert_eq!(state.message(&id).map(Message::text), Some("hello"));
        assert_eq!(state.messages[1].text(), "status");
        assert!(state.streaming_message().is_none());
    }
}
