//! Transcript Rendering
//!
//! Prints the conversation as it arrives. Assistant messages are rendered one
//! at a time through a [`MessageView`], so text appears at the reveal pace and
//! tool cards land where they were anchored. System messages are printed whole.

use std::collections::HashMap;

use tokio::io::{AsyncWriteExt, Stdout};

use tether_core::protocol::CommandStatus;
use tether_core::{
    ChatState, ConnectionStatus, Fragment, Message, MessageContent, MessageView, RevealConfig,
    Role, Store, ToolCall, ToolCallStatus, ViewSnapshot,
};

/// Turns successive snapshots of one message into printable deltas
#[derive(Debug, Default)]
pub struct TranscriptPrinter {
    /// Characters already printed per text fragment, by fragment position
    printed: HashMap<usize, usize>,
    /// Tool cards already printed, by fragment position
    cards: HashMap<usize, ToolCallStatus>,
}

impl TranscriptPrinter {
    /// Create a printer for a new message
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print for `snapshot`, given what earlier snapshots printed
    pub fn delta(&mut self, snapshot: &ViewSnapshot) -> String {
        let mut out = String::new();

        for (position, fragment) in snapshot.fragments.iter().enumerate() {
            match fragment {
                Fragment::Text(text) => {
                    let done = self.printed.entry(position).or_insert(0);
                    out.extend(text.chars().skip(*done));
                    *done = (*done).max(text.chars().count());
                }
                Fragment::Tool(call) => {
                    // Reprint only when a running card completes
                    let previous = self.cards.insert(position, call.status);
                    if previous != Some(call.status) {
                        out.push_str(&tool_card(call));
                    }
                }
            }
        }

        if snapshot.finished {
            out.push('\n');
        }
        out
    }
}

fn tool_card(call: &ToolCall) -> String {
    let status = match call.status {
        ToolCallStatus::Running => "running",
        ToolCallStatus::Completed => "done",
        ToolCallStatus::Error => "failed",
    };
    match &call.result {
        Some(result) if call.status != ToolCallStatus::Running => {
            format!("\n  [{} {status}] {}\n", call.tool_name, summarize(result))
        }
        _ => format!("\n  [{} {status}]\n", call.tool_name),
    }
}

fn summarize(value: &serde_json::Value) -> String {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(80).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// One-shot line for a message that is not revealed progressively
pub fn message_line(message: &Message) -> Option<String> {
    match (&message.role, &message.content) {
        // Echoed by the terminal already
        (Role::Human, _) | (_, MessageContent::Command { .. }) => None,
        (_, MessageContent::CommandResult { result }) => {
            let tag = match result.status {
                CommandStatus::Success => "ok",
                CommandStatus::Error => "error",
            };
            Some(format!("[{tag}] {}\n", result.message))
        }
        (Role::System | Role::Tool, MessageContent::Text { text }) => Some(format!("[system] {text}\n")),
        (Role::Assistant, MessageContent::Text { .. }) => None,
    }
}

/// Status lines worth surfacing when they change
#[derive(Debug, Default, PartialEq, Eq)]
struct Notices {
    status: ConnectionStatus,
    exhausted: bool,
    error: Option<String>,
}

impl Notices {
    fn of(state: &ChatState) -> Self {
        Self {
            status: state.connection.status,
            exhausted: state.reconnect_exhausted,
            error: state.last_error.clone(),
        }
    }

    fn describe_change(&self, previous: &Self) -> String {
        let mut out = String::new();
        if self.exhausted && !previous.exhausted {
            out.push_str("[connection] gave up reconnecting, type /connect to retry\n");
        } else if self.status != previous.status && self.status == ConnectionStatus::Connected {
            out.push_str("[connection] connected\n");
        }
        if self.error != previous.error {
            if let Some(error) = &self.error {
                out.push_str(&format!("[error] {error}\n"));
            }
        }
        out
    }
}

async fn write(out: &mut Stdout, text: &str) -> std::io::Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    out.write_all(text.as_bytes()).await?;
    out.flush().await
}

async fn next_snapshot(current: &mut Option<(MessageView, TranscriptPrinter)>) -> Option<ViewSnapshot> {
    match current {
        Some((view, _)) => view.changed().await,
        None => std::future::pending().await,
    }
}

/// Print the conversation until the store goes away
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub async fn render(store: Store, reveal: RevealConfig) -> std::io::Result<()> {
    let mut subscription = store.subscribe();
    let mut out = tokio::io::stdout();
    let mut current: Option<(MessageView, TranscriptPrinter)> = None;
    let mut next_message = 0;
    let mut notices = Notices::default();

    loop {
        tokio::select! {
            alive = subscription.changed() => {
                if !alive {
                    return Ok(());
                }
            }
            snapshot = next_snapshot(&mut current) => {
                let finished = match (snapshot, current.as_mut()) {
                    (Some(snapshot), Some((_, printer))) => {
                        let delta = printer.delta(&snapshot);
                        write(&mut out, &delta).await?;
                        snapshot.finished
                    }
                    _ => true,
                };
                if finished {
                    current = None;
                }
            }
        }

        let (now, pending): (Notices, Vec<Message>) = {
            let state = subscription.latest();
            let pending = if current.is_none() {
                state.messages.iter().skip(next_message).cloned().collect()
            } else {
                Vec::new()
            };
            (Notices::of(&state), pending)
        };
        write(&mut out, &now.describe_change(&notices)).await?;
        notices = now;

        for message in pending {
            next_message += 1;
            if message.role == Role::Assistant {
                let view = MessageView::attach(&store, message.id.clone(), reveal.clone());
                current = Some((view, TranscriptPrinter::new()));
                break;
            }
            if let Some(line) = message_line(&message) {
                write(&mut out, &line).await?;
            }
        }
    }
}
