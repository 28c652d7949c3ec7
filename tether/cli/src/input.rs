//! Stdin line parsing

use tether_core::ClientInput;

/// What a line of input asks for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Line {
    /// Forward to the client
    Input(ClientInput),
    /// Leave the program
    Quit,
    /// Nothing to do
    Empty,
}

/// Parse one line
///
/// `/quit`, `/new`, `/connect` and `/disconnect` are handled locally; any
/// other `/name args` line is a backend command and everything else is chat.
pub fn parse_line(line: &str) -> Line {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Empty;
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return Line::Input(ClientInput::Chat(trimmed.to_string()));
    };

    match command.trim() {
        "" => Line::Empty,
        "quit" | "exit" => Line::Quit,
        "new" => Line::Input(ClientInput::RotateSession),
        "connect" => Line::Input(ClientInput::Connect),
        "disconnect" => Line::Input(ClientInput::Disconnect),
        other => Line::Input(ClientInput::Command(other.to_string())),
    }
}
