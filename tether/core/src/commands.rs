//! HTTP Requests
//!
//! Two outbound operations that do not go over the stream:
//! - commands: one POST, one JSON [`CommandResult`] back
//! - chat over HTTP: one POST whose response body is itself an event stream,
//!   decoded into [`Frame`]s for the same pipeline as the live connection
//!
//! Neither throws into the caller's state: [`CommandClient::run_command`]
//! folds every failure into an error [`CommandResult`].

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::ACCEPT;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::identity::IdentityProvider;
use crate::protocol::sse;
use crate::protocol::{ChatContent, CommandRequest, CommandResult, Frame};

/// Errors from HTTP requests
#[derive(Debug, Error)]
pub enum CommandError {
    /// No URL configured for this operation
    #[error("No {0} URL configured")]
    NotConfigured(&'static str),

    /// The request could not be sent or its body not read
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status
    #[error("Backend returned status {0}")]
    Status(u16),

    /// The streamed response broke off or was not a valid event stream
    #[error("Chat stream failed: {0}")]
    Stream(String),

    /// The response body is not a command result
    #[error("Invalid command response: {0}")]
    Decode(String),

    /// Refused before sending
    #[error("{0}")]
    Refused(String),
}

/// HTTP client for commands and streamed chat
#[derive(Clone, Debug)]
pub struct CommandClient {
    http: reqwest::Client,
    command_url: Option<String>,
    chat_url: Option<String>,
    request_timeout: Duration,
    privileged_prefixes: Vec<String>,
}

impl CommandClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        command_url: Option<String>,
        chat_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, CommandError> {
        let http = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .build()?;
        Ok(Self {
            http,
            command_url,
            chat_url,
            request_timeout,
            privileged_prefixes: vec!["admin".to_string()],
        })
    }

    /// Set the command prefixes that need a signature in visitor mode
    #[must_use]
    pub fn with_privileged_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.privileged_prefixes = prefixes;
        self
    }

    /// Whether chat goes over HTTP instead of the socket
    #[must_use]
    pub fn has_chat_url(&self) -> bool {
        self.chat_url.is_some()
    }

    /// Whether `command` needs a signature in visitor mode
    #[must_use]
    pub fn is_privileged(&self, command: &str) -> bool {
        let name = command.split_whitespace().next().unwrap_or_default();
        self.privileged_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Build the request for `command`, signing it when privileged
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Refused`] for an unsigned privileged command in
    /// visitor mode.
    pub fn prepare(
        &self,
        command: &str,
        session_id: &str,
        identity: &dyn IdentityProvider,
        visitor_mode: bool,
    ) -> Result<CommandRequest, CommandError> {
        let signature = if self.is_privileged(command) {
            identity.sign(command)
        } else {
            None
        };

        if visitor_mode && self.is_privileged(command) && signature.is_none() {
            return Err(CommandError::Refused(format!(
                "'{command}' requires identity verification"
            )));
        }

        Ok(CommandRequest {
            command: command.to_string(),
            session_id: session_id.to_string(),
            identifier: identity.current_identifier(),
            signature,
        })
    }

    /// POST a command and decode its result
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] on transport, status or decode failure.
    pub async fn send_command(&self, request: &CommandRequest) -> Result<CommandResult, CommandError> {
        let url = self
            .command_url
            .as_deref()
            .ok_or(CommandError::NotConfigured("command"))?;

        let response = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // Error statuses may still carry a well-formed result
        match serde_json::from_str::<CommandResult>(&body) {
            Ok(result) => Ok(result),
            Err(_) if !status.is_success() => Err(CommandError::Status(status.as_u16())),
            Err(e) => Err(CommandError::Decode(e.to_string())),
        }
    }

    /// Run a command, folding every failure into an error result
    pub async fn run_command(&self, request: &CommandRequest) -> CommandResult {
        match self.send_command(request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(command = %request.command, error = %e, "Command failed");
                CommandResult::error(e.to_string())
            }
        }
    }

    /// POST chat content and forward the streamed response as frames
    ///
    /// Returns once the response body ends. Dropping the future aborts the
    /// request.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] if the request fails or the status is not a
    /// success.
    pub async fn post_chat(
        &self,
        session_id: &str,
        chat: &ChatContent,
        frames: mpsc::Sender<Frame>,
    ) -> Result<(), CommandError> {
        let url = self
            .chat_url
            .as_deref()
            .ok_or(CommandError::NotConfigured("chat"))?;

        let body = serde_json::json!({
            "session_id": session_id,
            "content": chat.content,
            "client_timestamp": chat.client_timestamp,
            "timezone_offset": chat.timezone_offset,
        });

        let response = self
            .http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CommandError::Status(response.status().as_u16()));
        }

        let stream = sse::frames(response.bytes_stream());
        futures::pin_mut!(stream);
        while let Some(frame) = stream.next().await {
            let frame = frame.map_err(|e| CommandError::Stream(e.to_string()))?;
            if frames.send(frame).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}
