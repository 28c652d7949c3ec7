//! Client Entry Point
//!
//! [`Client`] owns everything with a lifetime: the store, the connection
//! manager, the settle timer, in-flight HTTP sends and command requests. It is
//! driven by one task calling [`Client::step`] (or [`Client::run`]), so state
//! is only ever mutated from that task.
//!
//! # Example
//!
//! ```ignore
//! let mut client = Client::builder(Arc::new(connector))
//!     .storage(Arc::new(FileSessionStorage::new(path)))
//!     .build()
//!     .await?;
//! client.connect();
//! let store = client.store().clone();
//! tokio::spawn(client.run(inputs));
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinSet};

use crate::commands::{CommandClient, CommandError};
use crate::config::TetherConfig;
use crate::connection::{ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState};
use crate::identity::{
    self, IdentityProvider, LocalIdentity, MemorySessionStorage, SessionId, SessionStorage,
    StorageError,
};
use crate::protocol::{decode_frame, ChatContent, CommandResult, ErrorPayload, Event, OutboundMessage};
use crate::state::{self, now_ms, RunEffect, RunId};
use crate::store::Store;
use crate::transport::StreamConnector;

/// Requests accepted by [`Client::run`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientInput {
    /// Send chat content
    Chat(String),
    /// Run a command (without the leading slash)
    Command(String),
    /// Open the connection
    Connect,
    /// Close the connection
    Disconnect,
    /// Switch to a fresh session
    RotateSession,
}

/// Reports from tasks the client spawned
enum Signal {
    Settle { run_id: Option<RunId> },
    ChatFrame { generation: u64, frame: crate::protocol::Frame },
    ChatFailed { generation: u64, error: String },
    CommandDone { result: CommandResult },
}

enum Next {
    Connection(Option<ConnectionEvent>),
    Signal(Option<Signal>),
}

/// Builder for [`Client`]
pub struct ClientBuilder {
    connector: Arc<dyn StreamConnector>,
    connection: ConnectionConfig,
    settle_delay: Duration,
    storage: Arc<dyn SessionStorage>,
    identity: Option<Arc<dyn IdentityProvider>>,
    commands: Option<CommandClient>,
}

impl ClientBuilder {
    /// Builder with defaults and in-memory session storage
    #[must_use]
    pub fn new(connector: Arc<dyn StreamConnector>) -> Self {
        Self {
            connector,
            connection: ConnectionConfig::default(),
            settle_delay: Duration::from_millis(1500),
            storage: Arc::new(MemorySessionStorage::new()),
            identity: None,
            commands: None,
        }
    }

    /// Builder seeded from a loaded configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client for commands cannot be built.
    pub fn from_config(
        config: &TetherConfig,
        connector: Arc<dyn StreamConnector>,
    ) -> Result<Self, CommandError> {
        let mut builder = Self::new(connector)
            .connection(config.connection.clone())
            .settle_delay(config.settle_delay);

        if config.http.command_url.is_some() || config.http.chat_url.is_some() {
            let commands = CommandClient::new(
                config.http.command_url.clone(),
                config.http.chat_url.clone(),
                config.http.request_timeout,
            )?
            .with_privileged_prefixes(config.http.privileged_prefixes.clone());
            builder = builder.commands(commands);
        }
        Ok(builder)
    }

    /// Set connection settings
    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set the delay between a run finishing and resetting to idle
    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set session persistence
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = storage;
        self
    }

    /// Set the identity provider (default: a local identity named after the
    /// session)
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Enable HTTP commands and chat
    #[must_use]
    pub fn commands(mut self, commands: CommandClient) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Load the session and build the client
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the session cannot be loaded or created.
    pub async fn build(self) -> Result<Client, StorageError> {
        self.build_with_session(false).await
    }

    /// Build on a freshly rotated session
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the session cannot be written.
    pub async fn build_with_new_session(self) -> Result<Client, StorageError> {
        self.build_with_session(true).await
    }

    async fn build_with_session(self, rotate: bool) -> Result<Client, StorageError> {
        let session = if rotate {
            identity::rotate_session(self.storage.as_ref()).await?
        } else {
            identity::load_or_create_session(self.storage.as_ref()).await?
        };
        let identity = self
            .identity
            .unwrap_or_else(|| Arc::new(LocalIdentity::new(session.as_str())));
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        tracing::info!(
            session_id = %session,
            transport = self.connector.name(),
            "Client ready"
        );

        Ok(Client {
            store: Store::default(),
            connection: ConnectionManager::new(self.connector, self.connection),
            session,
            storage: self.storage,
            identity,
            commands: self.commands,
            settle_delay: self.settle_delay,
            settle_timer: None,
            chat_task: None,
            chat_generation: 0,
            command_tasks: JoinSet::new(),
            signal_tx,
            signal_rx,
        })
    }
}

/// The client
pub struct Client {
    store: Store,
    connection: ConnectionManager,
    session: SessionId,
    storage: Arc<dyn SessionStorage>,
    identity: Arc<dyn IdentityProvider>,
    commands: Option<CommandClient>,
    settle_delay: Duration,
    settle_timer: Option<AbortHandle>,
    chat_task: Option<AbortHandle>,
    chat_generation: u64,
    command_tasks: JoinSet<()>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
}

impl Client {
    /// Start building a client
    #[must_use]
    pub fn builder(connector: Arc<dyn StreamConnector>) -> ClientBuilder {
        ClientBuilder::new(connector)
    }

    /// Handle to the conversation store
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Current session
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session
    }

    /// Connection state as the manager sees it
    #[must_use]
    pub fn connection_state(&self) -> &ConnectionState {
        self.connection.state()
    }

    /// Heartbeat pings written so far
    #[must_use]
    pub fn pings_sent(&self) -> u64 {
        self.connection.heartbeat_stats().pings_sent()
    }

    /// Open the connection for the current session
    pub fn connect(&mut self) {
        self.connection.connect(self.session.as_str());
    }

    /// Close the connection
    pub fn disconnect(&mut self) {
        self.connection.disconnect(true);
    }

    /// Switch to a fresh session and reconnect on it
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the new session cannot be persisted; the
    /// current session stays in use.
    pub async fn rotate_session(&mut self) -> Result<SessionId, StorageError> {
        let session = identity::rotate_session(self.storage.as_ref()).await?;
        tracing::info!(old = %self.session, new = %session, "Rotating session");

        self.connection.disconnect(true);
        self.session = session.clone();
        self.connection.connect(self.session.as_str());
        Ok(session)
    }

    /// Record and send chat content
    ///
    /// Goes over HTTP when a chat URL is configured (aborting any previous
    /// in-flight send), otherwise over the socket. Returns whether the content
    /// was handed off.
    pub fn send_chat(&mut self, text: &str) -> bool {
        let now = now_ms();
        self.store.update(|state| {
            state.push_human(text, now);
        });

        let chat = ChatContent::now(text);
        match self.commands.clone() {
            Some(commands) if commands.has_chat_url() => {
                self.post_chat(commands, chat);
                true
            }
            _ => {
                let sent = self.connection.send(&OutboundMessage::Message {
                    session_id: self.session.to_string(),
                    chat,
                });
                if !sent {
                    self.store.update(|state| {
                        state.last_error = Some("Not connected, message not sent".to_string());
                    });
                }
                sent
            }
        }
    }

    /// Record and run a command
    ///
    /// The outcome always arrives as a system message, never as an error.
    pub fn send_command(&mut self, command: &str) {
        let now = now_ms();
        self.store.update(|state| {
            state.push_command(command, now);
        });

        let Some(commands) = self.commands.clone() else {
            self.push_command_result(CommandResult::error(
                CommandError::NotConfigured("command").to_string(),
            ));
            return;
        };

        let visitor_mode = self.store.read(|state| state.visitor_mode);
        let request = match commands.prepare(
            command,
            self.session.as_str(),
            self.identity.as_ref(),
            visitor_mode,
        ) {
            Ok(request) => request,
            Err(e) => {
                tracing::info!(command, error = %e, "Command refused");
                self.push_command_result(CommandResult::error(e.to_string()));
                return;
            }
        };

        while self.command_tasks.try_join_next().is_some() {}
        let signals = self.signal_tx.clone();
        self.command_tasks.spawn(async move {
            let result = commands.run_command(&request).await;
            let _ = signals.send(Signal::CommandDone { result });
        });
    }

    /// Process the next connection event or internal signal
    pub async fn step(&mut self) {
        let next = tokio::select! {
            event = self.connection.next_event() => Next::Connection(event),
            signal = self.signal_rx.recv() => Next::Signal(signal),
        };

        match next {
            Next::Connection(Some(event)) => self.on_connection_event(event),
            Next::Signal(Some(signal)) => self.on_signal(signal),
            Next::Connection(None) | Next::Signal(None) => {}
        }
    }

    /// Drive the client until `inputs` closes
    pub async fn run(mut self, mut inputs: mpsc::Receiver<ClientInput>) {
        loop {
            tokio::select! {
                input = inputs.recv() => {
                    let Some(input) = input else {
                        tracing::debug!("Input channel closed, client stopping");
                        break;
                    };
                    self.handle_input(input).await;
                }
                () = self.step() => {}
            }
        }
        self.connection.disconnect(true);
    }

    async fn handle_input(&mut self, input: ClientInput) {
        match input {
            ClientInput::Chat(text) => {
                self.send_chat(&text);
            }
            ClientInput::Command(command) => self.send_command(&command),
            ClientInput::Connect => self.connect(),
            ClientInput::Disconnect => self.disconnect(),
            ClientInput::RotateSession => {
                if let Err(e) = self.rotate_session().await {
                    tracing::error!(error = %e, "Session rotation failed");
                    let now = now_ms();
                    self.store.update(|state| {
                        state.push_system(format!("Session rotation failed: {e}"), now);
                    });
                }
            }
        }
    }

    fn on_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StatusChanged(connection) => {
                self.store.update(|state| state.connection = connection);
            }
            ConnectionEvent::Connected => {
                tracing::info!(session_id = %self.session, "Stream connected");
                self.store.update(|state| state.reconnect_exhausted = false);
            }
            ConnectionEvent::Disconnected { manual, reason } => {
                if manual {
                    tracing::info!("Stream disconnected");
                } else {
                    tracing::warn!(reason = reason.as_deref().unwrap_or("unknown"), "Stream lost");
                }
            }
            ConnectionEvent::ReconnectScheduled { attempt, delay } => {
                tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
            }
            ConnectionEvent::ReconnectFailed { attempts } => {
                tracing::error!(attempts, "Giving up on the stream");
                self.store.update(|state| state.reconnect_exhausted = true);
            }
            ConnectionEvent::Inbound(event) => self.apply_event(&event),
        }
    }

    fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Settle { run_id } => {
                self.settle_timer = None;
                self.store.update(|state| {
                    state::settle(state, run_id.as_ref());
                });
            }
            Signal::ChatFrame { generation, frame } if generation == self.chat_generation => {
                match decode_frame(&frame) {
                    Ok(event) => self.apply_event(&event),
                    Err(e) => tracing::warn!(error = %e, "Dropping malformed chat frame"),
                }
            }
            Signal::ChatFailed { generation, error } if generation == self.chat_generation => {
                self.chat_task = None;
                let mut effects = Vec::new();
                self.store.update(|state| {
                    effects = state::error(
                        state,
                        &ErrorPayload {
                            message: error,
                            code: None,
                        },
                        now_ms(),
                    );
                });
                self.apply_effects(effects);
            }
            Signal::CommandDone { result } => self.push_command_result(result),
            Signal::ChatFrame { .. } | Signal::ChatFailed { .. } => {
                tracing::trace!("Ignoring output of a superseded chat send");
            }
        }
    }

    fn apply_event(&mut self, event: &Event) {
        if event.kind().is_none() {
            tracing::debug!(event = event.name(), "Ignoring unknown event");
            return;
        }
        tracing::trace!(event = event.name(), run_id = %event.run_id, "Applying event");

        let effects = self.store.dispatch(event, now_ms());
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Vec<RunEffect>) {
        for effect in effects {
            match effect {
                RunEffect::ScheduleSettle { run_id } => self.schedule_settle(run_id),
            }
        }
    }

    fn schedule_settle(&mut self, run_id: Option<RunId>) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        let delay = self.settle_delay;
        let signals = self.signal_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(Signal::Settle { run_id });
        });
        self.settle_timer = Some(timer.abort_handle());
    }

    fn post_chat(&mut self, commands: CommandClient, chat: ChatContent) {
        if let Some(previous) = self.chat_task.take() {
            tracing::debug!("Aborting in-flight chat send");
            previous.abort();
        }
        self.chat_generation += 1;

        let generation = self.chat_generation;
        let session_id = self.session.to_string();
        let signals = self.signal_tx.clone();

        let task = tokio::spawn(async move {
            let (frames_tx, mut frames_rx) = mpsc::channel(64);
            let forward_signals = signals.clone();
            let forward = async move {
                while let Some(frame) = frames_rx.recv().await {
                    let _ = forward_signals.send(Signal::ChatFrame { generation, frame });
                }
            };

            let (result, ()) = tokio::join!(commands.post_chat(&session_id, &chat, frames_tx), forward);
            if let Err(e) = result {
                tracing::warn!(error = %e, "Chat send failed");
                let _ = signals.send(Signal::ChatFailed {
                    generation,
                    error: e.to_string(),
                });
            }
        });
        self.chat_task = Some(task.abort_handle());
    }

    fn push_command_result(&self, result: CommandResult) {
        let now = now_ms();
        self.store.update(|state| {
            state.push_command_result(result, now);
        });
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(timer) = self.settle_timer.take() {
            timer.abort();
        }
        if let Some(task) = self.chat_task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("session", &self.session)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
