//! Tether Core - Client-side reconciliation for streamed agent runs
//!
//! An agent backend streams a run as a sequence of events: the run starts,
//! tools are called, text arrives in chunks, the run finishes. This crate
//! keeps a live connection to that stream and folds the events into a
//! conversation model that a renderer can draw at any moment.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Renderer (CLI, UI)                      │
//! │        MessageView ──► ViewSnapshot { fragments, phase }         │
//! └───────────────▲──────────────────────────────────▲───────────────┘
//!                 │ Subscription                     │ reveal timers
//! ┌───────────────┴──────────────┐   ┌───────────────┴───────────────┐
//! │            Store             │   │   Typewriter + Interleaver    │
//! │   ChatState (runs, messages) │   │   paced text, tool anchoring  │
//! └───────────────▲──────────────┘   └───────────────────────────────┘
//!                 │ state::update
//! ┌───────────────┴──────────────────────────────────────────────────┐
//! │                             Client                               │
//! │  ConnectionManager ─ heartbeat ─ backoff      CommandClient      │
//! └───────────────▲──────────────────────────────────▲───────────────┘
//!                 │ StreamLink (frames)              │ HTTP
//! ┌───────────────┴──────────────────────────────────┴───────────────┐
//! │   WebSocketConnector   SseConnector   InProcessConnector (tests) │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`Client`]: owns the store, the connection and every timer
//! - [`ConnectionManager`]: connect, heartbeat and reconnect lifecycle
//! - [`ChatState`]: the conversation model, mutated only by [`state::update`]
//! - [`MessageView`]: render pipeline for one message
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_core::{Client, ClientInput, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://127.0.0.1:8000/ws/{session}");
//! let mut client = Client::builder(Arc::new(connector)).build().await?;
//! client.connect();
//!
//! let store = client.store().clone();
//! let (inputs, rx) = tokio::sync::mpsc::channel(16);
//! tokio::spawn(client.run(rx));
//! inputs.send(ClientInput::Chat("hello".into())).await?;
//! ```

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod identity;
pub mod interleave;
pub mod protocol;
pub mod state;
pub mod store;
pub mod transport;
pub mod typewriter;
pub mod view;

// Re-exports for convenience
pub use client::{Client, ClientBuilder, ClientInput};
pub use commands::{CommandClient, CommandError};
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    TetherConfig,
};
pub use connection::{
    ConnectionConfig, ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStatus,
};
pub use identity::{
    FileSessionStorage, IdentityProvider, LocalIdentity, MemorySessionStorage, SessionId,
    SessionStorage, StorageError,
};
pub use interleave::{Fragment, Interleaver};
pub use protocol::{ChatContent, CommandResult, Event, EventKind, EventPayload, Frame};
pub use state::{ChatState, Message, MessageContent, MessageId, Role, RunId, RunStatus, ToolCall, ToolCallStatus};
pub use store::{Store, Subscription};
pub use transport::{InProcessConnector, InProcessServer, SseConnector, StreamConnector, TransportKind};
#[cfg(feature = "websocket")]
pub use transport::WebSocketConnector;
pub use typewriter::{RevealConfig, RevealPhase, Typewriter};
pub use view::{MessageView, ViewSnapshot};
