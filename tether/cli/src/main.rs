//! Tether CLI
//!
//! Headless terminal client for an agent event stream. Lines typed on stdin
//! are sent as chat; lines starting with `/` are commands. The assistant's
//! answer is printed at the reveal pace, with tool cards where they happened.
//!
//! # Usage
//!
//! ```bash
//! # Connect with the configured endpoint
//! tether
//!
//! # Text-stream transport, fresh session
//! tether --endpoint http://127.0.0.1:8000/stream/{session} --transport sse --new-session
//!
//! # With verbose logging (logs go to stderr)
//! RUST_LOG=tether_core=debug tether
//! ```
//!
//! # Local Commands
//!
//! - `/new`: start a new session
//! - `/connect`, `/disconnect`: manage the stream
//! - `/quit`: exit

mod input;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tether_core::transport::StreamConnector;
use tether_core::{
    load_config_from_path, ClientBuilder, ConfigOverrides, FileSessionStorage,
    MemorySessionStorage, SessionStorage, SseConnector, TetherConfig, TransportKind,
};

use crate::input::{parse_line, Line};

/// Terminal client for an agent event stream
#[derive(Debug, Parser)]
#[command(name = "tether", version, about)]
struct Args {
    /// Stream endpoint; `{session}` is replaced by the session id
    #[arg(long)]
    endpoint: Option<String>,

    /// Transport: websocket or sse
    #[arg(long)]
    transport: Option<String>,

    /// Configuration file (default: $XDG_CONFIG_HOME/tether/tether.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// File the session id is persisted in
    #[arg(long)]
    session_file: Option<PathBuf>,

    /// Start a new session instead of resuming the stored one
    #[arg(long)]
    new_session: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(format!("tether={level},tether_core={level}"))
            .with_context(|| format!("Invalid log level '{level}'"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
    Ok(())
}

fn load(args: &Args) -> anyhow::Result<TetherConfig> {
    let mut config =
        load_config_from_path(args.config.clone()).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(endpoint) = &args.endpoint {
        overrides = overrides.with_endpoint(endpoint.clone());
    }
    if let Some(transport) = &args.transport {
        let kind = TransportKind::parse(transport)
            .ok_or_else(|| anyhow!("Unknown transport '{transport}', expected websocket or sse"))?;
        overrides = overrides.with_transport(kind);
    }
    if let Some(path) = &args.session_file {
        overrides = overrides.with_session_file(path.clone());
    }
    overrides.apply(&mut config);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn connector(config: &TetherConfig) -> anyhow::Result<Arc<dyn StreamConnector>> {
    match config.transport {
        TransportKind::WebSocket => {
            #[cfg(feature = "websocket")]
            {
                Ok(Arc::new(tether_core::WebSocketConnector::new(config.endpoint.clone())))
            }
            #[cfg(not(feature = "websocket"))]
            {
                Err(anyhow!("Built without WebSocket support, use --transport sse"))
            }
        }
        TransportKind::Sse => {
            if config.http.chat_url.is_none() {
                warn!("Text-stream transport is receive-only, set http.chat_url to send chat");
            }
            let connector = SseConnector::new(config.endpoint.clone(), config.connection.connect_timeout)
                .context("Failed to create text-stream connector")?;
            Ok(Arc::new(connector))
        }
    }
}

fn storage(config: &TetherConfig) -> Arc<dyn SessionStorage> {
    match config.session_path() {
        Some(path) => Arc::new(FileSessionStorage::new(path)),
        None => {
            warn!("No data directory, session will not survive restarts");
            Arc::new(MemorySessionStorage::new())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = load(&args)?;
    info!(
        endpoint = %config.endpoint,
        transport = ?config.transport,
        source = %config.source(),
        "Starting tether"
    );

    let builder = ClientBuilder::from_config(&config, connector(&config)?)
        .context("Failed to create HTTP client")?
        .storage(storage(&config));
    let mut client = if args.new_session {
        builder.build_with_new_session().await
    } else {
        builder.build().await
    }
    .context("Failed to load session")?;

    client.connect();
    let store = client.store().clone();
    let (inputs, inputs_rx) = mpsc::channel(32);
    let client_task = tokio::spawn(client.run(inputs_rx));
    let render_task = tokio::spawn(render::render(store, config.reveal.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };

        match parse_line(&line) {
            Line::Input(input) => {
                if inputs.send(input).await.is_err() {
                    warn!("Client stopped");
                    break;
                }
            }
            Line::Quit => break,
            Line::Empty => {}
        }
    }

    drop(inputs);
    client_task.await.context("Client task panicked")?;
    render_task.abort();
    Ok(())
}
