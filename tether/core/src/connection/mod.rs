//! Connection Manager
//!
//! Owns the lifecycle of the link to the backend: connect, heartbeat,
//! exponential reconnect and manual disconnect.
//!
//! # Concurrency Model
//!
//! The manager has a single owner. `connect`, `disconnect` and `send` are
//! synchronous; anything that waits (the connect attempt, the link's read
//! pump, reconnect timers) runs in a spawned task that reports back through an
//! internal channel. Each report is tagged with the generation that spawned
//! it, and the generation changes on every teardown, so a late timer or a
//! superseded attempt can never revive a link that was torn down.
//!
//! The owner drives the manager by awaiting [`ConnectionManager::next_event`].
//!
//! # State Machine
//!
//! ```text
//! disconnected --connect--> connecting --opened--> connected
//!      ^                        |                     |
//!      |                     failed                 closed
//!      |                        v                     v
//!      +--exhausted------- reconnecting <-------------+
//!                           (timer) --> connecting
//! ```

pub mod backoff;
pub mod heartbeat;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;

use crate::protocol::{decode_frame, Event, Frame, OutboundMessage};
use crate::transport::{StreamConnector, StreamLink, TransportError};

pub use backoff::ReconnectPolicy;
pub use heartbeat::{Heartbeat, HeartbeatConfig, HeartbeatStats};

/// Link status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// No link and nothing scheduled
    #[default]
    Disconnected,
    /// An attempt is in flight
    Connecting,
    /// The link is open
    Connected,
    /// Waiting for the backoff timer
    Reconnecting,
}

/// Observable connection state
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    /// Current status
    pub status: ConnectionStatus,
    /// Consecutive failed attempts since the last success or manual disconnect
    pub attempt: u32,
    /// Most recent failure, cleared on successful connect
    pub last_error: Option<String>,
}

/// Events produced by the manager
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    /// The state changed; carries the new state
    StatusChanged(ConnectionState),
    /// A link opened
    Connected,
    /// An open link went away
    Disconnected {
        /// Whether the owner asked for it
        manual: bool,
        /// Why the link went away, for unexpected closes
        reason: Option<String>,
    },
    /// A reconnect attempt is scheduled
    ReconnectScheduled {
        /// 1-based attempt number
        attempt: u32,
        /// Delay before the attempt
        delay: Duration,
    },
    /// The backoff schedule is exhausted; no further attempts are made
    ReconnectFailed {
        /// Attempts made
        attempts: u32,
    },
    /// A decoded inbound event
    Inbound(Event),
}

/// Connection configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Heartbeat settings
    pub heartbeat: HeartbeatConfig,
    /// Reconnect schedule
    pub reconnect: ReconnectPolicy,
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Reports from spawned tasks
enum Signal {
    Opened { generation: u64, link: StreamLink },
    OpenFailed { generation: u64, error: TransportError },
    Frame { generation: u64, frame: Frame },
    Closed { generation: u64 },
    ReconnectDue { generation: u64 },
}

/// Single-owner connection manager
pub struct ConnectionManager {
    connector: Arc<dyn StreamConnector>,
    config: ConnectionConfig,
    state: ConnectionState,
    session_id: Option<String>,
    generation: u64,
    outbound: Option<mpsc::Sender<String>>,
    connect_task: Option<AbortHandle>,
    pump_task: Option<AbortHandle>,
    reconnect_timer: Option<AbortHandle>,
    heartbeat: Option<Heartbeat>,
    heartbeat_stats: Arc<HeartbeatStats>,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    pending: VecDeque<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a manager for a connector
    #[must_use]
    pub fn new(connector: Arc<dyn StreamConnector>, config: ConnectionConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            config,
            state: ConnectionState::default(),
            session_id: None,
            generation: 0,
            outbound: None,
            connect_task: None,
            pump_task: None,
            reconnect_timer: None,
            heartbeat: None,
            heartbeat_stats: Arc::new(HeartbeatStats::default()),
            signal_tx,
            signal_rx,
            pending: VecDeque::new(),
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Check whether a link is open
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.status == ConnectionStatus::Connected
    }

    /// Session the manager connects with
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Heartbeat counters across all links
    #[must_use]
    pub fn heartbeat_stats(&self) -> &HeartbeatStats {
        &self.heartbeat_stats
    }

    /// Open a link for `session_id`
    ///
    /// No-op while connecting or connected. While waiting to reconnect, the
    /// pending timer is cancelled and the attempt starts immediately.
    pub fn connect(&mut self, session_id: &str) {
        match self.state.status {
            ConnectionStatus::Connecting | ConnectionStatus::Connected => {
                tracing::debug!(status = ?self.state.status, "Connect ignored, link already active");
                return;
            }
            ConnectionStatus::Reconnecting => {
                tracing::debug!("Connect requested while reconnecting, attempting now");
                self.cancel_reconnect_timer();
            }
            ConnectionStatus::Disconnected => {}
        }

        self.session_id = Some(session_id.to_string());
        self.begin_connect();
    }

    /// Tear the link down
    ///
    /// A manual disconnect resets the attempt counter and is never treated as
    /// a failure. A non-manual one is handled like an unexpected close and
    /// enters the reconnect schedule.
    pub fn disconnect(&mut self, manual: bool) {
        let was_connected = self.is_connected();
        self.teardown();

        if !manual {
            if self.session_id.is_none() {
                tracing::debug!("Disconnect before any session, nothing to reconnect");
                self.set_status(ConnectionStatus::Disconnected);
                return;
            }
            self.handle_failure("Disconnected".to_string(), was_connected);
            return;
        }

        tracing::info!(was_connected, "Manual disconnect");
        self.state.attempt = 0;
        if was_connected {
            self.pending.push_back(ConnectionEvent::Disconnected {
                manual: true,
                reason: None,
            });
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Write a message to the open link
    ///
    /// Returns `false` (and logs) when there is no open link or its queue is
    /// full. Never blocks.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        let Some(outbound) = self.outbound.as_ref().filter(|_| self.is_connected()) else {
            tracing::warn!(status = ?self.state.status, "Not connected, dropping outbound message");
            return false;
        };

        match outbound.try_send(message.to_wire()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Outbound queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("Outbound link closed, dropping message");
                false
            }
        }
    }

    /// Wait for the next event
    ///
    /// Pends forever while idle; intended for use inside `tokio::select!`.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let signal = self.signal_rx.recv().await?;
            self.handle_signal(signal);
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Opened { generation, link } if generation == self.generation => {
                self.on_opened(link);
            }
            Signal::OpenFailed { generation, error } if generation == self.generation => {
                tracing::warn!(
                    transport = self.connector.name(),
                    error = %error,
                    attempt = self.state.attempt,
                    "Connect attempt failed"
                );
                self.connect_task = None;
                self.handle_failure(error.to_string(), false);
            }
            Signal::Frame { generation, frame } if generation == self.generation => {
                match decode_frame(&frame) {
                    Ok(event) => self.pending.push_back(ConnectionEvent::Inbound(event)),
                    Err(e) => tracing::warn!(error = %e, "Dropping malformed frame"),
                }
            }
            Signal::Closed { generation } if generation == self.generation => {
                tracing::warn!(transport = self.connector.name(), "Link closed unexpectedly");
                self.teardown();
                self.handle_failure("Connection closed".to_string(), true);
            }
            Signal::ReconnectDue { generation } if generation == self.generation => {
                self.reconnect_timer = None;
                if self.state.status == ConnectionStatus::Reconnecting {
                    self.begin_connect();
                }
            }
            _ => tracing::trace!("Ignoring signal from a superseded generation"),
        }
    }

    fn begin_connect(&mut self) {
        let Some(session_id) = self.session_id.clone() else {
            self.set_status(ConnectionStatus::Disconnected);
            return;
        };

        self.abort_connect_task();
        self.generation += 1;
        self.set_status(ConnectionStatus::Connecting);

        let generation = self.generation;
        let connector = Arc::clone(&self.connector);
        let signals = self.signal_tx.clone();
        let timeout = self.config.connect_timeout;

        tracing::debug!(
            transport = connector.name(),
            attempt = self.state.attempt,
            "Connecting"
        );

        let task = tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, connector.connect(&session_id)).await;
            let signal = match result {
                Ok(Ok(link)) => Signal::Opened { generation, link },
                Ok(Err(error)) => Signal::OpenFailed { generation, error },
                Err(_) => Signal::OpenFailed {
                    generation,
                    error: TransportError::Timeout(
                        u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    ),
                },
            };
            let _ = signals.send(signal);
        });
        self.connect_task = Some(task.abort_handle());
    }

    fn on_opened(&mut self, link: StreamLink) {
        self.connect_task = None;
        let StreamLink {
            outbound,
            mut inbound,
        } = link;

        let generation = self.generation;
        let signals = self.signal_tx.clone();
        let pump = tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                if signals.send(Signal::Frame { generation, frame }).is_err() {
                    return;
                }
            }
            let _ = signals.send(Signal::Closed { generation });
        });

        self.pump_task = Some(pump.abort_handle());
        self.heartbeat = Heartbeat::start(
            &self.config.heartbeat,
            outbound.clone(),
            Arc::clone(&self.heartbeat_stats),
        );
        self.outbound = Some(outbound);

        self.state.attempt = 0;
        self.state.last_error = None;
        tracing::info!(transport = self.connector.name(), "Connected");
        self.set_status(ConnectionStatus::Connected);
        self.pending.push_back(ConnectionEvent::Connected);
    }

    fn handle_failure(&mut self, reason: String, was_connected: bool) {
        self.state.last_error = Some(reason.clone());
        if was_connected {
            self.pending.push_back(ConnectionEvent::Disconnected {
                manual: false,
                reason: Some(reason),
            });
        }

        let Some(delay) = self.config.reconnect.next_delay(self.state.attempt) else {
            let attempts = self.state.attempt;
            tracing::error!(attempts, "Reconnect attempts exhausted");
            self.set_status(ConnectionStatus::Disconnected);
            self.pending
                .push_back(ConnectionEvent::ReconnectFailed { attempts });
            return;
        };

        self.state.attempt += 1;
        let attempt = self.state.attempt;
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        self.set_status(ConnectionStatus::Reconnecting);
        self.pending
            .push_back(ConnectionEvent::ReconnectScheduled { attempt, delay });

        let generation = self.generation;
        let signals = self.signal_tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = signals.send(Signal::ReconnectDue { generation });
        });
        self.reconnect_timer = Some(timer.abort_handle());
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.state.status = status;
        self.pending
            .push_back(ConnectionEvent::StatusChanged(self.state.clone()));
    }

    /// Abort everything tied to the current generation and start a new one
    fn teardown(&mut self) {
        self.abort_connect_task();
        self.cancel_reconnect_timer();
        if let Some(pump) = self.pump_task.take() {
            pump.abort();
        }
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        self.outbound = None;
        self.generation += 1;
    }

    fn abort_connect_task(&mut self) {
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
    }

    fn cancel_reconnect_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &self.connector.name())
            .field("state", &self.state)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
