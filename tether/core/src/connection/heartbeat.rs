//! Heartbeat
//!
//! While a link is open, a ping is written every `interval` to keep
//! intermediaries from idling the connection out. The task is aborted when the
//! link is torn down; a closed outbound channel also ends it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;

use crate::protocol::encode_ping;

/// Configuration for heartbeat behavior
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings (default: 25 seconds)
    pub interval: Duration,
    /// Whether heartbeat is enabled (can be disabled for testing)
    pub enabled: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(25),
            enabled: true,
        }
    }
}

impl HeartbeatConfig {
    /// Create a config with heartbeat disabled
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Set the ping interval
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Create a config suitable for testing (shorter interval)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            interval: Duration::from_millis(100),
            enabled: true,
        }
    }
}

/// Counters shared across every heartbeat a manager starts
#[derive(Debug, Default)]
pub struct HeartbeatStats {
    pings_sent: AtomicU64,
    pings_skipped: AtomicU64,
}

impl HeartbeatStats {
    /// Total pings written
    #[must_use]
    pub fn pings_sent(&self) -> u64 {
        self.pings_sent.load(Ordering::Relaxed)
    }

    /// Pings dropped because the outbound queue was full
    #[must_use]
    pub fn pings_skipped(&self) -> u64 {
        self.pings_skipped.load(Ordering::Relaxed)
    }
}

/// A running heartbeat for one link
#[derive(Debug)]
pub struct Heartbeat {
    handle: AbortHandle,
}

impl Heartbeat {
    /// Start pinging over `outbound`
    ///
    /// Returns `None` when heartbeat is disabled.
    #[must_use]
    pub fn start(
        config: &HeartbeatConfig,
        outbound: mpsc::Sender<String>,
        stats: Arc<HeartbeatStats>,
    ) -> Option<Self> {
        if !config.enabled || config.interval.is_zero() {
            return None;
        }

        let period = config.interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let ping = encode_ping(chrono::Utc::now().timestamp_millis());
                match outbound.try_send(ping) {
                    Ok(()) => {
                        stats.pings_sent.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!("Ping sent");
                    }
                    Err(TrySendError::Full(_)) => {
                        stats.pings_skipped.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("Outbound queue full, skipping ping");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!("Outbound closed, heartbeat stopping");
                        break;
                    }
                }
            }
        });

        Some(Self {
            handle: task.abort_handle(),
        })
    }

    /// Stop pinging
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = HeartbeatConfig::default().with_interval(Duration::from_secs(5));
        assert_eq!(config.interval, Duration::from_secs(5));
        assert!(config.enabled);
        assert!(!HeartbeatConfig::disabled().enabled);
        assert_eq!(HeartbeatConfig::for_testing().interval, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_disabled_does_not_start() {
        let (tx, _rx) = mpsc::channel(4);
        let stats = Arc::new(HeartbeatStats::default());
        assert!(Heartbeat::start(&HeartbeatConfig::disabled(), tx, stats).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pings_on_interval() {
        let (tx, mut rx) = mpsc::channel(16);
        let stats = Arc::new(HeartbeatStats::default());
        let heartbeat =
            Heartbeat::start(&HeartbeatConfig::for_testing(), tx, Arc::clone(&stats)).unwrap();

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(stats.pings_sent(), 3);

        let ping: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(ping["type"], "ping");

        heartbeat.stop();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(stats.pings_sent(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_skips() {
        let (tx, _rx) = mpsc::channel(1);
        let stats = Arc::new(HeartbeatStats::default());
        let _heartbeat =
            Heartbeat::start(&HeartbeatConfig::for_testing(), tx, Arc::clone(&stats)).unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(stats.pings_sent(), 1);
        assert_eq!(stats.pings_skipped(), 1);
    }
}
