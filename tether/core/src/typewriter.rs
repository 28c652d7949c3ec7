//! Reveal Scheduler
//!
//! Exposes a growing text buffer at an organic pace. [`Typewriter`] is a pure
//! stepper (no clocks, no tasks): the owner asks it how long to wait, waits,
//! then ticks it. [`run_reveal`] is the timer-driven task that does exactly
//! that against a `watch` channel of targets.
//!
//! ```text
//! idle --content--> running --caught up--> settling --window, stream done--> finished
//!                      ^                      |
//!                      +-----more content-----+
//! ```
//!
//! The revealed length never decreases. Content that was already complete
//! when first seen (history) is shown at once; pacing is for live streams.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::interleave::char_slice;

/// Pacing configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealConfig {
    /// Shortest per-character delay
    pub char_delay_min: Duration,
    /// Longest per-character delay
    pub char_delay_max: Duration,
    /// Shortest delay before the first character of a fresh reveal
    pub startup_delay_min: Duration,
    /// Longest delay before the first character of a fresh reveal
    pub startup_delay_max: Duration,
    /// How long to wait for more content after catching up
    pub settle_window: Duration,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            char_delay_min: Duration::from_millis(12),
            char_delay_max: Duration::from_millis(32),
            startup_delay_min: Duration::from_millis(120),
            startup_delay_max: Duration::from_millis(260),
            settle_window: Duration::from_millis(400),
        }
    }
}

/// Where the reveal is
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RevealPhase {
    /// Nothing to show yet
    #[default]
    Idle,
    /// Revealing characters
    Running,
    /// Caught up, waiting briefly for more content
    Settling,
    /// Everything shown and the stream is over
    Finished,
}

/// Pure reveal stepper
#[derive(Debug)]
pub struct Typewriter {
    config: RevealConfig,
    target: String,
    target_len: usize,
    revealed: usize,
    streaming: bool,
    live: bool,
    phase: RevealPhase,
    rng: StdRng,
}

impl Typewriter {
    /// Create a stepper
    #[must_use]
    pub fn new(config: RevealConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Create a stepper with a fixed seed
    #[must_use]
    pub fn seeded(config: RevealConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RevealConfig, rng: StdRng) -> Self {
        Self {
            config,
            target: String::new(),
            target_len: 0,
            revealed: 0,
            streaming: false,
            live: false,
            phase: RevealPhase::Idle,
            rng,
        }
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> RevealPhase {
        self.phase
    }

    /// Characters revealed so far
    #[must_use]
    pub fn revealed(&self) -> usize {
        self.revealed
    }

    /// The revealed prefix of the target
    #[must_use]
    pub fn displayed(&self) -> &str {
        char_slice(&self.target, 0, self.revealed)
    }

    /// Replace the target
    ///
    /// The target is expected to only grow. If it ever shrinks below what is
    /// already shown, the shown text is kept and the reveal resumes once the
    /// target grows past it.
    pub fn set_target(&mut self, text: &str, streaming: bool) {
        let len = text.chars().count();
        if len >= self.revealed {
            self.target.clear();
            self.target.push_str(text);
            self.target_len = len;
        } else {
            self.target = char_slice(&self.target, 0, self.revealed).to_string();
            self.target_len = self.revealed;
        }
        self.streaming = streaming;

        if !self.live {
            if !streaming && self.revealed == 0 {
                self.revealed = self.target_len;
                self.phase = if self.target_len > 0 {
                    RevealPhase::Finished
                } else {
                    RevealPhase::Idle
                };
                return;
            }
            self.live = true;
        }

        let behind = self.target_len > self.revealed;
        self.phase = match self.phase {
            RevealPhase::Idle | RevealPhase::Settling | RevealPhase::Finished if behind => {
                RevealPhase::Running
            }
            phase => phase,
        };
    }

    /// Delay before the next [`tick`](Self::tick), `None` when waiting for
    /// content
    pub fn next_delay(&mut self) -> Option<Duration> {
        match self.phase {
            RevealPhase::Running if self.revealed == 0 => Some(self.random_between(
                self.config.startup_delay_min,
                self.config.startup_delay_max,
            )),
            RevealPhase::Running => Some(
                self.random_between(self.config.char_delay_min, self.config.char_delay_max),
            ),
            RevealPhase::Settling => Some(self.config.settle_window),
            RevealPhase::Idle | RevealPhase::Finished => None,
        }
    }

    /// Advance one step; returns whether the revealed text changed
    pub fn tick(&mut self) -> bool {
        match self.phase {
            RevealPhase::Running => {
                let advanced = self.revealed < self.target_len;
                if advanced {
                    self.revealed += 1;
                }
                if self.revealed >= self.target_len {
                    self.phase = RevealPhase::Settling;
                }
                advanced
            }
            RevealPhase::Settling => {
                if !self.streaming {
                    self.phase = RevealPhase::Finished;
                }
                false
            }
            RevealPhase::Idle | RevealPhase::Finished => false,
        }
    }

    /// Forget all progress
    pub fn reset(&mut self) {
        self.target.clear();
        self.target_len = 0;
        self.revealed = 0;
        self.streaming = false;
        self.live = false;
        self.phase = RevealPhase::Idle;
    }

    fn random_between(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}

/// Target fed to [`run_reveal`]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevealTarget {
    /// Full text so far
    pub text: String,
    /// Whether more text may arrive
    pub streaming: bool,
}

/// Published reveal progress
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RevealSnapshot {
    /// Revealed prefix
    pub text: String,
    /// Revealed characters
    pub revealed: usize,
    /// Phase after the last step
    pub phase: RevealPhase,
}

/// Drive a [`Typewriter`] from a target channel
///
/// Returns when the target sender is dropped. A deadline is kept across target
/// updates so chunks arriving faster than the pace cannot stall the reveal.
pub async fn run_reveal(
    mut typewriter: Typewriter,
    mut targets: watch::Receiver<RevealTarget>,
    snapshots: watch::Sender<RevealSnapshot>,
) {
    let publish = |typewriter: &Typewriter| {
        snapshots.send_replace(RevealSnapshot {
            text: typewriter.displayed().to_string(),
            revealed: typewriter.revealed(),
            phase: typewriter.phase(),
        });
    };

    {
        let target = targets.borrow_and_update();
        typewriter.set_target(&target.text, target.streaming);
    }
    publish(&typewriter);

    let mut deadline: Option<Instant> = None;
    loop {
        if deadline.is_none() {
            deadline = typewriter.next_delay().map(|delay| Instant::now() + delay);
        }

        let target_changed = match deadline {
            Some(at) => {
                tokio::select! {
                    () = tokio::time::sleep_until(at) => {
                        deadline = None;
                        let before = typewriter.phase();
                        if typewriter.tick() || typewriter.phase() != before {
                            publish(&typewriter);
                        }
                        continue;
                    }
                    changed = targets.changed() => changed,
                }
            }
            None => targets.changed().await,
        };

        if target_changed.is_err() {
            tracing::trace!("Reveal target dropped, stopping");
            return;
        }

        let before = typewriter.phase();
        {
            let target = targets.borrow_and_update();
            typewriter.set_target(&target.text, target.streaming);
        }
        if typewriter.phase() != before {
            deadline = None;
        }
        publish(&typewriter);
    }
}
