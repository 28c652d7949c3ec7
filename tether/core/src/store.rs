//! Subscribable Store
//!
//! Holds the [`ChatState`] and notifies subscribers after every change. The
//! store is constructed by the entry point and passed by handle; clones share
//! the same state.

use std::sync::Arc;

use tokio::sync::watch;

use crate::protocol::Event;
use crate::state::{self, ChatState, RunEffect};

/// Shared handle to the conversation state
#[derive(Clone, Debug)]
pub struct Store {
    tx: Arc<watch::Sender<ChatState>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(ChatState::default())
    }
}

impl Store {
    /// Create a store holding `initial`
    #[must_use]
    pub fn new(initial: ChatState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> ChatState {
        self.tx.borrow().clone()
    }

    /// Read the state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&ChatState) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Mutate the state and notify subscribers
    pub fn update(&self, f: impl FnOnce(&mut ChatState)) {
        self.tx.send_modify(f);
    }

    /// Apply an inbound event
    pub fn dispatch(&self, event: &Event, now: u64) -> Vec<RunEffect> {
        let mut effects = Vec::new();
        self.tx.send_modify(|state| effects = state::update(state, event, now));
        effects
    }

    /// Start receiving change notifications
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A live subscription; dropping it unsubscribes
#[derive(Debug)]
pub struct Subscription {
    rx: watch::Receiver<ChatState>,
}

impl Subscription {
    /// Wait for the next change
    ///
    /// Returns `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Borrow the latest state, marking it seen
    pub fn latest(&mut self) -> watch::Ref<'_, ChatState> {
        self.rx.borrow_and_update()
    }

    /// Stop receiving notifications
    pub fn unsubscribe(self) {}
}
