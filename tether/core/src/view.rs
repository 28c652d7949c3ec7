//! Message Views
//!
//! A [`MessageView`] is the render pipeline for one message: it follows the
//! message in the store, paces its text through a reveal task and lays the
//! revealed text out with the message's tool cards. Renderers read
//! [`ViewSnapshot`]s and never touch timers.
//!
//! The view owns its tasks. Dropping it (or calling
//! [`detach`](MessageView::detach)) aborts the reveal timers.

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::interleave::{Fragment, Interleaver};
use crate::state::{ChatState, Message, MessageId};
use crate::store::{Store, Subscription};
use crate::typewriter::{run_reveal, RevealConfig, RevealPhase, RevealSnapshot, RevealTarget, Typewriter};

/// Render-ready state of one message
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewSnapshot {
    /// Ordered text and tool-card fragments
    pub fragments: Vec<Fragment>,
    /// Reveal phase
    pub phase: RevealPhase,
    /// Whether the message is complete and fully shown
    pub finished: bool,
}

impl ViewSnapshot {
    /// Concatenated text of all text fragments
    #[must_use]
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Text(text) => Some(text.as_str()),
                Fragment::Tool(_) => None,
            })
            .collect()
    }
}

/// Aborts a task when dropped
#[derive(Debug)]
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Live render pipeline for one message
#[derive(Debug)]
pub struct MessageView {
    message_id: MessageId,
    snapshots: watch::Receiver<ViewSnapshot>,
    _task: AbortOnDrop<()>,
}

impl MessageView {
    /// Attach a view to a message in `store`
    #[must_use]
    pub fn attach(store: &Store, message_id: MessageId, config: RevealConfig) -> Self {
        Self::with_typewriter(store, message_id, Typewriter::new(config))
    }

    /// Attach with a caller-supplied stepper (seeded, for tests)
    #[must_use]
    pub fn with_typewriter(store: &Store, message_id: MessageId, typewriter: Typewriter) -> Self {
        let subscription = store.subscribe();
        let initial = store.read(|state| target_of(state, &message_id)).unwrap_or_default();
        let (tx, snapshots) = watch::channel(ViewSnapshot::default());

        let task = tokio::spawn(drive(
            subscription,
            message_id.clone(),
            initial,
            typewriter,
            tx,
        ));

        Self {
            message_id,
            snapshots,
            _task: AbortOnDrop(task),
        }
    }

    /// Message this view follows
    #[must_use]
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Latest snapshot
    #[must_use]
    pub fn snapshot(&self) -> ViewSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Wait for the next snapshot
    ///
    /// Returns `None` once the view stopped (store dropped).
    pub async fn changed(&mut self) -> Option<ViewSnapshot> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }

    /// Stop the view and its timers
    pub fn detach(self) {}
}

fn target_of(state: &ChatState, id: &MessageId) -> Option<RevealTarget> {
    state.message(id).map(|message| RevealTarget {
        text: message.text().to_string(),
        streaming: message.is_streaming,
    })
}

fn sync_target(target_tx: &watch::Sender<RevealTarget>, message: Option<&Message>) {
    let Some(message) = message else {
        return;
    };
    target_tx.send_if_modified(|target| {
        let changed = target.text != message.text() || target.streaming != message.is_streaming;
        if changed {
            target.text = message.text().to_string();
            target.streaming = message.is_streaming;
        }
        changed
    });
}

async fn drive(
    mut subscription: Subscription,
    message_id: MessageId,
    initial: RevealTarget,
    typewriter: Typewriter,
    out: watch::Sender<ViewSnapshot>,
) {
    let (target_tx, target_rx) = watch::channel(initial);
    let (reveal_tx, mut reveal_rx) = watch::channel(RevealSnapshot::default());
    let _reveal = AbortOnDrop(tokio::spawn(run_reveal(typewriter, target_rx, reveal_tx)));

    let mut interleaver = Interleaver::new();
    let mut message: Option<Message> = subscription.latest().message(&message_id).cloned();
    sync_target(&target_tx, message.as_ref());

    loop {
        tokio::select! {
            alive = subscription.changed() => {
                if !alive {
                    tracing::debug!(message_id = %message_id, "Store dropped, view stopping");
                    return;
                }
                message = subscription.latest().message(&message_id).cloned();
                sync_target(&target_tx, message.as_ref());
            }
            changed = reveal_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let Some(message) = &message else {
            continue;
        };
        let reveal = reveal_rx.borrow_and_update().clone();
        let finished = !message.is_streaming && reveal.phase == RevealPhase::Finished;
        let fragments = interleaver.layout(message.text(), reveal.revealed, &message.tool_calls, finished);

        out.send_if_modified(|snapshot| {
            let next = ViewSnapshot {
                fragments,
                phase: reveal.phase,
                finished,
            };
            if *snapshot == next {
                return false;
            }
            *snapshot = next;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ErrorPayload, Event, EventPayload, RunFinishedPayload, RunStartedPayload, TextChunkPayload,
    };
    use std::time::Duration;

    fn fast() -> RevealConfig {
        RevealConfig {
            char_delay_min: Duration::from_millis(5),
            char_delay_max: Duration::from_millis(5),
            startup_delay_min: Duration::from_millis(20),
            startup_delay_max: Duration::from_millis(20),
            settle_window: Duration::from_millis(50),
        }
    }

    fn chunk(text: &str) -> Event {
        Event::new(
            "r1",
            EventPayload::TextChunk(TextChunkPayload {
                text: text.to_string(),
                role: Default::default(),
                visitor_mode: None,
            }),
        )
    }

    async fn wait_finished(view: &mut MessageView) -> ViewSnapshot {
        loop {
            let snapshot = view.changed().await.unwrap();
            if snapshot.finished {
                return snapshot;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_message_is_shown_at_once() {
        let store = Store::default();
        let mut id = None;
        store.update(|state| id = Some(state.push_human("hi there", 1)));
        let mut view = MessageView::attach(&store, id.unwrap(), fast());

        let snapshot = wait_finished(&mut view).await;
        assert_eq!(snapshot.text(), "hi there");
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_message_reveals_and_finishes() {
        let store = Store::default();
        store.dispatch(&Event::new("r1", EventPayload::RunStarted(RunStartedPayload::default())), 1);
        store.dispatch(&chunk("Hel"), 2);
        let id = store.read(|s| s.messages[0].id.clone());

        let mut view = MessageView::with_typewriter(&store, id, Typewriter::seeded(fast(), 9));
        store.dispatch(&chunk("lo"), 3);
        store.dispatch(&Event::new("r1", EventPayload::RunFinished(RunFinishedPayload::default())), 4);

        let snapshot = wait_finished(&mut view).await;
        assert_eq!(snapshot.text(), "Hello");
        assert_eq!(snapshot.phase, RevealPhase::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_run_message_finishes() {
        let store = Store::default();
        store.dispatch(&Event::new("r1", EventPayload::RunStarted(RunStartedPayload::default())), 1);
        store.dispatch(&chunk("partial"), 2);
        let id = store.read(|s| s.messages[0].id.clone());

        let mut view = MessageView::with_typewriter(&store, id, Typewriter::seeded(fast(), 3));
        store.dispatch(
            &Event::new(
                "r1",
                EventPayload::Error(ErrorPayload {
                    message: "backend crashed".to_string(),
                    code: None,
                }),
            ),
            3,
        );

        let snapshot = tokio::time::timeout(Duration::from_secs(60), wait_finished(&mut view))
            .await
            .expect("view never finished after the error");
        assert_eq!(snapshot.text(), "partial");
        assert_eq!(snapshot.phase, RevealPhase::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_stops_updates() {
        let store = Store::default();
        store.dispatch(&chunk("abc"), 1);
        let id = store.read(|s| s.messages[0].id.clone());

        let view = MessageView::attach(&store, id, fast());
        assert_eq!(store.subscriber_count(), 1);
        view.detach();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.subscriber_count(), 0);
    }
}
