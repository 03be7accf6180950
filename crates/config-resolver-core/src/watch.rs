//! Change Multiplexer
//!
//! Merges the watch futures of every touched source into a single
//! notification. The first change (or watch failure) from any source fires
//! exactly one [`ChangeEvent`]; after that the remaining watches are cancelled
//! and the subscription is stopped. A caller that wants to keep watching
//! resolves the tree again and takes the new subscription.
//!
//! Each source with at least one watch gets one tokio task, racing all the
//! watches retained from its retrievals.

use futures::future::select_all;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::providers::{ConfigSourceError, SourceResult, WatchFuture};

/// Lifecycle of a change subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Created, no watch started yet
    Idle,
    /// At least one watch is pending
    Watching,
    /// A watch completed; the event is being delivered
    ///
    /// Transient: the state moves on to `Stopped` once the event is handed
    /// to the receiver.
    Fired,
    /// No further event will be delivered
    Stopped,
}

/// A watch that completed with an error
#[derive(Error, Debug)]
#[error("watch on config source {source_name:?} failed: {error}")]
pub struct WatchError {
    pub source_name: String,
    #[source]
    pub error: ConfigSourceError,
}

/// Notification that the resolved configuration may be stale
#[derive(Debug)]
pub struct ChangeEvent {
    /// Set when the watch failed instead of observing a change
    pub error: Option<WatchError>,
}

impl ChangeEvent {
    /// Whether the event reports a watch failure
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

struct Slot {
    state: WatchState,
    sender: Option<oneshot::Sender<ChangeEvent>>,
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Receives at most one [`ChangeEvent`] for a resolution pass
///
/// Dropping the subscription does not stop the watches; closing the pass
/// does, or call [`ChangeSubscription::stop`].
pub struct ChangeSubscription {
    slot: SharedSlot,
    receiver: oneshot::Receiver<ChangeEvent>,
    cancel: CancellationToken,
}

impl fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("state", &self.state())
            .finish()
    }
}

impl ChangeSubscription {
    fn with_state(state: WatchState, cancel: CancellationToken) -> (Self, SharedSlot) {
        let (sender, receiver) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Slot {
            state,
            sender: Some(sender),
        }));
        let subscription = Self {
            slot: Arc::clone(&slot),
            receiver,
            cancel,
        };
        (subscription, slot)
    }

    /// A subscription that never delivers an event
    pub fn stopped() -> Self {
        let (subscription, slot) = Self::with_state(WatchState::Stopped, CancellationToken::new());
        lock(&slot).sender = None;
        subscription
    }

    /// Start one watch task per source
    ///
    /// `cancel` stops every task without an event. Sources without watches
    /// are skipped; when none remain the subscription is stopped at once.
    pub(crate) fn start(sources: Vec<(String, Vec<WatchFuture>)>, cancel: CancellationToken) -> Self {
        let sources: Vec<_> = sources
            .into_iter()
            .filter(|(_, watches)| !watches.is_empty())
            .collect();
        if sources.is_empty() {
            return Self::stopped();
        }

        // Firing cancels the siblings only; the parent token belongs to the pass.
        let cancel = cancel.child_token();
        let (subscription, slot) = Self::with_state(WatchState::Idle, cancel.clone());

        tracing::debug!(sources = sources.len(), "Watching config sources for changes");
        lock(&slot).state = WatchState::Watching;

        for (name, watches) in sources {
            let slot = Arc::clone(&slot);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => stop(&slot),
                    (result, _, _) = select_all(watches) => fire(&slot, &cancel, name, result),
                }
            });
        }

        subscription
    }

    /// Current state
    pub fn state(&self) -> WatchState {
        lock(&self.slot).state
    }

    /// Wait for the change event
    ///
    /// Returns `None` when the subscription stopped without a change.
    pub async fn recv(self) -> Option<ChangeEvent> {
        self.receiver.await.ok()
    }

    /// Deliver the change event to `callback` on a spawned task
    ///
    /// The callback is not invoked if the subscription stops without a
    /// change.
    pub fn on_change<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(ChangeEvent) + Send + 'static,
    {
        tokio::spawn(async move {
            if let Some(event) = self.recv().await {
                callback(event);
            }
        })
    }

    /// Stop watching without delivering an event
    pub fn stop(&self) {
        stop(&self.slot);
        self.cancel.cancel();
    }
}

fn stop(slot: &SharedSlot) {
    let mut slot = lock(slot);
    if slot.state == WatchState::Watching || slot.state == WatchState::Idle {
        slot.state = WatchState::Stopped;
        slot.sender = None;
    }
}

fn fire(shared: &SharedSlot, cancel: &CancellationToken, source_name: String, result: SourceResult<()>) {
    let sender = {
        let mut slot = lock(shared);
        if slot.state != WatchState::Watching {
            return;
        }
        slot.state = WatchState::Fired;
        slot.sender.take()
    };
    cancel.cancel();

    let error = match result {
        Ok(()) => {
            tracing::info!(source = %source_name, "Config source reported a change");
            None
        }
        Err(error) => {
            tracing::warn!(source = %source_name, error = %error, "Config source watch failed");
            Some(WatchError { source_name, error })
        }
    };

    if let Some(sender) = sender {
        // The receiver may be gone; the event is simply dropped then.
        let _ = sender.send(ChangeEvent { error });
    }
    lock(shared).state = WatchState::Stopped;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ConfigSource, StaticSource};
    use futures::future::{pending, FutureExt};
    use std::time::Duration;

    async fn watch_of(source: &StaticSource, selector: &str) -> WatchFuture {
        let (_, watch, _) = source.retrieve(selector, None).await.unwrap().into_parts();
        watch.unwrap()
    }

    fn never() -> WatchFuture {
        pending::<SourceResult<()>>().boxed()
    }

    #[tokio::test]
    async fn test_single_change() {
        let source = StaticSource::new().with_value("key", "v1");
        let watch = watch_of(&source, "key").await;

        let subscription =
            ChangeSubscription::start(vec![("static".into(), vec![watch])], CancellationToken::new());
        assert_eq!(subscription.state(), WatchState::Watching);

        source.set("key", "v2");
        let event = subscription.recv().await.unwrap();
        assert!(event.error.is_none());
    }

    #[tokio::test]
    async fn test_coalesces_changes_across_sources() {
        let first = StaticSource::new().with_value("a", 1);
        let second = StaticSource::new().with_value("b", 2);
        let watches = vec![
            ("first".to_string(), vec![watch_of(&first, "a").await]),
            ("second".to_string(), vec![watch_of(&second, "b").await, never()]),
        ];

        let subscription = ChangeSubscription::start(watches, CancellationToken::new());
        let slot = Arc::clone(&subscription.slot);

        first.set("a", 10);
        second.set("b", 20);

        let event = tokio::time::timeout(Duration::from_secs(5), subscription.recv())
            .await
            .unwrap();
        assert!(event.is_some());
        assert_eq!(lock(&slot).state, WatchState::Stopped);
    }

    #[tokio::test]
    async fn test_watch_error_is_reported() {
        let failing = async { Err(ConfigSourceError::Unavailable("connection lost".into())) }.boxed();
        let subscription = ChangeSubscription::start(
            vec![("remote".into(), vec![never(), failing])],
            CancellationToken::new(),
        );

        let event = subscription.recv().await.unwrap();
        let error = event.error.unwrap();
        assert_eq!(error.source_name, "remote");
        assert!(matches!(error.error, ConfigSourceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_cancellation_before_change() {
        let cancel = CancellationToken::new();
        let subscription = ChangeSubscription::start(vec![("static".into(), vec![never()])], cancel.clone());

        cancel.cancel();
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_wins_over_ready_watch() {
        let cancel = CancellationToken::new();
        let ready = async { Ok(()) }.boxed();
        let subscription = ChangeSubscription::start(vec![("static".into(), vec![ready])], cancel.clone());

        // The watch task has not been polled yet; both branches are ready.
        cancel.cancel();
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_fired_settles_to_stopped() {
        let ready = async { Ok(()) }.boxed();
        let subscription =
            ChangeSubscription::start(vec![("static".into(), vec![ready])], CancellationToken::new());
        let slot = Arc::clone(&subscription.slot);

        assert!(subscription.recv().await.is_some());
        tokio::task::yield_now().await;
        assert_eq!(lock(&slot).state, WatchState::Stopped);
    }

    #[tokio::test]
    async fn test_stop() {
        let subscription =
            ChangeSubscription::start(vec![("static".into(), vec![never()])], CancellationToken::new());
        subscription.stop();
        assert_eq!(subscription.state(), WatchState::Stopped);
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_no_watches_is_stopped() {
        let subscription =
            ChangeSubscription::start(vec![("file".into(), Vec::new())], CancellationToken::new());
        assert_eq!(subscription.state(), WatchState::Stopped);
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_firing_leaves_parent_token_alone() {
        let parent = CancellationToken::new();
        let ready = async { Ok(()) }.boxed();
        let subscription = ChangeSubscription::start(vec![("static".into(), vec![ready])], parent.clone());

        assert!(subscription.recv().await.is_some());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_on_change_callback() {
        let source = StaticSource::new().with_value("key", "v1");
        let watch = watch_of(&source, "key").await;
        let subscription =
            ChangeSubscription::start(vec![("static".into(), vec![watch])], CancellationToken::new());

        let (tx, rx) = oneshot::channel();
        let handle = subscription.on_change(move |event| {
            let _ = tx.send(event.is_error());
        });

        source.set("key", "v2");
        assert!(!rx.await.unwrap());
        handle.await.unwrap();
    }
}
