//! Broadcast coordinator: the single authority over subscriber membership,
//! history, and fan-out.
//!
//! # Architecture
//!
//! [`Coordinator`] is an event loop driven by a bounded Tokio channel.
//! Join, Leave, and Publish arrive as discrete events and are applied one
//! at a time, so the subscriber map is only ever touched by the loop.
//! [`CoordinatorHandle`] is the cloneable front door used by the generator,
//! subscriber sessions, and the control API.
//!
//! History is the one resource with two writers: the loop appends on
//! Publish, and [`CoordinatorHandle::reset`] clears it directly from the
//! administrative path without queuing behind pending events. Both paths
//! take the same [`SharedHistory`] lock, so a Reset racing a Publish leaves
//! history either with the new sample appended after the clear or without
//! it, never torn.
//!
//! # Backpressure
//!
//! The event queue is bounded (`broadcast.event_buffer`). When the loop
//! falls behind, [`CoordinatorHandle::publish`] waits for capacity, which
//! stalls the generator's timer task instead of dropping samples.
//!
//! # Deferred removal
//!
//! A subscriber whose delivery fails during fan-out is marked inactive and
//! its Leave is sent from a spawned task. The loop never awaits capacity
//! on its own queue, which would deadlock once the queue is full.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::BroadcastConfig;
use crate::generator::Sample;
use crate::history::{History, HistorySummary};
use crate::subscriber::{Subscriber, SubscriberId};

/// History shared between the event loop and the administrative path.
pub type SharedHistory = Arc<Mutex<History>>;

/// Errors returned by [`CoordinatorHandle`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    /// The event loop has stopped and accepts no more events.
    #[error("coordinator event loop has stopped")]
    Closed,
}

impl<T> From<mpsc::error::SendError<T>> for CoordinatorError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::Closed
    }
}

impl From<oneshot::error::RecvError> for CoordinatorError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::Closed
    }
}

/// Events applied by the serialized loop.
#[derive(Debug)]
enum Event {
    Join(Subscriber),
    Leave(SubscriberId),
    Publish(Sample),
    Members(oneshot::Sender<Vec<SubscriberId>>),
    Flush(oneshot::Sender<()>),
}

/// Counters readable without a round trip through the loop.
#[derive(Debug, Default)]
struct Counters {
    subscribers: AtomicUsize,
    points_published: AtomicU64,
}

/// Create a coordinator loop and the handle that feeds it.
///
/// The loop does nothing until [`Coordinator::run`] is awaited, typically
/// on its own task.
pub fn channel(config: &BroadcastConfig) -> (Coordinator, CoordinatorHandle) {
    let (tx, rx) = mpsc::channel(config.event_buffer.max(1));
    let history: SharedHistory = Arc::new(Mutex::new(History::with_capacity(
        config.history_capacity,
    )));
    let counters = Arc::new(Counters::default());

    let coordinator = Coordinator {
        events: rx,
        loopback: tx.downgrade(),
        subscribers: HashMap::new(),
        history: Arc::clone(&history),
        counters: Arc::clone(&counters),
    };
    let handle = CoordinatorHandle {
        tx,
        history,
        counters,
        history_capacity: config.history_capacity.max(1),
    };
    (coordinator, handle)
}

/// The serialized event loop.
#[derive(Debug)]
pub struct Coordinator {
    events: mpsc::Receiver<Event>,
    loopback: mpsc::WeakSender<Event>,
    subscribers: HashMap<SubscriberId, Subscriber>,
    history: SharedHistory,
    counters: Arc<Counters>,
}

impl Coordinator {
    /// Apply events until every [`CoordinatorHandle`] has been dropped, then
    /// close all remaining subscribers.
    pub async fn run(mut self) {
        info!("Coordinator started");

        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
        }

        let remaining = self.subscribers.len();
        for (_, subscriber) in self.subscribers.drain() {
            subscriber.close();
        }
        self.counters.subscribers.store(0, Ordering::Release);

        info!(closed_subscribers = remaining, "Coordinator stopped");
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Join(subscriber) => self.join(subscriber).await,
            Event::Leave(id) => self.leave(id),
            Event::Publish(sample) => self.publish(sample).await,
            Event::Members(reply) => {
                let mut ids: Vec<SubscriberId> = self.subscribers.keys().copied().collect();
                ids.sort_unstable();
                // The caller may have stopped waiting.
                let _ = reply.send(ids);
            }
            Event::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    /// Replay history to a new subscriber, then admit it. A subscriber that
    /// cannot take the full replay is closed instead of partially joined.
    async fn join(&mut self, mut subscriber: Subscriber) {
        let id = subscriber.id();
        if self.subscribers.contains_key(&id) {
            warn!(subscriber = %id, "Duplicate join rejected");
            subscriber.close();
            return;
        }

        let replay = {
            let history = self.history.lock().await;
            history
                .iter()
                .try_for_each(|sample| subscriber.deliver(sample))
                .map(|()| history.len())
        };

        match replay {
            Ok(replayed) => {
                self.subscribers.insert(id, subscriber);
                self.sync_subscriber_count();
                info!(
                    subscriber = %id,
                    replayed,
                    subscribers = self.subscribers.len(),
                    "Subscriber joined"
                );
            }
            Err(e) => {
                warn!(subscriber = %id, error = %e, "History replay failed, subscriber dropped");
                subscriber.close();
            }
        }
    }

    fn leave(&mut self, id: SubscriberId) {
        match self.subscribers.remove(&id) {
            Some(subscriber) => {
                subscriber.close();
                self.sync_subscriber_count();
                info!(
                    subscriber = %id,
                    subscribers = self.subscribers.len(),
                    "Subscriber left"
                );
            }
            None => debug!(subscriber = %id, "Leave for non-member ignored"),
        }
    }

    async fn publish(&mut self, sample: Sample) {
        {
            let mut history = self.history.lock().await;
            history.push(sample);
            self.counters.points_published.fetch_add(1, Ordering::AcqRel);
        }

        let mut failed = Vec::new();
        for subscriber in self.subscribers.values_mut().filter(|s| s.is_active()) {
            if let Err(e) = subscriber.deliver(&sample) {
                warn!(subscriber = %subscriber.id(), error = %e, "Delivery failed, scheduling removal");
                failed.push(subscriber.id());
            }
        }

        for id in failed {
            self.schedule_leave(id);
        }
    }

    /// Queue a Leave from outside the loop.
    fn schedule_leave(&self, id: SubscriberId) {
        let Some(tx) = self.loopback.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if tx.send(Event::Leave(id)).await.is_err() {
                debug!(subscriber = %id, "Coordinator stopped before deferred leave");
            }
        });
    }

    fn sync_subscriber_count(&self) {
        self.counters
            .subscribers
            .store(self.subscribers.len(), Ordering::Release);
    }
}

/// Cloneable handle for submitting events to the [`Coordinator`] and for
/// the administrative history path.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Event>,
    history: SharedHistory,
    counters: Arc<Counters>,
    history_capacity: usize,
}

impl CoordinatorHandle {
    /// Submit a subscriber for admission. It receives the current history
    /// before any sample published after this call is applied.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the loop has stopped.
    pub async fn join(&self, subscriber: Subscriber) -> Result<(), CoordinatorError> {
        self.send(Event::Join(subscriber)).await
    }

    /// Remove a subscriber and close its channel. A no-op for non-members.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the loop has stopped.
    pub async fn leave(&self, id: SubscriberId) -> Result<(), CoordinatorError> {
        self.send(Event::Leave(id)).await
    }

    /// Append a sample to history and fan it out. Waits for queue capacity
    /// when the loop is behind.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the loop has stopped.
    pub async fn publish(&self, sample: Sample) -> Result<(), CoordinatorError> {
        self.send(Event::Publish(sample)).await
    }

    /// Clear history and the published-points counter. Subscribers are
    /// untouched. Runs directly under the history lock, not through the
    /// event queue.
    pub async fn reset(&self) {
        let cleared = {
            let mut history = self.history.lock().await;
            let cleared = history.len();
            history.clear();
            self.counters.points_published.store(0, Ordering::Release);
            cleared
        };
        info!(cleared, "History reset");
    }

    /// Current members, sorted. Answered by the loop, so the result
    /// reflects every event this handle submitted earlier.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the loop has stopped.
    pub async fn subscriber_ids(&self) -> Result<Vec<SubscriberId>, CoordinatorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Event::Members(reply)).await?;
        Ok(rx.await?)
    }

    /// Wait until the loop has applied every event this handle submitted
    /// earlier.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Closed`] if the loop has stopped.
    pub async fn flush(&self) -> Result<(), CoordinatorError> {
        let (done, rx) = oneshot::channel();
        self.send(Event::Flush(done)).await?;
        Ok(rx.await?)
    }

    /// Number of members as of the last membership change.
    pub fn subscriber_count(&self) -> usize {
        self.counters.subscribers.load(Ordering::Acquire)
    }

    /// Samples published since start or the last reset.
    pub fn points_published(&self) -> u64 {
        self.counters.points_published.load(Ordering::Acquire)
    }

    /// Maximum number of samples kept for replay.
    pub const fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Copy of the current history, oldest first.
    pub async fn history_snapshot(&self) -> Vec<Sample> {
        self.history.lock().await.to_vec()
    }

    /// Summary statistics over the current history.
    pub async fn history_summary(&self) -> HistorySummary {
        self.history.lock().await.summary()
    }

    /// Whether the loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, event: Event) -> Result<(), CoordinatorError> {
        self.tx.send(event).await?;
        Ok(())
    }
}
