//! Subscriber handles and the delivery seam between the coordinator and a
//! transport.
//!
//! A [`Subscriber`] pairs a [`SubscriberId`] with a boxed [`SampleSink`].
//! Once joined, the coordinator owns it exclusively. Closing consumes the
//! handle, so a subscriber's channel can only be closed once.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::generator::Sample;

/// Unique identifier for a subscriber, backed by a UUID v7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Create a new time-ordered identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a sample could not be handed to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// The subscriber's outbound queue is full (peer too slow).
    #[error("subscriber queue is full")]
    Full,

    /// The subscriber's receiving side is gone.
    #[error("subscriber channel is closed")]
    Closed,
}

/// Destination for samples fanned out to one subscriber.
///
/// `deliver` is called from the coordinator's event loop and must not
/// block; implementations hand the sample off and return immediately.
pub trait SampleSink: Send {
    /// Hand one sample to the subscriber.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] if the subscriber cannot accept it.
    /// The coordinator treats any error as a failed subscriber.
    fn deliver(&mut self, sample: &Sample) -> Result<(), DeliveryError>;

    /// Close the channel. Called at most once, when the subscriber leaves.
    fn close(&mut self) {}
}

/// [`SampleSink`] backed by a bounded Tokio channel.
///
/// The session task owns the receiving half and forwards samples to the
/// peer. Closing drops the sender, so the receiver drains what is queued
/// and then yields `None`.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Sample>>,
}

impl ChannelSink {
    /// Create a sink and the receiver its samples arrive on.
    ///
    /// `buffer` bounds how many samples may be queued for the peer. It
    /// must be larger than the history capacity so a full replay fits.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Sample>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx: Some(tx) }, rx)
    }
}

impl SampleSink for ChannelSink {
    fn deliver(&mut self, sample: &Sample) -> Result<(), DeliveryError> {
        let tx = self.tx.as_ref().ok_or(DeliveryError::Closed)?;
        tx.try_send(*sample).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    fn close(&mut self) {
        self.tx = None;
    }
}

/// One subscriber as held by the coordinator.
pub struct Subscriber {
    id: SubscriberId,
    sink: Box<dyn SampleSink>,
    active: bool,
}

impl Subscriber {
    /// Wrap a sink in a subscriber handle.
    pub fn new(id: SubscriberId, sink: impl SampleSink + 'static) -> Self {
        Self {
            id,
            sink: Box::new(sink),
            active: true,
        }
    }

    /// The subscriber's identifier.
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Whether the subscriber still receives fan-out. Cleared after the
    /// first failed delivery while its removal is pending.
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Deliver one sample, marking the subscriber inactive on failure.
    ///
    /// # Errors
    ///
    /// Propagates the sink's [`DeliveryError`].
    pub fn deliver(&mut self, sample: &Sample) -> Result<(), DeliveryError> {
        let result = self.sink.deliver(sample);
        if result.is_err() {
            self.active = false;
        }
        result
    }

    /// Close the subscriber's channel and release the handle.
    pub fn close(mut self) {
        self.active = false;
        self.sink.close();
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Local;

    use super::*;

    fn sample(sequence: u64) -> Sample {
        Sample::new(10_000.0, Local::now(), sequence)
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(SubscriberId::new(), SubscriberId::new());
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (mut sink, mut rx) = ChannelSink::new(4);
        sink.deliver(&sample(0)).unwrap();
        sink.deliver(&sample(1)).unwrap();
        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
    }

    #[test]
    fn channel_sink_reports_full() {
        let (mut sink, _rx) = ChannelSink::new(1);
        sink.deliver(&sample(0)).unwrap();
        assert_eq!(sink.deliver(&sample(1)), Err(DeliveryError::Full));
    }

    #[test]
    fn channel_sink_reports_closed_receiver() {
        let (mut sink, rx) = ChannelSink::new(4);
        drop(rx);
        assert_eq!(sink.deliver(&sample(0)), Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn closing_ends_the_receiver_after_draining() {
        let (sink, mut rx) = ChannelSink::new(4);
        let mut subscriber = Subscriber::new(SubscriberId::new(), sink);
        subscriber.deliver(&sample(0)).unwrap();
        subscriber.close();
        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn failed_delivery_marks_inactive() {
        let (sink, rx) = ChannelSink::new(4);
        drop(rx);
        let mut subscriber = Subscriber::new(SubscriberId::new(), sink);
        assert!(subscriber.is_active());
        assert!(subscriber.deliver(&sample(0)).is_err());
        assert!(!subscriber.is_active());
    }
}
