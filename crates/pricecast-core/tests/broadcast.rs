//! Integration tests for the broadcast coordinator.
//!
//! Each test spawns a real [`Coordinator`] loop and drives it through its
//! handle. Subscribers are observed through [`ChannelSink`] receivers or
//! through purpose-built failing sinks.
//!
//! `subscriber_ids()` round-trips through the loop, so awaiting it acts as
//! a barrier: every event the same task submitted earlier has been applied.

#![allow(
    clippy::unwrap_used,
    clippy::float_cmp,
    clippy::cast_precision_loss,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Local;
use pricecast_core::config::BroadcastConfig;
use pricecast_core::coordinator::{self, CoordinatorHandle};
use pricecast_core::{ChannelSink, DeliveryError, Sample, SampleSink, Subscriber, SubscriberId};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

fn config(history_capacity: usize) -> BroadcastConfig {
    BroadcastConfig {
        history_capacity,
        event_buffer: 256,
        subscriber_buffer: history_capacity + 64,
    }
}

fn start(history_capacity: usize) -> CoordinatorHandle {
    let (coordinator, handle) = coordinator::channel(&config(history_capacity));
    tokio::spawn(coordinator.run());
    handle
}

fn sample(sequence: u64) -> Sample {
    Sample::new(10_000.0 + sequence as f64, Local::now(), sequence)
}

async fn join_channel(
    handle: &CoordinatorHandle,
    buffer: usize,
) -> (SubscriberId, mpsc::Receiver<Sample>) {
    let id = SubscriberId::new();
    let (sink, rx) = ChannelSink::new(buffer);
    handle.join(Subscriber::new(id, sink)).await.unwrap();
    (id, rx)
}

async fn settle(handle: &CoordinatorHandle) {
    handle.subscriber_ids().await.unwrap();
}

fn drain(rx: &mut mpsc::Receiver<Sample>) -> Vec<u64> {
    let mut sequences = Vec::new();
    while let Ok(sample) = rx.try_recv() {
        sequences.push(sample.sequence);
    }
    sequences
}

async fn wait_for_count(handle: &CoordinatorHandle, expected: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if handle.subscriber_ids().await.unwrap().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

/// Sink whose every delivery fails.
struct FailingSink;

impl SampleSink for FailingSink {
    fn deliver(&mut self, _sample: &Sample) -> Result<(), DeliveryError> {
        Err(DeliveryError::Closed)
    }
}

// =========================================================================
// History
// =========================================================================

#[tokio::test]
async fn history_never_exceeds_capacity() {
    let handle = start(5);
    for i in 0..20 {
        handle.publish(sample(i)).await.unwrap();
        settle(&handle).await;
        let history = handle.history_snapshot().await;
        assert!(history.len() <= 5);
        let first = (i + 1).saturating_sub(5);
        let expected: Vec<u64> = (first..=i).collect();
        let actual: Vec<u64> = history.iter().map(|s| s.sequence).collect();
        assert_eq!(actual, expected);
    }
    assert_eq!(handle.points_published(), 20);
    assert_eq!(handle.history_capacity(), 5);
}

#[tokio::test]
async fn capacity_three_scenario_replays_then_goes_live() {
    let handle = start(3);
    // A, B, C, D
    for i in 0..4 {
        handle.publish(sample(i)).await.unwrap();
    }
    let (_id, mut rx) = join_channel(&handle, 16).await;
    // E
    handle.publish(sample(4)).await.unwrap();
    settle(&handle).await;

    assert_eq!(drain(&mut rx), vec![1, 2, 3, 4]);
    let history: Vec<u64> = handle
        .history_snapshot()
        .await
        .iter()
        .map(|s| s.sequence)
        .collect();
    assert_eq!(history, vec![2, 3, 4]);
}

#[tokio::test]
async fn late_joiner_receives_min_of_published_and_capacity() {
    for published in [0_u64, 1, 7, 10, 25] {
        let handle = start(10);
        for i in 0..published {
            handle.publish(sample(i)).await.unwrap();
        }
        let (_id, mut rx) = join_channel(&handle, 64).await;
        handle.publish(sample(published)).await.unwrap();
        settle(&handle).await;

        let received = drain(&mut rx);
        let replayed = published.min(10);
        let expected: Vec<u64> = (published - replayed..=published).collect();
        assert_eq!(received, expected, "after {published} publishes");
    }
}

#[tokio::test]
async fn history_summary_reflects_held_samples() {
    let handle = start(3);
    for i in 0..4 {
        handle.publish(sample(i)).await.unwrap();
    }
    settle(&handle).await;
    let summary = handle.history_summary().await;
    assert_eq!(summary.count, 3);
    assert_eq!(summary.min, Some(10_001.0));
    assert_eq!(summary.max, Some(10_003.0));
    assert_eq!(summary.latest, Some(10_003.0));
}

// =========================================================================
// Membership
// =========================================================================

#[tokio::test]
async fn leave_is_idempotent_and_isolated() {
    let handle = start(10);
    let (leaving, mut leaving_rx) = join_channel(&handle, 32).await;
    let (_staying, mut staying_rx) = join_channel(&handle, 32).await;

    handle.leave(leaving).await.unwrap();
    handle.leave(leaving).await.unwrap();
    handle.leave(SubscriberId::new()).await.unwrap();

    handle.publish(sample(0)).await.unwrap();
    settle(&handle).await;

    assert_eq!(handle.subscriber_ids().await.unwrap().len(), 1);
    assert_eq!(handle.subscriber_count(), 1);
    assert_eq!(drain(&mut staying_rx), vec![0]);
    // The leaver's channel was closed without receiving the sample.
    assert!(leaving_rx.recv().await.is_none());
}

#[tokio::test]
async fn failing_subscriber_is_removed_others_continue() {
    let handle = start(10);
    let (good, mut good_rx) = join_channel(&handle, 32).await;
    handle
        .join(Subscriber::new(SubscriberId::new(), FailingSink))
        .await
        .unwrap();
    settle(&handle).await;
    assert_eq!(handle.subscriber_count(), 2);

    handle.publish(sample(0)).await.unwrap();
    wait_for_count(&handle, 1).await;
    assert_eq!(handle.subscriber_ids().await.unwrap(), vec![good]);

    for i in 1..5 {
        handle.publish(sample(i)).await.unwrap();
    }
    settle(&handle).await;
    assert_eq!(drain(&mut good_rx), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn slow_subscriber_is_removed_when_queue_fills() {
    let handle = start(10);
    let (_slow, mut slow_rx) = join_channel(&handle, 2).await;
    let (fast, mut fast_rx) = join_channel(&handle, 64).await;

    for i in 0..5 {
        handle.publish(sample(i)).await.unwrap();
    }
    wait_for_count(&handle, 1).await;
    assert_eq!(handle.subscriber_ids().await.unwrap(), vec![fast]);

    settle(&handle).await;
    assert_eq!(drain(&mut fast_rx), vec![0, 1, 2, 3, 4]);
    // The slow subscriber keeps what was queued, then sees its channel close.
    assert_eq!(slow_rx.recv().await.unwrap().sequence, 0);
    assert_eq!(slow_rx.recv().await.unwrap().sequence, 1);
    assert!(slow_rx.recv().await.is_none());
}

#[tokio::test]
async fn failed_replay_drops_subscriber_instead_of_partial_join() {
    let handle = start(10);
    for i in 0..5 {
        handle.publish(sample(i)).await.unwrap();
    }
    // Room for only two of the five replayed samples.
    let (_id, mut rx) = join_channel(&handle, 2).await;
    settle(&handle).await;

    assert!(handle.subscriber_ids().await.unwrap().is_empty());
    assert_eq!(rx.recv().await.unwrap().sequence, 0);
    assert_eq!(rx.recv().await.unwrap().sequence, 1);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn duplicate_join_keeps_existing_member() {
    let handle = start(10);
    let id = SubscriberId::new();
    let (first_sink, mut first_rx) = ChannelSink::new(16);
    let (second_sink, mut second_rx) = ChannelSink::new(16);
    handle.join(Subscriber::new(id, first_sink)).await.unwrap();
    handle.join(Subscriber::new(id, second_sink)).await.unwrap();

    handle.publish(sample(0)).await.unwrap();
    settle(&handle).await;

    assert_eq!(handle.subscriber_ids().await.unwrap(), vec![id]);
    assert_eq!(drain(&mut first_rx), vec![0]);
    assert!(second_rx.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_and_leaves_keep_set_consistent() {
    let handle = start(10);
    let mut tasks = Vec::new();
    for i in 0..64_u32 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            let id = SubscriberId::new();
            // Room for the replay plus every concurrent publish.
            let (sink, rx) = ChannelSink::new(128);
            handle.join(Subscriber::new(id, sink)).await.unwrap();
            handle.publish(sample(u64::from(i))).await.unwrap();
            let stays = i % 3 != 0;
            if !stays {
                handle.leave(id).await.unwrap();
                handle.leave(id).await.unwrap();
            }
            // Barrier for this task's own events.
            handle.subscriber_ids().await.unwrap();
            (id, stays, rx)
        }));
    }

    let mut expected = BTreeSet::new();
    let mut receivers = Vec::new();
    for task in tasks {
        let (id, stays, rx) = task.await.unwrap();
        if stays {
            expected.insert(id);
        }
        receivers.push(rx);
    }

    let members = handle.subscriber_ids().await.unwrap();
    let unique: BTreeSet<SubscriberId> = members.iter().copied().collect();
    assert_eq!(unique.len(), members.len(), "duplicate membership");
    assert_eq!(unique, expected);
    assert_eq!(handle.subscriber_count(), expected.len());
}

// =========================================================================
// Reset
// =========================================================================

#[tokio::test]
async fn reset_clears_history_keeps_subscribers() {
    let handle = start(10);
    let (_id, mut rx) = join_channel(&handle, 32).await;
    for i in 0..3 {
        handle.publish(sample(i)).await.unwrap();
    }
    settle(&handle).await;

    handle.reset().await;
    assert!(handle.history_snapshot().await.is_empty());
    assert_eq!(handle.points_published(), 0);
    assert_eq!(handle.subscriber_count(), 1);

    handle.publish(sample(0)).await.unwrap();
    settle(&handle).await;
    assert_eq!(handle.history_snapshot().await.len(), 1);
    assert_eq!(handle.points_published(), 1);
    assert_eq!(drain(&mut rx), vec![0, 1, 2, 0]);

    // A new joiner sees only the post-reset history.
    let (_late, mut late_rx) = join_channel(&handle, 32).await;
    settle(&handle).await;
    assert_eq!(drain(&mut late_rx), vec![0]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reset_racing_publish_never_tears_history() {
    let handle = start(50);
    let publisher = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for i in 0..500 {
                handle.publish(sample(i)).await.unwrap();
            }
        })
    };
    let resetter = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                handle.reset().await;
                tokio::task::yield_now().await;
            }
        })
    };
    publisher.await.unwrap();
    resetter.await.unwrap();
    settle(&handle).await;

    // Whatever survived is a contiguous run ending at the last sample.
    let history: Vec<u64> = handle
        .history_snapshot()
        .await
        .iter()
        .map(|s| s.sequence)
        .collect();
    assert!(history.len() <= 50);
    for pair in history.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }
    if let Some(last) = history.last() {
        assert_eq!(*last, 499);
    }
}

// =========================================================================
// Lifecycle and backpressure
// =========================================================================

#[tokio::test]
async fn dropping_every_handle_stops_loop_and_closes_subscribers() {
    let (coordinator, handle) = coordinator::channel(&config(10));
    let task = tokio::spawn(coordinator.run());
    let (_id, mut rx) = join_channel(&handle, 16).await;
    settle(&handle).await;

    drop(handle);
    task.await.unwrap();
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn publish_waits_when_queue_is_full() {
    let (coordinator, handle) = coordinator::channel(&BroadcastConfig {
        history_capacity: 10,
        event_buffer: 1,
        subscriber_buffer: 64,
    });

    handle.publish(sample(0)).await.unwrap();
    let blocked = tokio::time::timeout(Duration::from_millis(50), handle.publish(sample(1))).await;
    assert!(blocked.is_err(), "publish should wait for queue capacity");

    // Once the loop runs, the queue drains and publishing resumes.
    tokio::spawn(coordinator.run());
    handle.publish(sample(1)).await.unwrap();
    settle(&handle).await;
    assert_eq!(handle.history_snapshot().await.len(), 2);
}

#[tokio::test]
async fn operations_fail_after_loop_stops() {
    let (coordinator, handle) = coordinator::channel(&config(10));
    drop(coordinator);
    assert!(handle.is_closed());
    assert!(handle.publish(sample(0)).await.is_err());
    assert!(handle.subscriber_ids().await.is_err());
}
