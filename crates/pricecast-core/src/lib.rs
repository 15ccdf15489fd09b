//! Sample generator, bounded history, and broadcast coordinator for the
//! Pricecast live feed.
//!
//! One synthetic source produces a [`Sample`] every tick; the
//! [`Coordinator`] appends it to a bounded [`History`] and fans it out to
//! every joined subscriber. New subscribers are replayed the full history
//! before they see any live sample.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `pricecast-config.yaml` into
//!   strongly-typed structs.
//! - [`generator`] -- Stateful random walk with trend, floor, and ceiling.
//! - [`history`] -- Bounded, ordered buffer of the most recent samples.
//! - [`subscriber`] -- Subscriber handles and the [`SampleSink`] seam.
//! - [`coordinator`] -- Serialized event loop owning membership and fan-out.
//! - [`runner`] -- Timer task that drives the generator into the coordinator.
//!
//! [`Sample`]: generator::Sample
//! [`Coordinator`]: coordinator::Coordinator
//! [`History`]: history::History
//! [`SampleSink`]: subscriber::SampleSink

pub mod config;
pub mod coordinator;
pub mod generator;
pub mod history;
pub mod runner;
pub mod subscriber;

pub use coordinator::{Coordinator, CoordinatorError, CoordinatorHandle};
pub use generator::{Generator, GeneratorState, Sample};
pub use history::{History, HistorySummary};
pub use subscriber::{ChannelSink, DeliveryError, SampleSink, Subscriber, SubscriberId};
