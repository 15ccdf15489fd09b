//! Shared application state for the HTTP surface.
//!
//! [`AppState`] holds the coordinator handle every session joins through,
//! the generator's control handle used by `POST /reset`, and the few
//! configuration values handlers report or need.

use chrono::{DateTime, Utc};
use pricecast_core::CoordinatorHandle;
use pricecast_core::config::PricecastConfig;
use pricecast_core::runner::GeneratorControl;
use tracing::info;

use crate::error::ApiError;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`](std::sync::Arc) and injected via Axum's `State`
/// extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Front door to the broadcast coordinator.
    pub coordinator: CoordinatorHandle,
    /// Control handle for the generator's timer task.
    pub generator: GeneratorControl,
    /// Outbound queue length given to each new subscriber.
    pub subscriber_buffer: usize,
    /// Generation cadence in milliseconds.
    pub tick_interval_ms: u64,
    /// When the feed started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create application state around running coordinator and generator
    /// tasks.
    pub fn new(
        coordinator: CoordinatorHandle,
        generator: GeneratorControl,
        config: &PricecastConfig,
    ) -> Self {
        Self {
            coordinator,
            generator,
            subscriber_buffer: config.broadcast.subscriber_buffer,
            tick_interval_ms: config.generator.tick_interval_ms,
            started_at: Utc::now(),
        }
    }

    /// Restore the feed to its starting point: generator back to its
    /// initial value and trend, history cleared, counters zeroed.
    /// Connected subscribers stay connected.
    ///
    /// The generator task applies both halves between ticks, so the first
    /// sample of the new run is never cleared away.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unavailable`] if the generator task has stopped.
    pub async fn reset_feed(&self) -> Result<(), ApiError> {
        self.generator.reset().await?;
        info!("Feed reset via control API");
        Ok(())
    }
}
