//! Timer task that drives the generator into the coordinator.
//!
//! [`spawn_generator`] moves a [`Generator`] onto its own Tokio task, which
//! ticks at a fixed cadence and publishes every sample. The task is the
//! generator's only owner; resets requested through [`GeneratorControl`]
//! are applied by the task itself between ticks, together with clearing
//! the coordinator's history, so no sample of the new run can be wiped.
//!
//! The first sample is produced one full interval after start. Missed
//! ticks (e.g. while `publish` waits on a full coordinator queue) are
//! skipped rather than burst.

use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::coordinator::CoordinatorHandle;
use crate::generator::Generator;

/// Errors returned by [`GeneratorControl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// The generator task has stopped.
    #[error("generator task has stopped")]
    Stopped,
}

impl<T> From<mpsc::error::SendError<T>> for ControlError {
    fn from(_: mpsc::error::SendError<T>) -> Self {
        Self::Stopped
    }
}

impl From<oneshot::error::RecvError> for ControlError {
    fn from(_: oneshot::error::RecvError) -> Self {
        Self::Stopped
    }
}

/// Commands applied by the generator task between ticks.
#[derive(Debug)]
enum GeneratorCommand {
    Reset(oneshot::Sender<()>),
}

/// Cloneable control handle for a running generator task.
#[derive(Debug, Clone)]
pub struct GeneratorControl {
    tx: mpsc::Sender<GeneratorCommand>,
}

impl GeneratorControl {
    /// Restore the generator to its initial state, clear the coordinator's
    /// history and published-points counter, and wait until the task has
    /// done both. The next sample carries sequence 0.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::Stopped`] if the task has exited.
    pub async fn reset(&self) -> Result<(), ControlError> {
        let (ack, done) = oneshot::channel();
        self.tx.send(GeneratorCommand::Reset(ack)).await?;
        done.await?;
        Ok(())
    }
}

/// Spawn the timer task.
///
/// The task publishes one sample every `interval` until the coordinator
/// stops accepting events.
pub fn spawn_generator<R>(
    generator: Generator<R>,
    coordinator: CoordinatorHandle,
    interval: Duration,
) -> (GeneratorControl, JoinHandle<()>)
where
    R: Rng + Send + 'static,
{
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(run_generator(generator, coordinator, interval, rx));
    (GeneratorControl { tx }, handle)
}

async fn run_generator<R: Rng>(
    mut generator: Generator<R>,
    coordinator: CoordinatorHandle,
    interval: Duration,
    mut commands: mpsc::Receiver<GeneratorCommand>,
) {
    let period = interval.max(Duration::from_millis(1));
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut commands_open = true;

    info!(
        interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
        "Generator started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = generator.tick();
                if coordinator.publish(sample).await.is_err() {
                    debug!("Coordinator closed, stopping generator");
                    break;
                }
            }
            command = commands.recv(), if commands_open => {
                match command {
                    Some(GeneratorCommand::Reset(ack)) => {
                        generator.reset();
                        // Samples already queued belong to the old run.
                        if coordinator.flush().await.is_err() {
                            debug!("Coordinator closed during reset, stopping generator");
                            break;
                        }
                        coordinator.reset().await;
                        info!(value = generator.state().current_value, "Generator reset");
                        // The requester may have given up waiting.
                        let _ = ack.send(());
                    }
                    None => commands_open = false,
                }
            }
        }
    }

    info!("Generator stopped");
}
