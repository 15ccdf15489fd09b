//! Pricecast binary.
//!
//! Wires together the random-walk generator, the broadcast coordinator,
//! and the HTTP + `WebSocket` server, then serves until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `pricecast-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Validate configuration
//! 4. Start the coordinator loop
//! 5. Start the generator timer task
//! 6. Serve HTTP until Ctrl-C, then shut down gracefully

mod error;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pricecast_core::Generator;
use pricecast_core::config::{LogFormat, LoggingConfig, PricecastConfig};
use pricecast_core::coordinator;
use pricecast_core::runner::spawn_generator;
use pricecast_server::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

const CONFIG_PATH: &str = "pricecast-config.yaml";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the server cannot
/// bind or fails while serving.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging depends on it, so report afterwards.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("pricecast-engine starting");
    if !from_file {
        info!("Config file not found, using defaults");
    }

    // 3. Validate.
    config.validate().map_err(EngineError::from)?;
    info!(
        host = config.server.host,
        port = config.server.port,
        history_capacity = config.broadcast.history_capacity,
        subscriber_buffer = config.broadcast.subscriber_buffer,
        tick_interval_ms = config.generator.tick_interval_ms,
        seed = ?config.generator.seed,
        "Configuration loaded"
    );

    // 4. Coordinator loop.
    let (coordinator, handle) = coordinator::channel(&config.broadcast);
    let coordinator_task = tokio::spawn(coordinator.run());

    // 5. Generator timer task.
    let generator = Generator::from_config(&config.generator);
    let (control, generator_task) = spawn_generator(
        generator,
        handle.clone(),
        config.generator.tick_interval(),
    );

    // 6. HTTP + WebSocket server.
    let state = Arc::new(AppState::new(handle, control, &config));
    let server = pricecast_server::spawn_server(&config.server, state, shutdown_signal())
        .await
        .map_err(EngineError::from)?;

    let served = server.await.map_err(|e| EngineError::Task {
        message: format!("{e}"),
    })?;

    // Upgraded WebSocket sessions outlive graceful shutdown and keep their
    // coordinator handles, so the loop gets a bounded wait.
    generator_task.abort();
    if tokio::time::timeout(SHUTDOWN_GRACE, coordinator_task).await.is_err() {
        warn!("Coordinator still has open sessions, exiting anyway");
    }

    served.map_err(EngineError::from)?;
    info!("pricecast-engine stopped");
    Ok(())
}

/// Load configuration from `pricecast-config.yaml`.
///
/// Falls back to defaults (with environment overrides applied) when the
/// file does not exist. The flag reports whether the file was used.
fn load_config() -> Result<(PricecastConfig, bool), EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((PricecastConfig::from_file(config_path)?, true))
    } else {
        Ok((PricecastConfig::parse("")?, false))
    }
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over
/// the configured level.
fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    match logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

/// Resolve on Ctrl-C. If the handler cannot be installed the server keeps
/// running until the process is killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
