//! Server startup helper for the engine binary.
//!
//! Provides [`spawn_server`] which binds eagerly, so address problems are
//! reported to the caller, then runs the HTTP + `WebSocket` server on a
//! background Tokio task.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pricecast_server::startup::spawn_server;
//!
//! let handle = spawn_server(&config.server, state, shutdown_signal()).await?;
//! handle.await??;
//! ```

use std::future::Future;
use std::sync::Arc;

use pricecast_core::config::ServerConfig;
use tokio::task::JoinHandle;

use crate::server::{self, ServerError};
use crate::state::AppState;

/// Bind the listener and spawn the server on a background task.
///
/// The task resolves when `shutdown` fires and in-flight requests have
/// finished, or when serving fails.
///
/// # Errors
///
/// Returns [`ServerError::Bind`] if the listener cannot be bound. This is
/// detected before the background task is spawned.
pub async fn spawn_server<F>(
    config: &ServerConfig,
    state: Arc<AppState>,
    shutdown: F,
) -> Result<JoinHandle<Result<(), ServerError>>, ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = server::bind(config).await?;
    let handle = tokio::spawn(server::serve(listener, state, shutdown));

    tracing::info!(port = config.port, "Server spawned on background task");

    Ok(handle)
}
