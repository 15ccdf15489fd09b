//! Error types for the Pricecast binary.
//!
//! [`EngineError`] is the top-level error type that wraps every failure
//! mode during startup and serving.

/// Top-level error for the Pricecast binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: pricecast_core::config::ConfigError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: pricecast_server::ServerError,
    },

    /// The server task panicked or was cancelled.
    #[error("server task failed: {message}")]
    Task {
        /// Description of the task failure.
        message: String,
    },
}
