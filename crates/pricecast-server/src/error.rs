//! Error types for the HTTP surface.
//!
//! [`ApiError`] unifies handler failure modes into a single enum that
//! converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. None of
//! these failures touch coordinator state.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pricecast_core::runner::ControlError;

/// Errors that can occur in the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The route exists but does not accept this method.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// A background task the request depends on has stopped.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<ControlError> for ApiError {
    fn from(e: ControlError) -> Self {
        Self::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::MethodNotAllowed(msg) => (StatusCode::METHOD_NOT_ALLOWED, msg.clone()),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
