//! Control and read-only REST handlers.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/reset` | Clear history, restart the generator, zero counters |
//! | `OPTIONS` | `/reset` | CORS preflight |
//! | `GET` | `/api/status` | Subscriber count, history fill, cadence |
//! | `GET` | `/api/history` | Current history, oldest first |
//! | `GET` | `/api/stats` | Min / max / average / latest over history |

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderName, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use pricecast_core::{HistorySummary, Sample};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

/// CORS headers carried by every `/reset` response, errors included.
///
/// `/reset` sits outside the router's CORS layer.
fn reset_cors() -> [(HeaderName, &'static str); 3] {
    [
        (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        (header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
        (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
    ]
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Acknowledgment body for control requests.
#[derive(Debug, Serialize)]
struct ControlResponse {
    /// Always `"ok"` on success.
    status: &'static str,
    /// Human-readable message.
    message: String,
}

/// Body of `GET /api/status`.
#[derive(Debug, Serialize)]
struct StatusResponse {
    subscribers: usize,
    history_len: usize,
    history_capacity: usize,
    points_published: u64,
    tick_interval_ms: u64,
    started_at: String,
}

/// Body of `GET /api/history`.
#[derive(Debug, Serialize)]
struct HistoryResponse {
    count: usize,
    samples: Vec<Sample>,
}

// ---------------------------------------------------------------------------
// POST /reset
// ---------------------------------------------------------------------------

/// Reset the feed: generator state, history, and counters.
///
/// Subscribers stay connected and keep receiving the new sequence.
pub async fn reset(State(state): State<Arc<AppState>>) -> Response {
    match state.reset_feed().await {
        Ok(()) => (
            reset_cors(),
            Json(ControlResponse {
                status: "ok",
                message: "History and generator state reset".to_owned(),
            }),
        )
            .into_response(),
        Err(e) => (reset_cors(), e).into_response(),
    }
}

// ---------------------------------------------------------------------------
// OPTIONS /reset
// ---------------------------------------------------------------------------

/// Answer a cross-origin preflight for the reset endpoint.
pub async fn reset_preflight() -> impl IntoResponse {
    (StatusCode::OK, reset_cors())
}

/// Reject any other method on a control route.
pub async fn method_not_allowed(method: Method) -> impl IntoResponse {
    (
        reset_cors(),
        ApiError::MethodNotAllowed(format!("{method} is not supported; use POST")),
    )
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Report subscriber count, history fill, and cadence.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let coordinator = &state.coordinator;
    let history_len = coordinator.history_summary().await.count;

    Json(StatusResponse {
        subscribers: coordinator.subscriber_count(),
        history_len,
        history_capacity: coordinator.history_capacity(),
        points_published: coordinator.points_published(),
        tick_interval_ms: state.tick_interval_ms,
        started_at: state.started_at.to_rfc3339(),
    })
}

// ---------------------------------------------------------------------------
// GET /api/history
// ---------------------------------------------------------------------------

/// Return the current history in wire format, oldest first.
pub async fn history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let samples = state.coordinator.history_snapshot().await;
    Json(HistoryResponse {
        count: samples.len(),
        samples,
    })
}

// ---------------------------------------------------------------------------
// GET /api/stats
// ---------------------------------------------------------------------------

/// Return summary statistics over the current history.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<HistorySummary> {
    Json(state.coordinator.history_summary().await)
}
