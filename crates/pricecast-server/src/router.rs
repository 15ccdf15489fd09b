//! Axum router construction.
//!
//! Assembles all routes (`WebSocket` + control + REST) into a single
//! [`Router`] open to cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::control;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /ws` -- `WebSocket` subscription
/// - `POST /reset` -- reset history, generator, and counters
///   (`OPTIONS` answers the preflight, other methods get `405`)
/// - `GET /api/status` -- feed status
/// - `GET /api/history` -- current history
/// - `GET /api/stats` -- history summary
///
/// CORS allows any origin, method, and header on the `WebSocket` and REST
/// routes. `/reset` sits outside the CORS layer, which would otherwise
/// answer its `OPTIONS` itself; its handlers set the CORS headers.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let feed = Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_subscribe))
        // REST API
        .route("/api/status", get(control::status))
        .route("/api/history", get(control::history))
        .route("/api/stats", get(control::stats))
        .layer(cors);

    Router::new()
        // Control
        .route(
            "/reset",
            post(control::reset)
                .options(control::reset_preflight)
                .fallback(control::method_not_allowed),
        )
        .merge(feed)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
