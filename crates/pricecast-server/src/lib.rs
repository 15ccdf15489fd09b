//! HTTP and `WebSocket` surface for the Pricecast live feed.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoint** (`/ws`) where each connection becomes a
//!   subscriber: it is replayed the recent history, then receives every
//!   live sample as `{"price": .., "timestamp": "HH:MM:SS"}`
//! - **Reset endpoint** (`POST /reset`) that clears history and restarts
//!   the generator, with a permissive CORS preflight
//! - **REST endpoints** for status, history, and summary statistics
//!
//! # Architecture
//!
//! Handlers never touch subscriber membership directly. Sessions talk to
//! the [`CoordinatorHandle`] through join/leave events; the control
//! handlers use the coordinator's history lock and the generator's control
//! channel.
//!
//! [`CoordinatorHandle`]: pricecast_core::CoordinatorHandle

pub mod control;
pub mod error;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::ServerError;
pub use startup::spawn_server;
pub use state::AppState;
