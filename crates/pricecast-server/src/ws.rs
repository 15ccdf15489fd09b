//! `WebSocket` subscriber session.
//!
//! Clients connect to `GET /ws`. Each connection becomes one subscriber:
//! it joins the coordinator, is replayed the current history, then
//! receives every live sample as a JSON text frame.
//!
//! The session reads from the peer only to notice that it went away.
//! Inbound data frames are ignored; a close frame, end of stream, or read
//! error ends the session and issues a Leave. A failed write does the
//! same. If the coordinator drops the subscriber first (its queue filled
//! up), the outbound queue ends and so does the session.

use std::fmt::Display;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use pricecast_core::{ChannelSink, CoordinatorHandle, Subscriber, SubscriberId};
use tracing::{debug, warn};

use crate::state::AppState;

/// Why a subscriber session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a close frame or the stream ended.
    PeerClosed,
    /// Reading from the peer failed.
    ReadFailed,
    /// Writing to the peer failed.
    WriteFailed,
    /// The coordinator closed this subscriber's queue.
    Removed,
    /// The coordinator was not accepting joins.
    CoordinatorClosed,
}

/// Upgrade an HTTP request to a `WebSocket` connection and run a
/// subscriber session on it.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_subscribe(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_failed_upgrade(|e| warn!(error = %e, "WebSocket upgrade failed"))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (outgoing, incoming) = socket.split();
    let end = run_session(
        state.coordinator.clone(),
        incoming,
        outgoing,
        state.subscriber_buffer,
    )
    .await;
    debug!(?end, "WebSocket session finished");
}

/// Run one subscriber session over a split duplex channel.
///
/// Joins the coordinator with a fresh [`SubscriberId`], forwards queued
/// samples to `outgoing` as JSON text frames, and watches `incoming` for
/// the peer going away. Always issues a Leave before returning; the
/// coordinator ignores it if the subscriber was already removed.
pub async fn run_session<I, E, O>(
    coordinator: CoordinatorHandle,
    mut incoming: I,
    mut outgoing: O,
    buffer: usize,
) -> SessionEnd
where
    I: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
    O: Sink<Message> + Unpin,
    O::Error: Display,
{
    let id = SubscriberId::new();
    let (sink, mut queue) = ChannelSink::new(buffer);

    if coordinator.join(Subscriber::new(id, sink)).await.is_err() {
        warn!(subscriber = %id, "Coordinator stopped, refusing subscriber");
        // Best effort; the peer may already be gone.
        let _ = outgoing.close().await;
        return SessionEnd::CoordinatorClosed;
    }
    debug!(subscriber = %id, "WebSocket subscriber connected");

    let end;
    loop {
        tokio::select! {
            queued = queue.recv() => {
                let Some(sample) = queued else {
                    end = SessionEnd::Removed;
                    break;
                };
                let json = match serde_json::to_string(&sample) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize sample: {e}");
                        continue;
                    }
                };
                if let Err(e) = outgoing.send(Message::Text(json.into())).await {
                    debug!(subscriber = %id, "WebSocket send failed: {e}");
                    end = SessionEnd::WriteFailed;
                    break;
                }
            }
            inbound = incoming.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        end = SessionEnd::PeerClosed;
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = outgoing.send(Message::Pong(data)).await {
                            debug!(subscriber = %id, "WebSocket pong failed: {e}");
                            end = SessionEnd::WriteFailed;
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(subscriber = %id, "WebSocket read error: {e}");
                        end = SessionEnd::ReadFailed;
                        break;
                    }
                    Some(Ok(_)) => {
                        // Inbound data carries no meaning for a subscriber.
                    }
                }
            }
        }
    }

    if coordinator.leave(id).await.is_err() {
        debug!(subscriber = %id, "Coordinator stopped before leave");
    }
    let _ = outgoing.close().await;
    debug!(subscriber = %id, ?end, "WebSocket subscriber disconnected");
    end
}
