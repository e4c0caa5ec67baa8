//! Setlist realtime gateway — websocket lifecycle and presence protocol.
//!
//! DESIGN
//! ======
//! One connection maps to one setlist channel. On upgrade the handler
//! resolves an optional ticket to an identity, then `run_ws` enters a
//! `select!` loop:
//! - Inbound client messages → editing-status updates
//! - Events from the setlist's broadcast channel → forward to client
//! - Heartbeat pings keep `last_seen` fresh for the stale sweep
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → claim/join channel, register presence, broadcast roster,
//!    send the joiner an initial snapshot
//! 2. `{"type":"editing","isEditing":bool}` → toggle + broadcast roster
//! 3. Close (any reason) → remove presence, notify survivors, unregister the
//!    channel when the last viewer leaves
//!
//! A connection is `CONNECTING → OPEN → CLOSED`, terminal; reconnects are
//! brand-new connections with fresh ids. Errors while handling one inbound
//! message never tear the connection down, and every close-time cleanup step
//! runs regardless of the others.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use crate::event::BroadcastEvent;
use crate::services::session;
use crate::state::AppState;

const HEARTBEAT_INTERVAL_SECS: u64 = 30;

// =============================================================================
// PROTOCOL
// =============================================================================

/// The only inbound message kind the realtime core understands. Anything
/// else is logged and ignored; the connection stays open.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Editing { is_editing: bool },
}

/// Resolved identity for one connection. Guests carry no user id.
#[derive(Debug, Clone)]
struct ConnectionIdentity {
    user_id: Option<Uuid>,
    user_name: String,
    is_authenticated: bool,
}

impl ConnectionIdentity {
    fn guest() -> Self {
        Self { user_id: None, user_name: session::guest_name(), is_authenticated: false }
    }

    fn authenticated(user: session::TicketUser) -> Self {
        Self { user_id: Some(user.id), user_name: user.name, is_authenticated: true }
    }
}

// =============================================================================
// UPGRADE
// =============================================================================

/// `GET /api/setlists/{id}/live` — upgrade to the setlist's live channel.
///
/// A `ticket` query param authenticates the connection; without one the
/// viewer joins as a guest. An invalid or replayed ticket is rejected rather
/// than downgraded, so clients notice broken auth instead of silently losing
/// attribution.
pub async fn handle_ws(
    State(state): State<AppState>,
    Path(setlist_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    let identity = match params.get("ticket") {
        None => ConnectionIdentity::guest(),
        Some(ticket) => match session::consume_ws_ticket(&state.pool, ticket).await {
            Ok(Some(user)) => ConnectionIdentity::authenticated(user),
            Ok(None) => return (StatusCode::UNAUTHORIZED, "invalid or expired ticket").into_response(),
            Err(e) => {
                tracing::error!(error = %e, "ws ticket validation failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "ticket validation error").into_response();
            }
        },
    };

    ws.on_upgrade(move |socket| run_ws(socket, state, setlist_id, identity))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState, setlist_id: Uuid, identity: ConnectionIdentity) {
    let connection_id = Uuid::new_v4();
    let (mut events, initial) = open_connection(&state, setlist_id, connection_id, &identity);

    info!(
        %setlist_id,
        %connection_id,
        user = %identity.user_name,
        authenticated = identity.is_authenticated,
        "ws: viewer connected"
    );

    // The joiner's own snapshot, sent directly so it renders the roster
    // without waiting for the next broadcast.
    if send_event(&mut socket, &initial).await.is_err() {
        close_connection(&state, setlist_id, connection_id);
        return;
    }

    let mut heartbeat = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                match msg {
                    Message::Text(text) => {
                        state.presence.touch(setlist_id, connection_id);
                        handle_client_text(&state, setlist_id, connection_id, &text);
                    }
                    Message::Pong(_) => state.presence.touch(setlist_id, connection_id),
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut socket, &event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Best-effort delivery: the client missed a burst and
                        // will resync on its next fetch.
                        warn!(%setlist_id, %connection_id, skipped, "ws: receiver lagged");
                    }
                    // Channel torn down (swept); the connection is done.
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = heartbeat.tick() => {
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    close_connection(&state, setlist_id, connection_id);
    info!(%setlist_id, %connection_id, "ws: viewer disconnected");
}

// =============================================================================
// LIFECYCLE STEPS
// =============================================================================

/// Open-time registration, separated from the transport so tests can drive
/// the protocol without a live socket.
///
/// Claims (or joins) the setlist's channel, registers presence, broadcasts
/// the new roster to existing viewers, and returns the joiner's subscription
/// plus the initial snapshot event to send directly.
fn open_connection(
    state: &AppState,
    setlist_id: Uuid,
    connection_id: Uuid,
    identity: &ConnectionIdentity,
) -> (broadcast::Receiver<BroadcastEvent>, BroadcastEvent) {
    let events = state.channels.get_or_create(setlist_id).subscribe();

    let snapshot = state.presence.add_user(
        setlist_id,
        connection_id,
        identity.user_id,
        &identity.user_name,
        identity.is_authenticated,
    );

    state.channels.presence_update(setlist_id, snapshot.clone());
    let initial = BroadcastEvent::presence_update(setlist_id, snapshot);

    (events, initial)
}

/// Interpret one inbound text frame. Malformed input is logged and dropped.
fn handle_client_text(state: &AppState, setlist_id: Uuid, connection_id: Uuid, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!(%setlist_id, %connection_id, error = %e, "ws: ignoring malformed message");
            return;
        }
    };

    match message {
        ClientMessage::Editing { is_editing } => {
            // None means this connection is no longer tracked (e.g. swept
            // between frames) — a benign no-op, not a reason to disconnect.
            if state
                .presence
                .update_editing_status(setlist_id, connection_id, is_editing)
                .is_some()
            {
                let snapshot = state.presence.get_presence(setlist_id);
                state.channels.presence_update(setlist_id, snapshot);
            }
        }
    }
}

/// Close-time cleanup. Every step stands alone: presence removal, survivor
/// notification, and channel teardown each run regardless of the others.
fn close_connection(state: &AppState, setlist_id: Uuid, connection_id: Uuid) {
    let snapshot = state.presence.remove_user(setlist_id, connection_id);

    if snapshot.is_empty() {
        // Last viewer gone (or the setlist was never tracked): no one is left
        // to notify, and the channel binding must not outlive its audience.
        state.channels.unregister_publisher(setlist_id);
    } else {
        state.channels.presence_update(setlist_id, snapshot);
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_event(socket: &mut WebSocket, event: &BroadcastEvent) -> Result<(), ()> {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, kind = event.kind(), "ws: failed to serialize event");
            return Err(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
