//! Ticket-issuing route — the HTTP half of websocket authentication.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use tracing::warn;

use crate::services::session;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsTicketBody {
    pub id_token: String,
}

/// `POST /api/auth/ws-ticket` — exchange a provider ID token for a one-time
/// websocket ticket. Returns 503 when no identity verifier is configured
/// (guest connections remain available without a ticket).
pub async fn ws_ticket(
    State(state): State<AppState>,
    Json(body): Json<WsTicketBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let Some(verifier) = &state.verifier else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let identity = verifier
        .verify(&body.id_token)
        .await
        .map_err(|e| {
            warn!(error = %e, "identity verification failed");
            StatusCode::BAD_GATEWAY
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id = session::upsert_user(
        &state.pool,
        &identity.external_id,
        &identity.name,
        identity.email.as_deref(),
    )
    .await
    .map_err(|e| {
        warn!(error = %e, "user upsert failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let ticket = session::create_ws_ticket(&state.pool, user_id).await.map_err(|e| {
        warn!(error = %e, "ticket creation failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(serde_json::json!({ "ticket": ticket, "userId": user_id })))
}
