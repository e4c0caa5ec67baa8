//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! Binds the REST surface and the realtime websocket endpoint under a single
//! Axum router. The realtime channel is path-parameterized per setlist:
//! `GET /api/setlists/{id}/live`.

pub mod auth;
pub mod setlists;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

#[must_use]
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/ws-ticket", post(auth::ws_ticket))
        .route("/api/setlists", get(setlists::list_setlists).post(setlists::create_setlist))
        .route(
            "/api/setlists/{id}",
            get(setlists::get_setlist)
                .patch(setlists::update_setlist)
                .delete(setlists::delete_setlist),
        )
        .route("/api/setlists/{id}/presence", get(setlists::get_presence))
        .route("/api/setlists/{id}/sections", post(setlists::add_section))
        .route(
            "/api/setlists/{id}/sections/{section_id}",
            axum::routing::patch(setlists::update_section).delete(setlists::delete_section),
        )
        .route("/api/setlists/{id}/items", post(setlists::add_item))
        .route(
            "/api/setlists/{id}/items/{item_id}",
            axum::routing::patch(setlists::update_item).delete(setlists::delete_item),
        )
        .route("/api/setlists/{id}/reorder", post(setlists::reorder))
        .route("/api/setlists/{id}/live", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
