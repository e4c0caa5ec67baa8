//! Setlist REST routes — CRUD plus the presence snapshot endpoint.
//!
//! Handlers translate HTTP to the setlist service and map `SetlistError`
//! variants to status codes. Mutating requests carry the acting user's
//! id/name so broadcasts can attribute the change; authorization beyond that
//! attribution is out of scope here.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::event::Actor;
use crate::services::presence::UserPresence;
use crate::services::setlist::{self, NewItem, SetItem, SetSection, Setlist, SetlistDetail, SetlistError};
use crate::state::AppState;

// =============================================================================
// BODIES
// =============================================================================

/// Acting-user attribution shared by all mutating bodies.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ActingUser {
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
}

impl ActingUser {
    fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.user_name.clone())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSetlistBody {
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<Uuid>,
    pub club_id: Option<Uuid>,
    #[serde(default)]
    pub is_public: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSetlistBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_public: Option<bool>,
    #[serde(flatten)]
    pub acting: ActingUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSectionBody {
    pub name: String,
    pub position: Option<i32>,
    #[serde(flatten)]
    pub acting: ActingUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSectionBody {
    pub name: String,
    #[serde(flatten)]
    pub acting: ActingUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemBody {
    pub track_id: Uuid,
    pub section_id: Option<Uuid>,
    pub position: Option<i32>,
    pub custom_tuning: Option<String>,
    pub custom_duration_secs: Option<i32>,
    pub custom_notes: Option<String>,
    #[serde(flatten)]
    pub acting: ActingUser,
}

/// Override fields are double-optional so a PATCH can distinguish "leave
/// alone" (field absent) from "clear back to the track default" (explicit
/// null).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemBody {
    #[serde(default, deserialize_with = "double_option")]
    pub custom_tuning: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub custom_duration_secs: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub custom_notes: Option<Option<String>>,
    #[serde(flatten)]
    pub acting: ActingUser,
}

/// Plain `Option<Option<T>>` deserializes JSON `null` to the outer `None`;
/// wrapping a present value in `Some` keeps explicit null distinct from an
/// absent field (which `#[serde(default)]` covers).
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderBody {
    pub item_id: Uuid,
    pub section_id: Option<Uuid>,
    pub position: Option<i32>,
    #[serde(flatten)]
    pub acting: ActingUser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteBody {
    #[serde(flatten)]
    pub acting: ActingUser,
}

// =============================================================================
// SETLISTS
// =============================================================================

/// `GET /api/setlists`
pub async fn list_setlists(State(state): State<AppState>) -> Result<Json<Vec<Setlist>>, StatusCode> {
    let setlists = setlist::list_setlists(&state.pool).await.map_err(error_to_status)?;
    Ok(Json(setlists))
}

/// `POST /api/setlists`
pub async fn create_setlist(
    State(state): State<AppState>,
    Json(body): Json<CreateSetlistBody>,
) -> Result<(StatusCode, Json<Setlist>), StatusCode> {
    let created = setlist::create_setlist(
        &state.pool,
        &body.name,
        body.description.as_deref(),
        body.owner_id,
        body.club_id,
        body.is_public,
    )
    .await
    .map_err(error_to_status)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /api/setlists/{id}`
pub async fn get_setlist(
    State(state): State<AppState>,
    Path(setlist_id): Path<Uuid>,
) -> Result<Json<SetlistDetail>, StatusCode> {
    let detail = setlist::get_setlist(&state.pool, setlist_id).await.map_err(error_to_status)?;
    Ok(Json(detail))
}

/// `PATCH /api/setlists/{id}`
pub async fn update_setlist(
    State(state): State<AppState>,
    Path(setlist_id): Path<Uuid>,
    Json(body): Json<UpdateSetlistBody>,
) -> Result<Json<Setlist>, StatusCode> {
    let updated = setlist::update_setlist(
        &state,
        setlist_id,
        body.name.as_deref(),
        body.description.as_deref(),
        body.is_public,
        &body.acting.actor(),
    )
    .await
    .map_err(error_to_status)?;
    Ok(Json(updated))
}

/// `DELETE /api/setlists/{id}`
pub async fn delete_setlist(
    State(state): State<AppState>,
    Path(setlist_id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    setlist::delete_setlist(&state.pool, setlist_id).await.map_err(error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/setlists/{id}/presence` — point-in-time roster without a socket.
pub async fn get_presence(
    State(state): State<AppState>,
    Path(setlist_id): Path<Uuid>,
) -> Json<Vec<UserPresence>> {
    Json(state.presence.get_presence(setlist_id))
}

// =============================================================================
// SECTIONS
// =============================================================================

/// `POST /api/setlists/{id}/sections`
pub async fn add_section(
    State(state): State<AppState>,
    Path(setlist_id): Path<Uuid>,
    Json(body): Json<AddSectionBody>,
) -> Result<(StatusCode, Json<SetSection>), StatusCode> {
    let section =
        setlist::add_section(&state, setlist_id, &body.name, body.position, &body.acting.actor())
            .await
            .map_err(error_to_status)?;
    Ok((StatusCode::CREATED, Json(section)))
}

/// `PATCH /api/setlists/{id}/sections/{section_id}`
pub async fn update_section(
    State(state): State<AppState>,
    Path((setlist_id, section_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateSectionBody>,
) -> Result<Json<SetSection>, StatusCode> {
    let section =
        setlist::update_section(&state, setlist_id, section_id, &body.name, &body.acting.actor())
            .await
            .map_err(error_to_status)?;
    Ok(Json(section))
}

/// `DELETE /api/setlists/{id}/sections/{section_id}`
pub async fn delete_section(
    State(state): State<AppState>,
    Path((setlist_id, section_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<DeleteBody>>,
) -> Result<StatusCode, StatusCode> {
    let acting = body.map(|Json(b)| b.acting).unwrap_or_default();
    setlist::delete_section(&state, setlist_id, section_id, &acting.actor())
        .await
        .map_err(error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// ITEMS
// =============================================================================

/// `POST /api/setlists/{id}/items`
pub async fn add_item(
    State(state): State<AppState>,
    Path(setlist_id): Path<Uuid>,
    Json(body): Json<AddItemBody>,
) -> Result<(StatusCode, Json<SetItem>), StatusCode> {
    let actor = body.acting.actor();
    let new_item = NewItem {
        section_id: body.section_id,
        track_id: body.track_id,
        position: body.position,
        custom_tuning: body.custom_tuning,
        custom_duration_secs: body.custom_duration_secs,
        custom_notes: body.custom_notes,
    };
    let item = setlist::add_item(&state, setlist_id, new_item, &actor)
        .await
        .map_err(error_to_status)?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// `PATCH /api/setlists/{id}/items/{item_id}`
pub async fn update_item(
    State(state): State<AppState>,
    Path((setlist_id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateItemBody>,
) -> Result<Json<SetItem>, StatusCode> {
    let item = setlist::update_item(
        &state,
        setlist_id,
        item_id,
        body.custom_tuning.as_ref().map(Option::as_deref),
        body.custom_duration_secs,
        body.custom_notes.as_ref().map(Option::as_deref),
        &body.acting.actor(),
    )
    .await
    .map_err(error_to_status)?;
    Ok(Json(item))
}

/// `DELETE /api/setlists/{id}/items/{item_id}`
pub async fn delete_item(
    State(state): State<AppState>,
    Path((setlist_id, item_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<DeleteBody>>,
) -> Result<StatusCode, StatusCode> {
    let acting = body.map(|Json(b)| b.acting).unwrap_or_default();
    setlist::delete_item(&state, setlist_id, item_id, &acting.actor())
        .await
        .map_err(error_to_status)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/setlists/{id}/reorder`
pub async fn reorder(
    State(state): State<AppState>,
    Path(setlist_id): Path<Uuid>,
    Json(body): Json<ReorderBody>,
) -> Result<Json<Vec<SetItem>>, StatusCode> {
    let items = setlist::move_item(
        &state,
        setlist_id,
        body.item_id,
        body.section_id,
        body.position,
        &body.acting.actor(),
    )
    .await
    .map_err(error_to_status)?;
    Ok(Json(items))
}

// =============================================================================
// HELPERS
// =============================================================================

pub(crate) fn error_to_status(err: SetlistError) -> StatusCode {
    match err {
        SetlistError::NotFound(_) | SetlistError::SectionNotFound(_) | SetlistError::ItemNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        SetlistError::Database(e) => {
            tracing::error!(error = %e, "setlist route database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
