//! Setlist service — CRUD for setlists, sections, and items.
//!
//! DESIGN
//! ======
//! Sections and items carry dense, zero-based `position` ordering keys unique
//! within their scope (the setlist for sections, a section or the setlist
//! root for items). Every mutation that inserts, deletes, or moves runs in a
//! transaction that shifts neighbors so positions stay dense. After a
//! successful commit, the matching channel-registry convenience publishes the
//! echoed entity to the setlist's live viewers.
//!
//! ERROR HANDLING
//! ==============
//! Persistence errors surface as `SetlistError` before any publish happens.
//! Publish failures are swallowed inside the registry: a mutation that has
//! already committed never fails or rolls back because nobody is listening.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::event::Actor;
use crate::state::AppState;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SetlistError {
    #[error("setlist not found: {0}")]
    NotFound(Uuid),
    #[error("section not found: {0}")]
    SectionNotFound(Uuid),
    #[error("item not found: {0}")]
    ItemNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setlist {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Option<Uuid>,
    pub club_id: Option<Uuid>,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSection {
    pub id: Uuid,
    pub setlist_id: Uuid,
    pub name: String,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetItem {
    pub id: Uuid,
    pub setlist_id: Uuid,
    /// `None` places the item at the setlist root, outside any section.
    pub section_id: Option<Uuid>,
    pub track_id: Uuid,
    pub position: i32,
    /// Per-item overrides shadowing the referenced track's defaults.
    pub custom_tuning: Option<String>,
    pub custom_duration_secs: Option<i32>,
    pub custom_notes: Option<String>,
}

/// Full setlist with ordered sections and items, as served to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetlistDetail {
    #[serde(flatten)]
    pub setlist: Setlist,
    pub sections: Vec<SetSection>,
    pub items: Vec<SetItem>,
}

#[derive(Debug, Clone, Default)]
pub struct NewItem {
    pub section_id: Option<Uuid>,
    pub track_id: Uuid,
    pub position: Option<i32>,
    pub custom_tuning: Option<String>,
    pub custom_duration_secs: Option<i32>,
    pub custom_notes: Option<String>,
}

// =============================================================================
// SETLIST CRUD
// =============================================================================

/// Create a setlist.
///
/// # Errors
///
/// Returns a database error if the insert fails.
pub async fn create_setlist(
    pool: &PgPool,
    name: &str,
    description: Option<&str>,
    owner_id: Option<Uuid>,
    club_id: Option<Uuid>,
    is_public: bool,
) -> Result<Setlist, SetlistError> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO setlists (id, name, description, owner_id, club_id, is_public)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .bind(owner_id)
    .bind(club_id)
    .bind(is_public)
    .execute(pool)
    .await?;

    Ok(Setlist {
        id,
        name: name.to_owned(),
        description: description.map(str::to_owned),
        owner_id,
        club_id,
        is_public,
    })
}

/// List all setlists, public first.
///
/// # Errors
///
/// Returns a database error if the query fails.
pub async fn list_setlists(pool: &PgPool) -> Result<Vec<Setlist>, SetlistError> {
    let rows = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<Uuid>, Option<Uuid>, bool)>(
        "SELECT id, name, description, owner_id, club_id, is_public
         FROM setlists
         ORDER BY is_public DESC, name ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(setlist_from_row).collect())
}

/// Fetch one setlist with its ordered sections and items.
///
/// # Errors
///
/// Returns `NotFound` if the setlist does not exist.
pub async fn get_setlist(pool: &PgPool, setlist_id: Uuid) -> Result<SetlistDetail, SetlistError> {
    let setlist = fetch_setlist(pool, setlist_id).await?;

    let sections = sqlx::query_as::<_, (Uuid, Uuid, String, i32)>(
        "SELECT id, setlist_id, name, position
         FROM set_sections WHERE setlist_id = $1
         ORDER BY position ASC",
    )
    .bind(setlist_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, setlist_id, name, position)| SetSection { id, setlist_id, name, position })
    .collect();

    let items = fetch_items(pool, setlist_id).await?;

    Ok(SetlistDetail { setlist, sections, items })
}

/// Update a setlist's metadata and broadcast `setlist-updated`.
///
/// # Errors
///
/// Returns `NotFound` if the setlist does not exist.
pub async fn update_setlist(
    state: &AppState,
    setlist_id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
    is_public: Option<bool>,
    actor: &Actor,
) -> Result<Setlist, SetlistError> {
    let result = sqlx::query(
        "UPDATE setlists
         SET name = COALESCE($2, name),
             description = COALESCE($3, description),
             is_public = COALESCE($4, is_public)
         WHERE id = $1",
    )
    .bind(setlist_id)
    .bind(name)
    .bind(description)
    .bind(is_public)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(SetlistError::NotFound(setlist_id));
    }

    let setlist = fetch_setlist(&state.pool, setlist_id).await?;
    state.channels.setlist_updated(setlist_id, setlist.clone(), actor);
    Ok(setlist)
}

/// Delete a setlist. Sections and items cascade; no broadcast — deleting the
/// setlist tears the channel down with it via normal disconnect cleanup.
///
/// # Errors
///
/// Returns `NotFound` if the setlist does not exist.
pub async fn delete_setlist(pool: &PgPool, setlist_id: Uuid) -> Result<(), SetlistError> {
    let result = sqlx::query("DELETE FROM setlists WHERE id = $1")
        .bind(setlist_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(SetlistError::NotFound(setlist_id));
    }
    Ok(())
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Add a section, shifting later sections if a position is given.
/// Broadcasts `section-added` on success.
///
/// # Errors
///
/// Returns `NotFound` if the setlist does not exist.
pub async fn add_section(
    state: &AppState,
    setlist_id: Uuid,
    name: &str,
    position: Option<i32>,
    actor: &Actor,
) -> Result<SetSection, SetlistError> {
    ensure_setlist_exists(&state.pool, setlist_id).await?;

    let mut tx = state.pool.begin().await?;
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM set_sections WHERE setlist_id = $1")
            .bind(setlist_id)
            .fetch_one(tx.as_mut())
            .await?;
    let position = clamped_position(position, count);

    sqlx::query(
        "UPDATE set_sections SET position = position + 1
         WHERE setlist_id = $1 AND position >= $2",
    )
    .bind(setlist_id)
    .bind(position)
    .execute(tx.as_mut())
    .await?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO set_sections (id, setlist_id, name, position) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(setlist_id)
        .bind(name)
        .bind(position)
        .execute(tx.as_mut())
        .await?;
    tx.commit().await?;

    let section = SetSection { id, setlist_id, name: name.to_owned(), position };
    state.channels.section_added(setlist_id, section.clone(), actor);
    Ok(section)
}

/// Rename a section. Broadcasts `section-updated` on success.
///
/// # Errors
///
/// Returns `SectionNotFound` if the section does not exist on this setlist.
pub async fn update_section(
    state: &AppState,
    setlist_id: Uuid,
    section_id: Uuid,
    name: &str,
    actor: &Actor,
) -> Result<SetSection, SetlistError> {
    let row = sqlx::query_as::<_, (i32,)>(
        "UPDATE set_sections SET name = $3
         WHERE id = $1 AND setlist_id = $2
         RETURNING position",
    )
    .bind(section_id)
    .bind(setlist_id)
    .bind(name)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(SetlistError::SectionNotFound(section_id))?;

    let section = SetSection { id: section_id, setlist_id, name: name.to_owned(), position: row.0 };
    state.channels.section_updated(setlist_id, section.clone(), actor);
    Ok(section)
}

/// Delete a section (its items cascade) and close the position gap.
/// Broadcasts `section-deleted` on success.
///
/// # Errors
///
/// Returns `SectionNotFound` if the section does not exist on this setlist.
pub async fn delete_section(
    state: &AppState,
    setlist_id: Uuid,
    section_id: Uuid,
    actor: &Actor,
) -> Result<(), SetlistError> {
    let mut tx = state.pool.begin().await?;
    let removed = sqlx::query_as::<_, (i32,)>(
        "DELETE FROM set_sections WHERE id = $1 AND setlist_id = $2 RETURNING position",
    )
    .bind(section_id)
    .bind(setlist_id)
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(SetlistError::SectionNotFound(section_id))?;

    sqlx::query(
        "UPDATE set_sections SET position = position - 1
         WHERE setlist_id = $1 AND position > $2",
    )
    .bind(setlist_id)
    .bind(removed.0)
    .execute(tx.as_mut())
    .await?;
    tx.commit().await?;

    state.channels.section_deleted(setlist_id, section_id, actor);
    Ok(())
}

// =============================================================================
// ITEMS
// =============================================================================

/// Add a track item to a section or the setlist root, shifting later items
/// in that scope. Broadcasts `item-added` on success.
///
/// # Errors
///
/// Returns `NotFound`/`SectionNotFound` if the target scope does not exist.
pub async fn add_item(
    state: &AppState,
    setlist_id: Uuid,
    new_item: NewItem,
    actor: &Actor,
) -> Result<SetItem, SetlistError> {
    ensure_setlist_exists(&state.pool, setlist_id).await?;
    if let Some(section_id) = new_item.section_id {
        ensure_section_exists(&state.pool, setlist_id, section_id).await?;
    }

    let mut tx = state.pool.begin().await?;
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM set_items
         WHERE setlist_id = $1 AND section_id IS NOT DISTINCT FROM $2",
    )
    .bind(setlist_id)
    .bind(new_item.section_id)
    .fetch_one(tx.as_mut())
    .await?;
    let position = clamped_position(new_item.position, count);

    sqlx::query(
        "UPDATE set_items SET position = position + 1
         WHERE setlist_id = $1 AND section_id IS NOT DISTINCT FROM $2 AND position >= $3",
    )
    .bind(setlist_id)
    .bind(new_item.section_id)
    .bind(position)
    .execute(tx.as_mut())
    .await?;

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO set_items
             (id, setlist_id, section_id, track_id, position,
              custom_tuning, custom_duration_secs, custom_notes)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(id)
    .bind(setlist_id)
    .bind(new_item.section_id)
    .bind(new_item.track_id)
    .bind(position)
    .bind(&new_item.custom_tuning)
    .bind(new_item.custom_duration_secs)
    .bind(&new_item.custom_notes)
    .execute(tx.as_mut())
    .await?;
    tx.commit().await?;

    let item = SetItem {
        id,
        setlist_id,
        section_id: new_item.section_id,
        track_id: new_item.track_id,
        position,
        custom_tuning: new_item.custom_tuning,
        custom_duration_secs: new_item.custom_duration_secs,
        custom_notes: new_item.custom_notes,
    };
    state.channels.item_added(setlist_id, item.clone(), actor);
    Ok(item)
}

/// Update an item's per-track overrides. Broadcasts `item-updated` on success.
///
/// Each override is a tri-state patch: outer `None` leaves the column alone,
/// `Some(None)` clears it back to NULL, `Some(Some(v))` sets it.
///
/// # Errors
///
/// Returns `ItemNotFound` if the item does not exist on this setlist.
pub async fn update_item(
    state: &AppState,
    setlist_id: Uuid,
    item_id: Uuid,
    custom_tuning: Option<Option<&str>>,
    custom_duration_secs: Option<Option<i32>>,
    custom_notes: Option<Option<&str>>,
    actor: &Actor,
) -> Result<SetItem, SetlistError> {
    let row = sqlx::query_as::<_, (Option<Uuid>, Uuid, i32, Option<String>, Option<i32>, Option<String>)>(
        "UPDATE set_items
         SET custom_tuning = CASE WHEN $3 THEN $4 ELSE custom_tuning END,
             custom_duration_secs = CASE WHEN $5 THEN $6 ELSE custom_duration_secs END,
             custom_notes = CASE WHEN $7 THEN $8 ELSE custom_notes END
         WHERE id = $1 AND setlist_id = $2
         RETURNING section_id, track_id, position, custom_tuning, custom_duration_secs, custom_notes",
    )
    .bind(item_id)
    .bind(setlist_id)
    .bind(custom_tuning.is_some())
    .bind(custom_tuning.flatten())
    .bind(custom_duration_secs.is_some())
    .bind(custom_duration_secs.flatten())
    .bind(custom_notes.is_some())
    .bind(custom_notes.flatten())
    .fetch_optional(&state.pool)
    .await?
    .ok_or(SetlistError::ItemNotFound(item_id))?;

    let item = SetItem {
        id: item_id,
        setlist_id,
        section_id: row.0,
        track_id: row.1,
        position: row.2,
        custom_tuning: row.3,
        custom_duration_secs: row.4,
        custom_notes: row.5,
    };
    state.channels.item_updated(setlist_id, item.clone(), actor);
    Ok(item)
}

/// Delete an item and close the position gap in its scope.
/// Broadcasts `item-deleted` on success.
///
/// # Errors
///
/// Returns `ItemNotFound` if the item does not exist on this setlist.
pub async fn delete_item(
    state: &AppState,
    setlist_id: Uuid,
    item_id: Uuid,
    actor: &Actor,
) -> Result<(), SetlistError> {
    let mut tx = state.pool.begin().await?;
    let removed = sqlx::query_as::<_, (Option<Uuid>, i32)>(
        "DELETE FROM set_items WHERE id = $1 AND setlist_id = $2 RETURNING section_id, position",
    )
    .bind(item_id)
    .bind(setlist_id)
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(SetlistError::ItemNotFound(item_id))?;

    sqlx::query(
        "UPDATE set_items SET position = position - 1
         WHERE setlist_id = $1 AND section_id IS NOT DISTINCT FROM $2 AND position > $3",
    )
    .bind(setlist_id)
    .bind(removed.0)
    .bind(removed.1)
    .execute(tx.as_mut())
    .await?;
    tx.commit().await?;

    state.channels.item_deleted(setlist_id, item_id, actor);
    Ok(())
}

/// Move an item to a new scope and/or position, keeping both scopes dense.
/// Broadcasts `reordered` with the target scope's new ordering on success.
///
/// # Errors
///
/// Returns `ItemNotFound`/`SectionNotFound` if the item or target section
/// does not exist on this setlist.
pub async fn move_item(
    state: &AppState,
    setlist_id: Uuid,
    item_id: Uuid,
    target_section: Option<Uuid>,
    position: Option<i32>,
    actor: &Actor,
) -> Result<Vec<SetItem>, SetlistError> {
    if let Some(section_id) = target_section {
        ensure_section_exists(&state.pool, setlist_id, section_id).await?;
    }

    let mut tx = state.pool.begin().await?;
    let current = sqlx::query_as::<_, (Option<Uuid>, i32)>(
        "SELECT section_id, position FROM set_items WHERE id = $1 AND setlist_id = $2 FOR UPDATE",
    )
    .bind(item_id)
    .bind(setlist_id)
    .fetch_optional(tx.as_mut())
    .await?
    .ok_or(SetlistError::ItemNotFound(item_id))?;
    let (old_section, old_position) = current;

    // Close the gap in the old scope first.
    sqlx::query(
        "UPDATE set_items SET position = position - 1
         WHERE setlist_id = $1 AND section_id IS NOT DISTINCT FROM $2 AND position > $3",
    )
    .bind(setlist_id)
    .bind(old_section)
    .bind(old_position)
    .execute(tx.as_mut())
    .await?;

    // Target scope count no longer includes the moving item.
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM set_items
         WHERE setlist_id = $1 AND section_id IS NOT DISTINCT FROM $2 AND id <> $3",
    )
    .bind(setlist_id)
    .bind(target_section)
    .bind(item_id)
    .fetch_one(tx.as_mut())
    .await?;
    let new_position = clamped_position(position, count);

    sqlx::query(
        "UPDATE set_items SET position = position + 1
         WHERE setlist_id = $1 AND section_id IS NOT DISTINCT FROM $2
           AND position >= $3 AND id <> $4",
    )
    .bind(setlist_id)
    .bind(target_section)
    .bind(new_position)
    .bind(item_id)
    .execute(tx.as_mut())
    .await?;

    sqlx::query("UPDATE set_items SET section_id = $2, position = $3 WHERE id = $1")
        .bind(item_id)
        .bind(target_section)
        .bind(new_position)
        .execute(tx.as_mut())
        .await?;
    tx.commit().await?;

    let items = fetch_scope_items(&state.pool, setlist_id, target_section).await?;
    state.channels.reordered(setlist_id, items.clone(), actor);
    Ok(items)
}

// =============================================================================
// HELPERS
// =============================================================================

/// Clamp a requested insert position into `[0, count]`; `None` appends.
fn clamped_position(requested: Option<i32>, count: i64) -> i32 {
    #[allow(clippy::cast_possible_truncation)]
    let count = count.clamp(0, i64::from(i32::MAX)) as i32;
    match requested {
        Some(p) => p.clamp(0, count),
        None => count,
    }
}

fn setlist_from_row(
    (id, name, description, owner_id, club_id, is_public): (
        Uuid,
        String,
        Option<String>,
        Option<Uuid>,
        Option<Uuid>,
        bool,
    ),
) -> Setlist {
    Setlist { id, name, description, owner_id, club_id, is_public }
}

async fn fetch_setlist(pool: &PgPool, setlist_id: Uuid) -> Result<Setlist, SetlistError> {
    let row = sqlx::query_as::<_, (Uuid, String, Option<String>, Option<Uuid>, Option<Uuid>, bool)>(
        "SELECT id, name, description, owner_id, club_id, is_public FROM setlists WHERE id = $1",
    )
    .bind(setlist_id)
    .fetch_optional(pool)
    .await?
    .ok_or(SetlistError::NotFound(setlist_id))?;

    Ok(setlist_from_row(row))
}

async fn ensure_setlist_exists(pool: &PgPool, setlist_id: Uuid) -> Result<(), SetlistError> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM setlists WHERE id = $1)")
        .bind(setlist_id)
        .fetch_one(pool)
        .await?;
    if exists { Ok(()) } else { Err(SetlistError::NotFound(setlist_id)) }
}

async fn ensure_section_exists(
    pool: &PgPool,
    setlist_id: Uuid,
    section_id: Uuid,
) -> Result<(), SetlistError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM set_sections WHERE id = $1 AND setlist_id = $2)",
    )
    .bind(section_id)
    .bind(setlist_id)
    .fetch_one(pool)
    .await?;
    if exists { Ok(()) } else { Err(SetlistError::SectionNotFound(section_id)) }
}

async fn fetch_items(pool: &PgPool, setlist_id: Uuid) -> Result<Vec<SetItem>, SetlistError> {
    let rows = sqlx::query_as::<
        _,
        (Uuid, Uuid, Option<Uuid>, Uuid, i32, Option<String>, Option<i32>, Option<String>),
    >(
        "SELECT id, setlist_id, section_id, track_id, position,
                custom_tuning, custom_duration_secs, custom_notes
         FROM set_items WHERE setlist_id = $1
         ORDER BY section_id NULLS FIRST, position ASC",
    )
    .bind(setlist_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(item_from_row).collect())
}

async fn fetch_scope_items(
    pool: &PgPool,
    setlist_id: Uuid,
    section_id: Option<Uuid>,
) -> Result<Vec<SetItem>, SetlistError> {
    let rows = sqlx::query_as::<
        _,
        (Uuid, Uuid, Option<Uuid>, Uuid, i32, Option<String>, Option<i32>, Option<String>),
    >(
        "SELECT id, setlist_id, section_id, track_id, position,
                custom_tuning, custom_duration_secs, custom_notes
         FROM set_items
         WHERE setlist_id = $1 AND section_id IS NOT DISTINCT FROM $2
         ORDER BY position ASC",
    )
    .bind(setlist_id)
    .bind(section_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(item_from_row).collect())
}

fn item_from_row(
    (id, setlist_id, section_id, track_id, position, custom_tuning, custom_duration_secs, custom_notes): (
        Uuid,
        Uuid,
        Option<Uuid>,
        Uuid,
        i32,
        Option<String>,
        Option<i32>,
        Option<String>,
    ),
) -> SetItem {
    SetItem {
        id,
        setlist_id,
        section_id,
        track_id,
        position,
        custom_tuning,
        custom_duration_secs,
        custom_notes,
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "setlist_test.rs"]
mod tests;
