//! Presence registry — who is viewing or editing each setlist.
//!
//! DESIGN
//! ======
//! A map-of-maps keyed by setlist id, then connection id, behind a single
//! `std::sync::Mutex`. Every operation is a short synchronous critical
//! section, so snapshots are atomic: `get_presence` never observes a
//! half-inserted entry. The registry is a constructed service object held in
//! `AppState` — no module-level globals — so tests build a fresh one each.
//!
//! LIFECYCLE
//! =========
//! An entry is created when its websocket registers, mutated only by that
//! connection's editing toggles (plus `touch` on traffic), and destroyed on
//! disconnect or by the stale sweep. A setlist key is evicted the moment its
//! inner map empties, so repeated open/close cycles never grow the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// One live connection's presence on a setlist. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    /// Unique per websocket lifetime. A reconnect is a brand-new id.
    pub connection_id: Uuid,
    /// `None` for unauthenticated viewers.
    pub user_id: Option<Uuid>,
    pub user_name: String,
    pub is_authenticated: bool,
    pub is_editing: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    /// Refreshed on every inbound frame; drives the stale sweep.
    #[serde(skip_serializing)]
    pub last_seen: OffsetDateTime,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Per-setlist roster of connected viewers/editors.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<Mutex<HashMap<Uuid, HashMap<Uuid, UserPresence>>>>,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, HashMap<Uuid, UserPresence>>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register a connection on a setlist and return the resulting snapshot.
    ///
    /// Re-adding the same connection id overwrites the prior entry; connection
    /// ids are unique per socket lifetime so this only happens on a retry of
    /// the same open.
    pub fn add_user(
        &self,
        setlist_id: Uuid,
        connection_id: Uuid,
        user_id: Option<Uuid>,
        user_name: &str,
        is_authenticated: bool,
    ) -> Vec<UserPresence> {
        let now = OffsetDateTime::now_utc();
        let entry = UserPresence {
            connection_id,
            user_id,
            user_name: user_name.to_owned(),
            is_authenticated,
            is_editing: false,
            joined_at: now,
            last_seen: now,
        };

        let mut setlists = self.lock();
        let connections = setlists.entry(setlist_id).or_default();
        connections.insert(connection_id, entry);
        snapshot(connections)
    }

    /// Remove a connection and return the post-removal snapshot.
    ///
    /// Evicts the setlist key once its map empties. Unknown setlist or
    /// connection ids are a benign no-op returning the current (possibly
    /// empty) snapshot.
    pub fn remove_user(&self, setlist_id: Uuid, connection_id: Uuid) -> Vec<UserPresence> {
        let mut setlists = self.lock();
        let Some(connections) = setlists.get_mut(&setlist_id) else {
            return Vec::new();
        };

        connections.remove(&connection_id);
        if connections.is_empty() {
            setlists.remove(&setlist_id);
            return Vec::new();
        }
        snapshot(connections)
    }

    /// Toggle a connection's editing flag in place.
    ///
    /// Returns `None` when the setlist or connection is not tracked; callers
    /// treat that as a no-op, never a failure.
    pub fn update_editing_status(
        &self,
        setlist_id: Uuid,
        connection_id: Uuid,
        is_editing: bool,
    ) -> Option<UserPresence> {
        let mut setlists = self.lock();
        let entry = setlists.get_mut(&setlist_id)?.get_mut(&connection_id)?;
        entry.is_editing = is_editing;
        entry.last_seen = OffsetDateTime::now_utc();
        Some(entry.clone())
    }

    /// Point-in-time snapshot; empty if the setlist is untracked.
    #[must_use]
    pub fn get_presence(&self, setlist_id: Uuid) -> Vec<UserPresence> {
        let setlists = self.lock();
        setlists.get(&setlist_id).map_or_else(Vec::new, snapshot)
    }

    /// Look up a single connection's entry.
    #[must_use]
    pub fn get_user(&self, setlist_id: Uuid, connection_id: Uuid) -> Option<UserPresence> {
        let setlists = self.lock();
        setlists.get(&setlist_id)?.get(&connection_id).cloned()
    }

    #[must_use]
    pub fn get_authenticated_user_count(&self, setlist_id: Uuid) -> usize {
        let setlists = self.lock();
        setlists
            .get(&setlist_id)
            .map_or(0, |connections| connections.values().filter(|p| p.is_authenticated).count())
    }

    #[must_use]
    pub fn get_editing_users(&self, setlist_id: Uuid) -> Vec<UserPresence> {
        let setlists = self.lock();
        setlists.get(&setlist_id).map_or_else(Vec::new, |connections| {
            let mut users: Vec<UserPresence> =
                connections.values().filter(|p| p.is_editing).cloned().collect();
            users.sort_by_key(|p| p.joined_at);
            users
        })
    }

    /// Refresh a connection's `last_seen`. No-op if untracked.
    pub fn touch(&self, setlist_id: Uuid, connection_id: Uuid) {
        let mut setlists = self.lock();
        if let Some(entry) = setlists
            .get_mut(&setlist_id)
            .and_then(|connections| connections.get_mut(&connection_id))
        {
            entry.last_seen = OffsetDateTime::now_utc();
        }
    }

    /// Evict entries idle longer than `max_idle` and return what was removed
    /// as `(setlist_id, connection_id)` pairs. Setlist keys that empty out are
    /// dropped in the same pass.
    pub fn sweep_stale(&self, max_idle: Duration) -> Vec<(Uuid, Uuid)> {
        let cutoff = OffsetDateTime::now_utc() - max_idle;
        let mut evicted = Vec::new();

        let mut setlists = self.lock();
        setlists.retain(|setlist_id, connections| {
            connections.retain(|connection_id, entry| {
                let stale = entry.last_seen < cutoff;
                if stale {
                    evicted.push((*setlist_id, *connection_id));
                }
                !stale
            });
            !connections.is_empty()
        });

        evicted
    }

    /// Number of setlists currently tracked. Used by tests to verify the
    /// registry stays bounded under open/close churn.
    #[must_use]
    pub fn tracked_setlist_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Clone the roster in a stable order (oldest joiner first).
fn snapshot(connections: &HashMap<Uuid, UserPresence>) -> Vec<UserPresence> {
    let mut users: Vec<UserPresence> = connections.values().cloned().collect();
    users.sort_by_key(|p| p.joined_at);
    users
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
