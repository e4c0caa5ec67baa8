//! `BroadcastEvent` — the outbound message type for setlist channels.
//!
//! DESIGN
//! ======
//! A serde tagged union: the `type` field carries the kebab-case event kind
//! and every kind has a concretely typed payload in `data` (entity snapshot
//! for add/update, id-only marker for delete, item list for reorder).
//! `presence-update` is the one kind that carries a `presence` roster instead
//! of `data`. Events are transient — constructed, published to the setlist's
//! channel, serialized to JSON text frames, and discarded.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::services::presence::UserPresence;
use crate::services::setlist::{SetItem, SetSection, Setlist};

// =============================================================================
// ACTOR
// =============================================================================

/// Identity of the user behind a mutation, echoed on domain events so peers
/// can attribute the change. Both fields are absent for anonymous actors.
#[derive(Debug, Clone, Default)]
pub struct Actor {
    pub user_id: Option<Uuid>,
    pub user_name: Option<String>,
}

impl Actor {
    #[must_use]
    pub fn new(user_id: Option<Uuid>, user_name: Option<String>) -> Self {
        Self { user_id, user_name }
    }
}

// =============================================================================
// EVENT
// =============================================================================

/// Id-only payload for deletion events. Peers drop the entity locally.
#[derive(Debug, Clone, Serialize)]
pub struct Deleted {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum BroadcastEvent {
    ItemAdded {
        setlist_id: Uuid,
        data: SetItem,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    ItemUpdated {
        setlist_id: Uuid,
        data: SetItem,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    ItemDeleted {
        setlist_id: Uuid,
        data: Deleted,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    /// New ordering of the affected scope after a move.
    Reordered {
        setlist_id: Uuid,
        data: Vec<SetItem>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    SectionAdded {
        setlist_id: Uuid,
        data: SetSection,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    SectionUpdated {
        setlist_id: Uuid,
        data: SetSection,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    SectionDeleted {
        setlist_id: Uuid,
        data: Deleted,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    SetlistUpdated {
        setlist_id: Uuid,
        data: Setlist,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
    PresenceUpdate {
        setlist_id: Uuid,
        presence: Vec<UserPresence>,
        #[serde(with = "time::serde::rfc3339")]
        timestamp: OffsetDateTime,
    },
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl BroadcastEvent {
    pub fn item_added(setlist_id: Uuid, item: SetItem, actor: &Actor) -> Self {
        Self::ItemAdded {
            setlist_id,
            data: item,
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn item_updated(setlist_id: Uuid, item: SetItem, actor: &Actor) -> Self {
        Self::ItemUpdated {
            setlist_id,
            data: item,
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn item_deleted(setlist_id: Uuid, item_id: Uuid, actor: &Actor) -> Self {
        Self::ItemDeleted {
            setlist_id,
            data: Deleted { id: item_id },
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn reordered(setlist_id: Uuid, items: Vec<SetItem>, actor: &Actor) -> Self {
        Self::Reordered {
            setlist_id,
            data: items,
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn section_added(setlist_id: Uuid, section: SetSection, actor: &Actor) -> Self {
        Self::SectionAdded {
            setlist_id,
            data: section,
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn section_updated(setlist_id: Uuid, section: SetSection, actor: &Actor) -> Self {
        Self::SectionUpdated {
            setlist_id,
            data: section,
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn section_deleted(setlist_id: Uuid, section_id: Uuid, actor: &Actor) -> Self {
        Self::SectionDeleted {
            setlist_id,
            data: Deleted { id: section_id },
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn setlist_updated(setlist_id: Uuid, setlist: Setlist, actor: &Actor) -> Self {
        Self::SetlistUpdated {
            setlist_id,
            data: setlist,
            user_id: actor.user_id,
            user_name: actor.user_name.clone(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    pub fn presence_update(setlist_id: Uuid, presence: Vec<UserPresence>) -> Self {
        Self::PresenceUpdate { setlist_id, presence, timestamp: OffsetDateTime::now_utc() }
    }
}

// =============================================================================
// ROUTING
// =============================================================================

impl BroadcastEvent {
    /// The channel this event targets.
    #[must_use]
    pub fn setlist_id(&self) -> Uuid {
        match self {
            Self::ItemAdded { setlist_id, .. }
            | Self::ItemUpdated { setlist_id, .. }
            | Self::ItemDeleted { setlist_id, .. }
            | Self::Reordered { setlist_id, .. }
            | Self::SectionAdded { setlist_id, .. }
            | Self::SectionUpdated { setlist_id, .. }
            | Self::SectionDeleted { setlist_id, .. }
            | Self::SetlistUpdated { setlist_id, .. }
            | Self::PresenceUpdate { setlist_id, .. } => *setlist_id,
        }
    }

    /// Wire tag for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ItemAdded { .. } => "item-added",
            Self::ItemUpdated { .. } => "item-updated",
            Self::ItemDeleted { .. } => "item-deleted",
            Self::Reordered { .. } => "reordered",
            Self::SectionAdded { .. } => "section-added",
            Self::SectionUpdated { .. } => "section-updated",
            Self::SectionDeleted { .. } => "section-deleted",
            Self::SetlistUpdated { .. } => "setlist-updated",
            Self::PresenceUpdate { .. } => "presence-update",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::setlist::test_helpers::{dummy_item, dummy_section};

    #[test]
    fn item_added_wire_shape() {
        let setlist_id = Uuid::new_v4();
        let item = dummy_item(setlist_id);
        let item_id = item.id;
        let actor = Actor::new(Some(Uuid::new_v4()), Some("Alice".into()));

        let event = BroadcastEvent::item_added(setlist_id, item, &actor);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "item-added");
        assert_eq!(json["setlistId"], serde_json::json!(setlist_id));
        assert_eq!(json["data"]["id"], serde_json::json!(item_id));
        assert_eq!(json["userName"], "Alice");
        assert!(json["timestamp"].as_str().unwrap().contains('T'));
        assert!(json.get("presence").is_none());
    }

    #[test]
    fn item_deleted_carries_id_only_marker() {
        let setlist_id = Uuid::new_v4();
        let item_id = Uuid::new_v4();
        let event = BroadcastEvent::item_deleted(setlist_id, item_id, &Actor::default());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "item-deleted");
        assert_eq!(json["data"], serde_json::json!({ "id": item_id }));
        // Anonymous actor: attribution fields omitted entirely.
        assert!(json.get("userId").is_none());
        assert!(json.get("userName").is_none());
    }

    #[test]
    fn section_events_use_kebab_case_tags() {
        let setlist_id = Uuid::new_v4();
        let section = dummy_section(setlist_id);
        let actor = Actor::default();

        let added = BroadcastEvent::section_added(setlist_id, section.clone(), &actor);
        let updated = BroadcastEvent::section_updated(setlist_id, section, &actor);
        let deleted = BroadcastEvent::section_deleted(setlist_id, Uuid::new_v4(), &actor);

        assert_eq!(added.kind(), "section-added");
        assert_eq!(updated.kind(), "section-updated");
        assert_eq!(deleted.kind(), "section-deleted");
        for event in [added, updated, deleted] {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.kind());
        }
    }

    #[test]
    fn presence_update_carries_roster_not_data() {
        let setlist_id = Uuid::new_v4();
        let registry = crate::services::presence::PresenceRegistry::new();
        let snapshot = registry.add_user(setlist_id, Uuid::new_v4(), None, "Viewer", false);

        let event = BroadcastEvent::presence_update(setlist_id, snapshot);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "presence-update");
        assert_eq!(json["presence"].as_array().unwrap().len(), 1);
        assert_eq!(json["presence"][0]["userName"], "Viewer");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn setlist_id_accessor_covers_all_kinds() {
        let setlist_id = Uuid::new_v4();
        let actor = Actor::default();
        let events = vec![
            BroadcastEvent::item_deleted(setlist_id, Uuid::new_v4(), &actor),
            BroadcastEvent::reordered(setlist_id, Vec::new(), &actor),
            BroadcastEvent::presence_update(setlist_id, Vec::new()),
        ];
        for event in events {
            assert_eq!(event.setlist_id(), setlist_id);
        }
    }
}
