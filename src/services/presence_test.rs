use super::*;

fn registry() -> PresenceRegistry {
    PresenceRegistry::new()
}

// =============================================================================
// add_user / get_presence
// =============================================================================

#[test]
fn add_user_returns_snapshot_with_new_entry() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();
    let user = Uuid::new_v4();

    let snapshot = registry.add_user(setlist_id, conn, Some(user), "Alice", true);

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].connection_id, conn);
    assert_eq!(snapshot[0].user_id, Some(user));
    assert_eq!(snapshot[0].user_name, "Alice");
    assert!(snapshot[0].is_authenticated);
    assert!(!snapshot[0].is_editing);
}

#[test]
fn add_user_unauthenticated_guest() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();

    registry.add_user(setlist_id, Uuid::new_v4(), Some(Uuid::new_v4()), "Alice", true);
    let snapshot = registry.add_user(setlist_id, Uuid::new_v4(), None, "Guest 1234", false);

    assert_eq!(snapshot.len(), 2);
    assert_eq!(registry.get_authenticated_user_count(setlist_id), 1);
    let guest = snapshot.iter().find(|p| !p.is_authenticated).unwrap();
    assert_eq!(guest.user_id, None);
    assert_eq!(guest.user_name, "Guest 1234");
}

#[test]
fn add_user_same_connection_overwrites() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();

    registry.add_user(setlist_id, conn, None, "First", false);
    let snapshot = registry.add_user(setlist_id, conn, None, "Second", false);

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].user_name, "Second");
}

#[test]
fn get_presence_untracked_setlist_is_empty() {
    let registry = registry();
    assert!(registry.get_presence(Uuid::new_v4()).is_empty());
}

#[test]
fn setlists_are_isolated() {
    let registry = registry();
    let s1 = Uuid::new_v4();
    let s2 = Uuid::new_v4();

    registry.add_user(s1, Uuid::new_v4(), None, "On S1", false);

    assert_eq!(registry.get_presence(s1).len(), 1);
    assert!(registry.get_presence(s2).is_empty());
}

// =============================================================================
// remove_user
// =============================================================================

#[test]
fn remove_user_returns_remaining_snapshot() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn_a = Uuid::new_v4();
    let conn_b = Uuid::new_v4();

    registry.add_user(setlist_id, conn_a, Some(Uuid::new_v4()), "Alice", true);
    registry.add_user(setlist_id, conn_b, None, "Guest", false);

    let snapshot = registry.remove_user(setlist_id, conn_a);
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].connection_id, conn_b);
}

#[test]
fn remove_last_user_evicts_setlist_key() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();

    registry.add_user(setlist_id, conn, None, "Solo", false);
    assert_eq!(registry.tracked_setlist_count(), 1);

    let snapshot = registry.remove_user(setlist_id, conn);
    assert!(snapshot.is_empty());
    assert_eq!(registry.tracked_setlist_count(), 0);
}

#[test]
fn remove_user_untracked_setlist_is_noop() {
    let registry = registry();
    let snapshot = registry.remove_user(Uuid::new_v4(), Uuid::new_v4());
    assert!(snapshot.is_empty());
    assert_eq!(registry.tracked_setlist_count(), 0);
}

#[test]
fn repeated_open_close_cycles_stay_bounded() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();

    for _ in 0..1000 {
        let conn = Uuid::new_v4();
        registry.add_user(setlist_id, conn, None, "Churn", false);
        registry.remove_user(setlist_id, conn);
    }

    assert_eq!(registry.tracked_setlist_count(), 0);
    assert!(registry.get_presence(setlist_id).is_empty());
}

#[test]
fn presence_ids_match_added_not_yet_removed() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conns: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

    for conn in &conns {
        registry.add_user(setlist_id, *conn, None, "N", false);
    }
    registry.remove_user(setlist_id, conns[1]);
    registry.remove_user(setlist_id, conns[3]);

    let mut present: Vec<Uuid> = registry
        .get_presence(setlist_id)
        .iter()
        .map(|p| p.connection_id)
        .collect();
    present.sort();
    let mut expected = vec![conns[0], conns[2], conns[4]];
    expected.sort();
    assert_eq!(present, expected);
}

// =============================================================================
// update_editing_status
// =============================================================================

#[test]
fn update_editing_status_toggles_flag() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();

    registry.add_user(setlist_id, conn, Some(Uuid::new_v4()), "Alice", true);

    let updated = registry.update_editing_status(setlist_id, conn, true).unwrap();
    assert!(updated.is_editing);

    let editing = registry.get_editing_users(setlist_id);
    assert_eq!(editing.len(), 1);
    assert_eq!(editing[0].connection_id, conn);

    registry.update_editing_status(setlist_id, conn, false).unwrap();
    assert!(registry.get_editing_users(setlist_id).is_empty());
}

#[test]
fn update_editing_status_unknown_connection_returns_none() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    registry.add_user(setlist_id, Uuid::new_v4(), None, "Someone", false);

    let result = registry.update_editing_status(setlist_id, Uuid::new_v4(), true);
    assert!(result.is_none());
    // Must not have created an entry as a side effect.
    assert_eq!(registry.get_presence(setlist_id).len(), 1);
}

#[test]
fn update_editing_status_unknown_setlist_returns_none() {
    let registry = registry();
    assert!(registry
        .update_editing_status(Uuid::new_v4(), Uuid::new_v4(), true)
        .is_none());
    assert_eq!(registry.tracked_setlist_count(), 0);
}

// =============================================================================
// derived queries
// =============================================================================

#[test]
fn authenticated_count_ignores_guests() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();

    registry.add_user(setlist_id, Uuid::new_v4(), Some(Uuid::new_v4()), "A", true);
    registry.add_user(setlist_id, Uuid::new_v4(), Some(Uuid::new_v4()), "B", true);
    registry.add_user(setlist_id, Uuid::new_v4(), None, "Guest", false);

    assert_eq!(registry.get_authenticated_user_count(setlist_id), 2);
}

#[test]
fn get_user_finds_entry() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();

    registry.add_user(setlist_id, conn, None, "Lookup", false);

    let found = registry.get_user(setlist_id, conn).unwrap();
    assert_eq!(found.user_name, "Lookup");
    assert!(registry.get_user(setlist_id, Uuid::new_v4()).is_none());
}

// =============================================================================
// stale sweep
// =============================================================================

#[test]
fn sweep_stale_evicts_idle_entries() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();

    registry.add_user(setlist_id, conn, None, "Idle", false);
    std::thread::sleep(Duration::from_millis(2));

    // Zero idle allowance: everything not touched "now" is stale.
    let evicted = registry.sweep_stale(Duration::ZERO);
    assert_eq!(evicted, vec![(setlist_id, conn)]);
    assert_eq!(registry.tracked_setlist_count(), 0);
}

#[test]
fn sweep_stale_keeps_fresh_entries() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();

    registry.add_user(setlist_id, conn, None, "Fresh", false);

    let evicted = registry.sweep_stale(Duration::from_secs(300));
    assert!(evicted.is_empty());
    assert_eq!(registry.get_presence(setlist_id).len(), 1);
}

#[test]
fn touch_refreshes_last_seen() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();

    registry.add_user(setlist_id, conn, None, "Active", false);
    let before = registry.get_user(setlist_id, conn).unwrap().last_seen;
    std::thread::sleep(std::time::Duration::from_millis(5));
    registry.touch(setlist_id, conn);
    let after = registry.get_user(setlist_id, conn).unwrap().last_seen;

    assert!(after > before);
}

// =============================================================================
// serialization (wire shape)
// =============================================================================

#[test]
fn presence_serializes_camel_case_without_last_seen() {
    let registry = registry();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();
    registry.add_user(setlist_id, conn, None, "Wire", false);

    let entry = registry.get_user(setlist_id, conn).unwrap();
    let json = serde_json::to_value(&entry).unwrap();

    assert_eq!(json["connectionId"], serde_json::json!(conn));
    assert_eq!(json["userId"], serde_json::Value::Null);
    assert_eq!(json["userName"], "Wire");
    assert_eq!(json["isAuthenticated"], false);
    assert_eq!(json["isEditing"], false);
    assert!(json["joinedAt"].as_str().unwrap().contains('T'));
    assert!(json.get("lastSeen").is_none());
}
