use super::*;
use crate::state::test_helpers;
use tokio::time::{Duration, timeout};

async fn recv_event(rx: &mut broadcast::Receiver<BroadcastEvent>) -> BroadcastEvent {
    timeout(Duration::from_millis(500), rx.recv())
        .await
        .expect("broadcast receive timed out")
        .expect("broadcast channel closed unexpectedly")
}

async fn assert_no_event(rx: &mut broadcast::Receiver<BroadcastEvent>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no broadcast event"
    );
}

fn alice() -> ConnectionIdentity {
    ConnectionIdentity {
        user_id: Some(Uuid::new_v4()),
        user_name: "Alice".into(),
        is_authenticated: true,
    }
}

fn guest() -> ConnectionIdentity {
    ConnectionIdentity { user_id: None, user_name: "Guest 4242".into(), is_authenticated: false }
}

// =============================================================================
// open
// =============================================================================

#[tokio::test]
async fn open_registers_presence_and_returns_snapshot() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();
    let identity = alice();

    let (_events, initial) = open_connection(&state, setlist_id, conn, &identity);

    let presence = state.presence.get_presence(setlist_id);
    assert_eq!(presence.len(), 1);
    assert_eq!(presence[0].connection_id, conn);
    assert_eq!(presence[0].user_id, identity.user_id);
    assert_eq!(presence[0].user_name, "Alice");
    assert!(presence[0].is_authenticated);
    assert!(!presence[0].is_editing);

    let json = serde_json::to_value(&initial).unwrap();
    assert_eq!(json["type"], "presence-update");
    assert_eq!(json["presence"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn open_claims_channel_and_notifies_existing_viewers() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();

    let (mut first_events, _) = open_connection(&state, setlist_id, Uuid::new_v4(), &alice());
    // The opener's own join broadcast arrives on its subscription too.
    assert_eq!(recv_event(&mut first_events).await.kind(), "presence-update");

    let (_second_events, _) = open_connection(&state, setlist_id, Uuid::new_v4(), &guest());

    let event = recv_event(&mut first_events).await;
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "presence-update");
    assert_eq!(json["presence"].as_array().unwrap().len(), 2);
    assert!(state.channels.has_publisher(setlist_id));
}

#[tokio::test]
async fn authenticated_count_tracks_mixed_viewers() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();

    open_connection(&state, setlist_id, Uuid::new_v4(), &alice());
    open_connection(&state, setlist_id, Uuid::new_v4(), &guest());

    assert_eq!(state.presence.get_presence(setlist_id).len(), 2);
    assert_eq!(state.presence.get_authenticated_user_count(setlist_id), 1);
}

// =============================================================================
// editing messages
// =============================================================================

#[tokio::test]
async fn editing_message_toggles_and_broadcasts() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();
    let (mut events, _) = open_connection(&state, setlist_id, conn, &alice());
    recv_event(&mut events).await; // join broadcast

    handle_client_text(&state, setlist_id, conn, r#"{"type":"editing","isEditing":true}"#);

    let editing = state.presence.get_editing_users(setlist_id);
    assert_eq!(editing.len(), 1);
    assert_eq!(editing[0].connection_id, conn);

    let event = recv_event(&mut events).await;
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "presence-update");
    assert_eq!(json["presence"][0]["isEditing"], true);
}

#[tokio::test]
async fn editing_false_clears_flag() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();
    let (mut events, _) = open_connection(&state, setlist_id, conn, &alice());
    recv_event(&mut events).await;

    handle_client_text(&state, setlist_id, conn, r#"{"type":"editing","isEditing":true}"#);
    recv_event(&mut events).await;
    handle_client_text(&state, setlist_id, conn, r#"{"type":"editing","isEditing":false}"#);

    assert!(state.presence.get_editing_users(setlist_id).is_empty());
}

#[tokio::test]
async fn malformed_message_is_ignored() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let conn = Uuid::new_v4();
    let (mut events, _) = open_connection(&state, setlist_id, conn, &alice());
    recv_event(&mut events).await;

    handle_client_text(&state, setlist_id, conn, "not json at all");
    handle_client_text(&state, setlist_id, conn, r#"{"type":"unknown-kind"}"#);
    handle_client_text(&state, setlist_id, conn, r#"{"type":"editing"}"#);

    // No broadcast fired and presence is untouched.
    assert_no_event(&mut events).await;
    assert_eq!(state.presence.get_presence(setlist_id).len(), 1);
    assert!(state.presence.get_editing_users(setlist_id).is_empty());
}

#[tokio::test]
async fn editing_from_untracked_connection_is_noop() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let (mut events, _) = open_connection(&state, setlist_id, Uuid::new_v4(), &alice());
    recv_event(&mut events).await;

    // A connection id the registry has never seen (e.g. already swept).
    handle_client_text(&state, setlist_id, Uuid::new_v4(), r#"{"type":"editing","isEditing":true}"#);

    assert_no_event(&mut events).await;
    assert!(state.presence.get_editing_users(setlist_id).is_empty());
}

// =============================================================================
// close
// =============================================================================

#[tokio::test]
async fn close_notifies_survivors() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let conn_a = Uuid::new_v4();
    let conn_b = Uuid::new_v4();

    open_connection(&state, setlist_id, conn_a, &alice());
    let (mut b_events, _) = open_connection(&state, setlist_id, conn_b, &guest());
    recv_event(&mut b_events).await; // own join broadcast

    close_connection(&state, setlist_id, conn_a);

    let event = recv_event(&mut b_events).await;
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "presence-update");
    let roster = json["presence"].as_array().unwrap();
    assert_eq!(roster.len(), 1);
    assert_eq!(roster[0]["connectionId"], serde_json::json!(conn_b));
}

#[tokio::test]
async fn last_close_unregisters_channel_and_releases_state() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let conn_a = Uuid::new_v4();
    let conn_b = Uuid::new_v4();

    open_connection(&state, setlist_id, conn_a, &alice());
    open_connection(&state, setlist_id, conn_b, &guest());

    close_connection(&state, setlist_id, conn_a);
    assert!(state.channels.has_publisher(setlist_id));

    close_connection(&state, setlist_id, conn_b);

    assert!(state.presence.get_presence(setlist_id).is_empty());
    assert_eq!(state.presence.tracked_setlist_count(), 0);
    assert!(!state.channels.has_publisher(setlist_id));

    // Publishing after full teardown is a silent no-op.
    state.channels.presence_update(setlist_id, Vec::new());
}

#[tokio::test]
async fn close_for_untracked_setlist_is_safe() {
    let state = test_helpers::test_app_state();
    close_connection(&state, Uuid::new_v4(), Uuid::new_v4());
    assert_eq!(state.presence.tracked_setlist_count(), 0);
}

#[tokio::test]
async fn reconnect_is_a_fresh_connection() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let identity = alice();

    let first_conn = Uuid::new_v4();
    open_connection(&state, setlist_id, first_conn, &identity);
    close_connection(&state, setlist_id, first_conn);

    let second_conn = Uuid::new_v4();
    open_connection(&state, setlist_id, second_conn, &identity);

    let presence = state.presence.get_presence(setlist_id);
    assert_eq!(presence.len(), 1);
    assert_eq!(presence[0].connection_id, second_conn);
    assert!(!presence[0].is_editing, "editing flag does not survive reconnect");
}

// =============================================================================
// domain events reach viewers
// =============================================================================

#[tokio::test]
async fn domain_publish_reaches_open_connections() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();
    let (mut events, _) = open_connection(&state, setlist_id, Uuid::new_v4(), &guest());
    recv_event(&mut events).await; // join broadcast

    state.channels.item_deleted(
        setlist_id,
        Uuid::new_v4(),
        &crate::event::Actor::new(Some(Uuid::new_v4()), Some("Alice".into())),
    );

    let event = recv_event(&mut events).await;
    assert_eq!(event.kind(), "item-deleted");
}

#[tokio::test]
async fn domain_publish_with_no_viewers_is_skipped() {
    let state = test_helpers::test_app_state();
    let setlist_id = Uuid::new_v4();

    // No socket ever opened on this setlist: publish must not panic and must
    // not create presence state.
    state.channels.item_deleted(setlist_id, Uuid::new_v4(), &crate::event::Actor::default());

    assert!(state.presence.get_presence(setlist_id).is_empty());
    assert!(!state.channels.has_publisher(setlist_id));
}
