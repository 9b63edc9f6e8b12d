mod support;

use std::time::Duration;

use roomsync_core::backend::BackendError;
use roomsync_core::AppAction;
use support::{backend, sign_in, wait_until};

#[test]
fn create_room_appears_once_and_confirms() {
    let backend = backend();
    let alice = sign_in(&backend, "u1", "Alice");
    let bob = sign_in(&backend, "u2", "Bob");

    alice.app.dispatch(AppAction::CreateRoom {
        name: "  design  ".into(),
        description: Some("pixels".into()),
    });
    wait_until("room confirmed", Duration::from_secs(2), || {
        let rooms = alice.state().rooms;
        rooms.len() == 1 && rooms[0].name == "design" && !rooms[0].is_pending
    });
    let room = alice.state().rooms[0].clone();
    assert_eq!(room.description.as_deref(), Some("pixels"));
    assert_eq!(room.created_by, "u1");
    assert!(backend.has_room(&room.id));

    // Other participants learn about it through the roster feed.
    wait_until("bob sees the room", Duration::from_secs(2), || {
        bob.state().rooms.iter().any(|r| r.id == room.id)
    });

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(alice.state().rooms.len(), 1);
}

#[test]
fn duplicate_or_rejected_room_is_not_kept() {
    let backend = backend();
    backend.seed_room("general", "u9");
    let alice = sign_in(&backend, "u1", "Alice");
    alice.wait_for_rooms(1);

    alice.app.dispatch(AppAction::CreateRoom {
        name: "general".into(),
        description: None,
    });
    wait_until("duplicate name toast", Duration::from_secs(2), || {
        alice.state().toast.is_some_and(|t| t.contains("already exists"))
    });
    assert_eq!(alice.state().rooms.len(), 1);

    backend.with_faults(|f| f.fail_next_create_room = Some(BackendError::Rejected("quota".into())));
    alice.app.dispatch(AppAction::CreateRoom {
        name: "overflow".into(),
        description: None,
    });
    wait_until("create failure toast", Duration::from_secs(2), || {
        alice
            .state()
            .toast
            .is_some_and(|t| t.contains("Create room failed"))
    });
    assert!(alice.state().rooms.iter().all(|r| r.name != "overflow"));
}

#[test]
fn deleting_active_room_clears_the_view() {
    let backend = backend();
    let room = backend.seed_room("general", "u1");
    let other = backend.seed_room("random", "u1");
    let alice = sign_in(&backend, "u1", "Alice");
    alice.open_room(&room.id, |_| true);

    alice.app.dispatch(AppAction::DeleteRoom {
        room_id: room.id.clone(),
    });
    wait_until("room removed", Duration::from_secs(2), || {
        let state = alice.state();
        state.current_room.is_none() && state.rooms.iter().all(|r| r.id != room.id)
    });
    wait_until("backend row gone", Duration::from_secs(2), || {
        !backend.has_room(&room.id)
    });
    assert_eq!(alice.state().rooms.len(), 1);
    assert_eq!(alice.state().rooms[0].id, other.id);
}

#[test]
fn failed_room_delete_restores_roster() {
    let backend = backend();
    let room = backend.seed_room("general", "u1");
    let alice = sign_in(&backend, "u1", "Alice");
    alice.wait_for_rooms(1);

    backend.with_faults(|f| f.fail_next_delete_room = Some(BackendError::Rejected("owner only".into())));
    alice.app.dispatch(AppAction::DeleteRoom {
        room_id: room.id.clone(),
    });
    wait_until("delete failure toast", Duration::from_secs(2), || {
        alice
            .state()
            .toast
            .is_some_and(|t| t.contains("Delete room failed"))
    });
    wait_until("roster restored", Duration::from_secs(2), || {
        alice.state().rooms.iter().any(|r| r.id == room.id)
    });
}

#[test]
fn room_deleted_elsewhere_leaves_the_view() {
    let backend = backend();
    let room = backend.seed_room("general", "u1");
    let alice = sign_in(&backend, "u1", "Alice");
    let bob = sign_in(&backend, "u2", "Bob");
    alice.open_room(&room.id, |_| true);
    bob.wait_for_rooms(1);

    bob.app.dispatch(AppAction::DeleteRoom {
        room_id: room.id.clone(),
    });
    wait_until("alice left deleted room", Duration::from_secs(2), || {
        let state = alice.state();
        state.current_room.is_none() && state.rooms.is_empty()
    });
}

#[test]
fn rooms_are_listed_oldest_first() {
    let backend = backend();
    let first = backend.seed_room("first", "u1");
    let second = backend.seed_room("second", "u1");
    let alice = sign_in(&backend, "u1", "Alice");
    alice.wait_for_rooms(2);

    let third = backend.seed_room("third", "u2");
    wait_until("roster insert applied", Duration::from_secs(2), || {
        alice.state().rooms.len() == 3
    });
    let ids: Vec<String> = alice.state().rooms.into_iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first.id, second.id, third.id]);
}
