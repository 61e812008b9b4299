use std::time::Duration;
use tokio::time::sleep;

use crate::protocol::{
    ErrorCode, GameMode, RoomStatus, RoundPhase, ServerEvent,
};

use super::phase_engine_tests::{connect, create_room, test_server};

#[tokio::test]
async fn test_single_session_evicts_previous_socket() {
    let server = test_server().await;

    let mut first = connect(&server, 5).await;
    let second = connect(&server, 5).await;

    assert_eq!(
        server.sessions().socket_for_user(5),
        Some(second.socket_id),
        "the newest socket owns the user"
    );
    assert!(
        !server.sessions().has_socket(first.socket_id),
        "the evicted socket is gone from the registry"
    );
    // The evicted socket's sender was dropped, which ends its write
    // task and closes the connection.
    assert!(first.rx.recv().await.is_none());
}

#[tokio::test]
async fn test_late_disconnect_does_not_evict_new_connection() {
    let server = test_server().await;

    let first = connect(&server, 5).await;
    let second = connect(&server, 5).await;

    // The stale socket's disconnect arrives after the new connection
    // took over; the user->socket entry must survive.
    server.handle_socket_disconnect(first.socket_id).await;
    assert_eq!(server.sessions().socket_for_user(5), Some(second.socket_id));
}

#[tokio::test]
async fn test_disconnect_grace_reconnect_keeps_seat() {
    let server = test_server().await;
    let owner = connect(&server, 10).await;
    let u = connect(&server, 20).await;
    let room = create_room(&server, 10, GameMode::Solo, 60, 0).await;
    server
        .handle_join_room(owner.socket_id, 10, Some(room.id), None, None)
        .await;
    server
        .handle_join_room(u.socket_id, 20, Some(room.id), None, None)
        .await;

    server.handle_socket_disconnect(u.socket_id).await;
    let seat = server
        .store()
        .get_participant(room.id, 20)
        .await
        .unwrap()
        .unwrap();
    assert!(seat.is_active, "the seat survives the disconnect");
    assert_eq!(seat.socket_id, None);
    assert!(server.sessions().has_grace_timer(room.id, 20));

    // Reconnect inside the window cancels the grace timer.
    let u2 = connect(&server, 20).await;
    server
        .handle_join_room(u2.socket_id, 20, Some(room.id), None, None)
        .await;
    assert!(!server.sessions().has_grace_timer(room.id, 20));

    // Long past the original grace window the seat is still live.
    sleep(Duration::from_millis(250)).await;
    let seat = server
        .store()
        .get_participant(room.id, 20)
        .await
        .unwrap()
        .unwrap();
    assert!(seat.is_active);
    assert_eq!(seat.socket_id, Some(u2.socket_id));
}

#[tokio::test]
async fn test_grace_expiry_releases_seat_and_broadcasts() {
    let server = test_server().await;
    let mut owner = connect(&server, 10).await;
    let u = connect(&server, 20).await;
    let room = create_room(&server, 10, GameMode::Solo, 60, 0).await;
    server
        .handle_join_room(owner.socket_id, 10, Some(room.id), None, None)
        .await;
    server
        .handle_join_room(u.socket_id, 20, Some(room.id), None, None)
        .await;

    owner.drain();
    server.handle_socket_disconnect(u.socket_id).await;
    sleep(Duration::from_millis(300)).await;

    let seat = server
        .store()
        .get_participant(room.id, 20)
        .await
        .unwrap()
        .unwrap();
    assert!(!seat.is_active, "grace expired without a reconnect");

    owner
        .expect_event("player_left broadcast", |event| {
            matches!(event, ServerEvent::PlayerLeft { user_id: 20 })
        })
        .await;
}

#[tokio::test]
async fn test_permanent_leave_shortens_grace() {
    let server = test_server().await;
    let owner = connect(&server, 10).await;
    let u = connect(&server, 20).await;
    let room = create_room(&server, 10, GameMode::Solo, 60, 0).await;
    server
        .handle_join_room(owner.socket_id, 10, Some(room.id), None, None)
        .await;
    server
        .handle_join_room(u.socket_id, 20, Some(room.id), None, None)
        .await;

    server.sessions().mark_leaving_permanently(u.socket_id);
    server.handle_socket_disconnect(u.socket_id).await;

    // Far sooner than the normal 100ms grace.
    sleep(Duration::from_millis(60)).await;
    let seat = server
        .store()
        .get_participant(room.id, 20)
        .await
        .unwrap()
        .unwrap();
    assert!(!seat.is_active, "announced leave uses the 1-tick grace");
}

#[tokio::test]
async fn test_rejoin_after_grace_during_playing_is_refused() {
    let server = test_server().await;
    let owner = connect(&server, 10).await;
    let u = connect(&server, 20).await;
    let room = create_room(&server, 10, GameMode::Solo, 60, 0).await;
    server
        .handle_join_room(owner.socket_id, 10, Some(room.id), None, None)
        .await;
    server
        .handle_join_room(u.socket_id, 20, Some(room.id), None, None)
        .await;

    server
        .store()
        .set_room_status(room.id, RoomStatus::Playing)
        .await
        .unwrap();
    server
        .store()
        .update_participant(
            room.id,
            20,
            Box::new(|p| {
                p.is_active = false;
                p.socket_id = None;
            }),
        )
        .await
        .unwrap();

    let mut u2 = connect(&server, 20).await;
    server
        .handle_join_room(u2.socket_id, 20, Some(room.id), None, None)
        .await;
    u2.expect_event("refusal after expired grace", |event| {
        matches!(
            event,
            ServerEvent::Error {
                code: ErrorCode::ExitedDueToInactivity,
                ..
            }
        )
    })
    .await;

    let seat = server
        .store()
        .get_participant(room.id, 20)
        .await
        .unwrap()
        .unwrap();
    assert!(!seat.is_active, "the lost seat stays lost");
}

#[tokio::test]
async fn test_duplicate_join_from_same_socket_suppressed() {
    let server = test_server().await;
    let mut owner = connect(&server, 10).await;
    let mut u = connect(&server, 20).await;
    let room = create_room(&server, 10, GameMode::Solo, 60, 0).await;
    server
        .handle_join_room(owner.socket_id, 10, Some(room.id), None, None)
        .await;

    server
        .handle_join_room(u.socket_id, 20, Some(room.id), None, None)
        .await;
    u.expect_event("first join succeeds", |event| {
        matches!(event, ServerEvent::RoomJoined(_))
    })
    .await;
    owner
        .expect_event("player_joined broadcast", |event| {
            matches!(event, ServerEvent::PlayerJoined { .. })
        })
        .await;
    owner.drain();
    u.drain();

    // The client retries on the same socket inside the lock TTL.
    server
        .handle_join_room(u.socket_id, 20, Some(room.id), None, None)
        .await;
    sleep(Duration::from_millis(50)).await;
    assert!(
        u.rx.try_recv().is_err(),
        "duplicate join produced no second room_joined"
    );
    assert!(
        owner.rx.try_recv().is_err(),
        "duplicate join produced no broadcast"
    );
}

#[tokio::test]
async fn test_resync_flow_suppresses_live_deltas_until_done() {
    let server = test_server().await;
    let mut drawer = connect(&server, 10).await;
    let viewer = connect(&server, 20).await;
    let room = create_room(&server, 10, GameMode::Solo, 60, 0).await;
    server
        .handle_join_room(drawer.socket_id, 10, Some(room.id), None, None)
        .await;
    server
        .handle_join_room(viewer.socket_id, 20, Some(room.id), None, None)
        .await;

    // Mid-game drawing state, hand-built.
    server
        .store()
        .transition_phase(
            room.id,
            None,
            Box::new(|room| {
                room.status = RoomStatus::Playing;
                room.current_round = 1;
                room.current_drawer_id = Some(10);
                room.drawn_user_ids.insert(10);
                room.current_word = Some("tree".to_string());
                room.enter_phase(
                    RoundPhase::Drawing,
                    Some(chrono::Utc::now() + chrono::Duration::seconds(60)),
                );
            }),
        )
        .await
        .unwrap()
        .unwrap();
    server.store().set_drawer(room.id, Some(10)).await.unwrap();

    // The viewer drops and comes back on a new socket.
    server.handle_socket_disconnect(viewer.socket_id).await;
    let mut viewer2 = connect(&server, 20).await;
    drawer.drain();
    server
        .handle_join_room(viewer2.socket_id, 20, Some(room.id), None, None)
        .await;

    // The drawer is asked for a snapshot, addressed at the new socket.
    let request = drawer
        .expect_event("canvas request to drawer", |event| {
            matches!(event, ServerEvent::RequestCanvasData { .. })
        })
        .await;
    match request.as_ref() {
        ServerEvent::RequestCanvasData {
            target_socket_id, ..
        } => assert_eq!(*target_socket_id, Some(viewer2.socket_id)),
        _ => unreachable!(),
    }

    viewer2.drain();

    // Live deltas skip the resyncing socket.
    server
        .handle_drawing_data(
            drawer.socket_id,
            10,
            Some(room.id),
            None,
            serde_json::json!([{"x": 1, "y": 2}]),
            false,
            None,
            7,
        )
        .await;
    sleep(Duration::from_millis(50)).await;
    let got_delta = loop {
        match viewer2.rx.try_recv() {
            Ok(event) => {
                if matches!(event.as_ref(), ServerEvent::DrawingData { .. }) {
                    break true;
                }
            }
            Err(_) => break false,
        }
    };
    assert!(!got_delta, "resyncing sockets receive no live deltas");

    // The snapshot arrives through the relay.
    server
        .handle_send_canvas_data(
            drawer.socket_id,
            10,
            &room.code,
            Some(20),
            Some(viewer2.socket_id),
            serde_json::json!([{"x": 1, "y": 2}]),
            7,
            55,
        )
        .await;
    viewer2
        .expect_event("canvas_resume snapshot", |event| {
            matches!(
                event,
                ServerEvent::CanvasResume {
                    last_sequence: 7,
                    remaining_time: 55,
                    ..
                }
            )
        })
        .await;

    // After resync_done the live stream resumes.
    server.handle_resync_done(viewer2.socket_id);
    server
        .handle_drawing_data(
            drawer.socket_id,
            10,
            Some(room.id),
            None,
            serde_json::json!([{"x": 3, "y": 4}]),
            false,
            None,
            8,
        )
        .await;
    viewer2
        .expect_event("live delta after resync", |event| {
            matches!(event, ServerEvent::DrawingData { sequence: 8, .. })
        })
        .await;
}

#[tokio::test]
async fn test_clear_canvas_bumps_version() {
    let server = test_server().await;
    let drawer = connect(&server, 10).await;
    let mut viewer = connect(&server, 20).await;
    let room = create_room(&server, 10, GameMode::Solo, 60, 0).await;
    server
        .handle_join_room(drawer.socket_id, 10, Some(room.id), None, None)
        .await;
    server
        .handle_join_room(viewer.socket_id, 20, Some(room.id), None, None)
        .await;
    server
        .store()
        .transition_phase(
            room.id,
            None,
            Box::new(|room| {
                room.status = RoomStatus::Playing;
                room.current_drawer_id = Some(10);
                room.current_word = Some("tree".to_string());
                room.enter_phase(
                    RoundPhase::Drawing,
                    Some(chrono::Utc::now() + chrono::Duration::seconds(60)),
                );
            }),
        )
        .await
        .unwrap()
        .unwrap();

    viewer.drain();
    server
        .handle_clear_canvas(drawer.socket_id, 10, Some(room.id), None)
        .await;
    viewer
        .expect_event("canvas_cleared", |event| {
            matches!(event, ServerEvent::CanvasCleared { canvas_version: 1 })
        })
        .await;
}
