//! Event-level integration tests: drive the full client event router
//! through the public API with in-process sockets.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use doodleduel_server::auth::SessionTokens;
use doodleduel_server::protocol::{
    ClientEvent, ErrorCode, GameMode, RoomSettings, ServerEvent, SocketId,
};
use doodleduel_server::server::{GameServer, ServerConfig};
use doodleduel_server::voice::NullVoiceRelay;
use doodleduel_server::wallet::InMemoryWallet;
use doodleduel_server::words::InMemoryWordCatalog;

const TEST_SECRET: &str = "integration-test-secret-0123456789";

struct Client {
    socket_id: SocketId,
    rx: mpsc::Receiver<Arc<ServerEvent>>,
}

impl Client {
    async fn expect<F>(&mut self, description: &str, mut predicate: F) -> Arc<ServerEvent>
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        loop {
            let event = timeout(Duration::from_secs(2), self.rx.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for {description}"))
                .unwrap_or_else(|| panic!("socket closed while waiting for {description}"));
            if predicate(&event) {
                return event;
            }
        }
    }

    fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

async fn start_server() -> (Arc<GameServer>, SessionTokens) {
    let tokens = SessionTokens::new(TEST_SECRET);
    let server = GameServer::new(
        ServerConfig::default(),
        tokens.clone(),
        Arc::new(InMemoryWordCatalog::with_builtin_words()),
        Arc::new(InMemoryWallet::new(500)),
        Arc::new(NullVoiceRelay),
    )
    .await
    .expect("server should construct");
    server.startup().await.expect("startup recovery should pass");
    (server, tokens)
}

async fn connect(server: &Arc<GameServer>) -> Client {
    let (tx, rx) = mpsc::channel(256);
    let socket_id = server.register_socket(tx);
    Client { socket_id, rx }
}

async fn connect_authenticated(
    server: &Arc<GameServer>,
    tokens: &SessionTokens,
    user_id: i64,
) -> Client {
    let mut client = connect(server).await;
    server
        .handle_client_event(
            client.socket_id,
            ClientEvent::Authenticate {
                token: tokens.issue(user_id, 3600),
            },
        )
        .await;
    client
        .expect("authenticated ack", |event| {
            matches!(event, ServerEvent::Authenticated { .. })
        })
        .await;
    client
}

#[tokio::test]
async fn test_invalid_token_is_rejected() {
    let (server, _tokens) = start_server().await;
    let mut client = connect(&server).await;

    server
        .handle_client_event(
            client.socket_id,
            ClientEvent::Authenticate {
                token: "garbage".to_string(),
            },
        )
        .await;
    client
        .expect("auth rejection", |event| {
            matches!(
                event,
                ServerEvent::Error {
                    code: ErrorCode::NotAuthenticated,
                    ..
                }
            )
        })
        .await;
}

#[tokio::test]
async fn test_state_changing_events_require_auth() {
    let (server, _tokens) = start_server().await;
    let mut client = connect(&server).await;

    server
        .handle_client_event(
            client.socket_id,
            ClientEvent::JoinRoom {
                room_id: None,
                room_code: Some("ABCDE".to_string()),
                team: None,
            },
        )
        .await;
    client
        .expect("not_authenticated", |event| {
            matches!(
                event,
                ServerEvent::Error {
                    code: ErrorCode::NotAuthenticated,
                    ..
                }
            )
        })
        .await;
}

#[tokio::test]
async fn test_join_gate_blocks_until_startup_completes() {
    let tokens = SessionTokens::new(TEST_SECRET);
    let server = GameServer::new(
        ServerConfig::default(),
        tokens.clone(),
        Arc::new(InMemoryWordCatalog::with_builtin_words()),
        Arc::new(InMemoryWallet::new(500)),
        Arc::new(NullVoiceRelay),
    )
    .await
    .unwrap();
    // No startup() yet: the gate is closed.
    let mut client = connect_authenticated(&server, &tokens, 1).await;

    server
        .handle_client_event(
            client.socket_id,
            ClientEvent::JoinRoom {
                room_id: None,
                room_code: Some("ABCDE".to_string()),
                team: None,
            },
        )
        .await;
    client
        .expect("server_syncing", |event| {
            matches!(event, ServerEvent::ServerSyncing)
        })
        .await;
}

#[tokio::test]
async fn test_join_unknown_room_code() {
    let (server, tokens) = start_server().await;
    let mut client = connect_authenticated(&server, &tokens, 1).await;

    server
        .handle_client_event(
            client.socket_id,
            ClientEvent::JoinRoom {
                room_id: None,
                room_code: Some("ZZZZZ".to_string()),
                team: None,
            },
        )
        .await;
    client
        .expect("room_not_found", |event| {
            matches!(
                event,
                ServerEvent::Error {
                    code: ErrorCode::RoomNotFound,
                    ..
                }
            )
        })
        .await;
}

#[tokio::test]
async fn test_join_and_chat_roundtrip() {
    let (server, tokens) = start_server().await;
    let room = server
        .store()
        .create_room(1, 8, true, GameMode::Solo, RoomSettings::default())
        .await
        .unwrap();

    let mut alice = connect_authenticated(&server, &tokens, 1).await;
    let mut bob = connect_authenticated(&server, &tokens, 2).await;

    for client in [&alice, &bob] {
        server
            .handle_client_event(
                client.socket_id,
                ClientEvent::JoinRoom {
                    room_id: None,
                    room_code: Some(room.code.clone()),
                    team: None,
                },
            )
            .await;
    }
    alice
        .expect("alice joins", |event| {
            matches!(event, ServerEvent::RoomJoined(_))
        })
        .await;
    bob.expect("bob joins", |event| {
        matches!(event, ServerEvent::RoomJoined(_))
    })
    .await;

    server
        .handle_client_event(
            bob.socket_id,
            ClientEvent::ChatMessage {
                room_id: Some(room.id),
                room_code: None,
                content: "hello room".to_string(),
            },
        )
        .await;
    let line = alice
        .expect("chat broadcast", |event| {
            matches!(event, ServerEvent::ChatMessage(_))
        })
        .await;
    match line.as_ref() {
        ServerEvent::ChatMessage(line) => {
            assert_eq!(line.user_id, 2);
            assert_eq!(line.content, "hello room");
        }
        _ => unreachable!(),
    }

    // The line was persisted: a latecomer sees it replayed on join.
    let mut carol = connect_authenticated(&server, &tokens, 3).await;
    server
        .handle_client_event(
            carol.socket_id,
            ClientEvent::JoinRoom {
                room_id: Some(room.id),
                room_code: None,
                team: None,
            },
        )
        .await;
    carol
        .expect("chat replay", |event| {
            matches!(event, ServerEvent::ChatMessage(line) if line.content == "hello room")
        })
        .await;
}

#[tokio::test]
async fn test_settings_guards() {
    let (server, tokens) = start_server().await;
    let room = server
        .store()
        .create_room(1, 8, true, GameMode::Solo, RoomSettings::default())
        .await
        .unwrap();
    let mut owner = connect_authenticated(&server, &tokens, 1).await;
    let mut guest = connect_authenticated(&server, &tokens, 2).await;

    for client in [&owner, &guest] {
        server
            .handle_client_event(
                client.socket_id,
                ClientEvent::JoinRoom {
                    room_id: Some(room.id),
                    room_code: None,
                    team: None,
                },
            )
            .await;
    }
    owner.drain();
    guest.drain();

    // Non-owner cannot touch settings.
    server
        .handle_client_event(
            guest.socket_id,
            ClientEvent::UpdateSettings {
                room_id: room.id,
                settings: doodleduel_server::protocol::SettingsPatch {
                    target_points: Some(100),
                    ..Default::default()
                },
            },
        )
        .await;
    guest
        .expect("owner guard", |event| {
            matches!(
                event,
                ServerEvent::Error {
                    code: ErrorCode::OnlyOwnerCanUpdateSettings,
                    ..
                }
            )
        })
        .await;

    // Owner update broadcasts to the room.
    server
        .handle_client_event(
            owner.socket_id,
            ClientEvent::UpdateSettings {
                room_id: room.id,
                settings: doodleduel_server::protocol::SettingsPatch {
                    target_points: Some(100),
                    ..Default::default()
                },
            },
        )
        .await;
    guest
        .expect("settings broadcast", |event| {
            matches!(
                event,
                ServerEvent::SettingsUpdated { settings, .. } if settings.target_points == 100
            )
        })
        .await;

    // Invalid max_players is rejected.
    server
        .handle_client_event(
            owner.socket_id,
            ClientEvent::UpdateSettings {
                room_id: room.id,
                settings: doodleduel_server::protocol::SettingsPatch {
                    max_players: Some(50),
                    ..Default::default()
                },
            },
        )
        .await;
    owner
        .expect("invalid_max_players", |event| {
            matches!(
                event,
                ServerEvent::Error {
                    code: ErrorCode::InvalidMaxPlayers,
                    ..
                }
            )
        })
        .await;
}

#[tokio::test]
async fn test_team_selection_guards() {
    let (server, tokens) = start_server().await;
    let solo_room = server
        .store()
        .create_room(1, 8, true, GameMode::Solo, RoomSettings::default())
        .await
        .unwrap();
    let mut client = connect_authenticated(&server, &tokens, 1).await;
    server
        .handle_client_event(
            client.socket_id,
            ClientEvent::JoinRoom {
                room_id: Some(solo_room.id),
                room_code: None,
                team: None,
            },
        )
        .await;
    client.drain();

    server
        .handle_client_event(
            client.socket_id,
            ClientEvent::SelectTeam {
                room_id: solo_room.id,
                team: doodleduel_server::protocol::Team::Blue,
            },
        )
        .await;
    client
        .expect("not_team_mode", |event| {
            matches!(
                event,
                ServerEvent::Error {
                    code: ErrorCode::NotTeamMode,
                    ..
                }
            )
        })
        .await;
}

#[tokio::test]
async fn test_remove_participant_guards() {
    let (server, tokens) = start_server().await;
    let room = server
        .store()
        .create_room(1, 8, true, GameMode::Solo, RoomSettings::default())
        .await
        .unwrap();
    let mut owner = connect_authenticated(&server, &tokens, 1).await;
    let mut guest = connect_authenticated(&server, &tokens, 2).await;
    for client in [&owner, &guest] {
        server
            .handle_client_event(
                client.socket_id,
                ClientEvent::JoinRoom {
                    room_id: Some(room.id),
                    room_code: None,
                    team: None,
                },
            )
            .await;
    }
    owner.drain();
    guest.drain();

    server
        .handle_client_event(
            owner.socket_id,
            ClientEvent::RemoveParticipant {
                room_id: room.id,
                user_id: 1,
            },
        )
        .await;
    owner
        .expect("cannot_remove_self", |event| {
            matches!(
                event,
                ServerEvent::Error {
                    code: ErrorCode::CannotRemoveSelf,
                    ..
                }
            )
        })
        .await;

    server
        .handle_client_event(
            owner.socket_id,
            ClientEvent::RemoveParticipant {
                room_id: room.id,
                user_id: 2,
            },
        )
        .await;
    guest
        .expect("removed by owner", |event| {
            matches!(
                event,
                ServerEvent::PlayerRemoved {
                    user_id: 2,
                    reason: doodleduel_server::protocol::RemovalReason::RemovedByOwner,
                }
            )
        })
        .await;
    assert!(server
        .store()
        .get_participant(room.id, 2)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_events_after_room_deletion_return_room_not_found() {
    let (server, tokens) = start_server().await;
    let room = server
        .store()
        .create_room(1, 8, true, GameMode::Solo, RoomSettings::default())
        .await
        .unwrap();
    let mut owner = connect_authenticated(&server, &tokens, 1).await;
    let mut guest = connect_authenticated(&server, &tokens, 2).await;
    for client in [&owner, &guest] {
        server
            .handle_client_event(
                client.socket_id,
                ClientEvent::JoinRoom {
                    room_id: Some(room.id),
                    room_code: None,
                    team: None,
                },
            )
            .await;
    }
    guest.drain();

    // Owner leaves; the room dies with them.
    server
        .handle_client_event(
            owner.socket_id,
            ClientEvent::LeaveRoom {
                room_id: Some(room.id),
                room_code: None,
            },
        )
        .await;
    guest
        .expect("room_closed", |event| {
            matches!(event, ServerEvent::RoomClosed)
        })
        .await;

    server
        .handle_client_event(
            guest.socket_id,
            ClientEvent::ChatMessage {
                room_id: Some(room.id),
                room_code: None,
                content: "anyone there?".to_string(),
            },
        )
        .await;
    guest
        .expect("room_not_found after deletion", |event| {
            matches!(
                event,
                ServerEvent::Error {
                    code: ErrorCode::RoomNotFound,
                    ..
                }
            )
        })
        .await;
}
