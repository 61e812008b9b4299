//! End-to-end tests over a real WebSocket connection.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use doodleduel_server::auth::SessionTokens;
use doodleduel_server::protocol::{GameMode, RoomSettings};
use doodleduel_server::server::{GameServer, ServerConfig};
use doodleduel_server::voice::NullVoiceRelay;
use doodleduel_server::wallet::InMemoryWallet;
use doodleduel_server::websocket;
use doodleduel_server::words::InMemoryWordCatalog;

const TEST_SECRET: &str = "ws-e2e-test-secret-0123456789";

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (Arc<GameServer>, SessionTokens, String) {
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
    server.startup().await.expect("startup should pass");

    let app = websocket::create_router("*").with_state(server.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app.into_make_service()).await;
    });

    (server, tokens, format!("ws://{addr}/ws"))
}

async fn ws_connect(url: &str) -> WsClient {
    let (stream, _) = connect_async(url).await.expect("websocket connects");
    stream
}

async fn send_event(client: &mut WsClient, event: Value) {
    client
        .send(Message::Text(event.to_string().into()))
        .await
        .expect("send succeeds");
}

/// Read frames until one matches the wanted `type` tag.
async fn expect_type(client: &mut WsClient, wanted: &str) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(3), client.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {wanted}"))
            .unwrap_or_else(|| panic!("connection closed waiting for {wanted}"))
            .expect("read succeeds");
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(&text).expect("valid event JSON");
            if value["type"] == wanted {
                return value;
            }
        }
    }
}

#[tokio::test]
async fn test_authenticate_then_join_over_websocket() {
    let (server, tokens, url) = spawn_server().await;
    let room = server
        .store()
        .create_room(1, 8, true, GameMode::Solo, RoomSettings::default())
        .await
        .unwrap();

    let mut client = ws_connect(&url).await;
    send_event(
        &mut client,
        json!({"type": "authenticate", "data": {"token": tokens.issue(1, 3600)}}),
    )
    .await;
    let authed = expect_type(&mut client, "authenticated").await;
    assert_eq!(authed["data"]["user_id"], 1);

    send_event(
        &mut client,
        json!({"type": "join_room", "data": {"room_code": room.code}}),
    )
    .await;
    let joined = expect_type(&mut client, "room_joined").await;
    assert_eq!(joined["data"]["room_code"], room.code.as_str());
    assert_eq!(joined["data"]["status"], "lobby");
    assert_eq!(joined["data"]["participants"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unauthenticated_events_rejected_over_websocket() {
    let (_server, _tokens, url) = spawn_server().await;
    let mut client = ws_connect(&url).await;

    send_event(
        &mut client,
        json!({"type": "join_room", "data": {"room_code": "ABCDE"}}),
    )
    .await;
    let error = expect_type(&mut client, "error").await;
    assert_eq!(error["data"]["code"], "not_authenticated");
}

#[tokio::test]
async fn test_chat_broadcast_between_real_sockets() {
    let (server, tokens, url) = spawn_server().await;
    let room = server
        .store()
        .create_room(1, 8, true, GameMode::Solo, RoomSettings::default())
        .await
        .unwrap();

    let mut alice = ws_connect(&url).await;
    send_event(
        &mut alice,
        json!({"type": "authenticate", "data": {"token": tokens.issue(1, 3600)}}),
    )
    .await;
    expect_type(&mut alice, "authenticated").await;
    send_event(
        &mut alice,
        json!({"type": "join_room", "data": {"room_code": room.code}}),
    )
    .await;
    expect_type(&mut alice, "room_joined").await;

    let mut bob = ws_connect(&url).await;
    send_event(
        &mut bob,
        json!({"type": "authenticate", "data": {"token": tokens.issue(2, 3600)}}),
    )
    .await;
    expect_type(&mut bob, "authenticated").await;
    send_event(
        &mut bob,
        json!({"type": "join_room", "data": {"room_code": room.code}}),
    )
    .await;
    expect_type(&mut bob, "room_joined").await;

    send_event(
        &mut bob,
        json!({"type": "chat_message", "data": {"room_code": room.code, "content": "hi!"}}),
    )
    .await;
    let line = expect_type(&mut alice, "chat_message").await;
    assert_eq!(line["data"]["user_id"], 2);
    assert_eq!(line["data"]["content"], "hi!");
}

#[tokio::test]
async fn test_second_connection_evicts_first() {
    let (_server, tokens, url) = spawn_server().await;

    let mut first = ws_connect(&url).await;
    send_event(
        &mut first,
        json!({"type": "authenticate", "data": {"token": tokens.issue(7, 3600)}}),
    )
    .await;
    expect_type(&mut first, "authenticated").await;

    let mut second = ws_connect(&url).await;
    send_event(
        &mut second,
        json!({"type": "authenticate", "data": {"token": tokens.issue(7, 3600)}}),
    )
    .await;
    expect_type(&mut second, "authenticated").await;

    // The first connection is force-closed by the single-session rule.
    let closed = timeout(Duration::from_secs(3), async {
        loop {
            match first.next().await {
                None => break true,
                Some(Ok(Message::Close(_))) => break true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break true,
            }
        }
    })
    .await
    .expect("first connection should close promptly");
    assert!(closed);
}
