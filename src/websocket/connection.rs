use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{ClientEvent, ServerEvent};
use crate::server::GameServer;

pub(super) async fn handle_socket(socket: WebSocket, server: Arc<GameServer>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Arc<ServerEvent>>(256);

    let socket_id = server.register_socket(tx);

    // Outgoing: drain the event queue onto the wire. The task ends when
    // the registry drops the sender (disconnect or single-session
    // eviction), which also closes the connection.
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(event.as_ref()) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(error = %err, "Failed to serialize server event");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let max_message_size = server.config().max_message_size;
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(%socket_id, error = %err, "WebSocket read error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                if text.len() > max_message_size {
                    tracing::warn!(
                        %socket_id,
                        size = text.len(),
                        max = max_message_size,
                        "Frame exceeds size limit; dropped"
                    );
                    continue;
                }
                match serde_json::from_str::<ClientEvent>(&text) {
                    Ok(event) => {
                        server.handle_client_event(socket_id, event).await;
                    }
                    Err(err) => {
                        tracing::debug!(%socket_id, error = %err, "Unparseable client frame dropped");
                    }
                }
            }
            Message::Close(_) => break,
            // Ping/pong frames are answered by the protocol layer.
            _ => {}
        }
    }

    server.handle_socket_disconnect(socket_id).await;
    send_task.abort();
}
