use std::sync::Arc;

use crate::protocol::{ErrorCode, RoomId, SocketId, UserId};
use crate::server::GameServer;

impl GameServer {
    pub(super) async fn handle_set_ready(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: Option<RoomId>,
        room_code: Option<&str>,
        ready: bool,
    ) {
        let room = match self.resolve_room(room_id, room_code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve room for ready toggle");
                return;
            }
        };

        if !room.status.is_pregame() {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        }

        let is_member = self
            .store()
            .get_participant(room.id, user_id)
            .await
            .ok()
            .flatten()
            .is_some_and(|p| p.is_active && !p.is_banned());
        if !is_member {
            self.send_error(socket_id, ErrorCode::RoomNotFound).await;
            return;
        }

        if ready {
            self.sessions().set_ready(room.id, user_id);
        } else {
            self.sessions().set_not_ready(room.id, user_id);
        }
        self.broadcast_participants(&room).await;

        let event = if ready { "ready" } else { "not ready" };
        tracing::debug!(room_id = room.id, %user_id, "Player marked {event}");
    }
}
