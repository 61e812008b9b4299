use std::sync::Arc;

use crate::protocol::{
    ErrorCode, Room, RoomId, RoundPhase, ServerEvent, SocketId, UserId,
};
use crate::server::GameServer;

impl GameServer {
    // ------------------------------------------------------------------
    // Live drawing relay
    // ------------------------------------------------------------------

    pub(super) async fn handle_drawing_data(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: Option<RoomId>,
        room_code: Option<&str>,
        strokes: serde_json::Value,
        is_finished: bool,
        canvas_version: Option<u32>,
        sequence: u64,
    ) {
        let room = match self.resolve_room(room_id, room_code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve room for drawing_data");
                return;
            }
        };

        if room.round_phase != Some(RoundPhase::Drawing) {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        }
        if room.current_drawer_id != Some(user_id) {
            self.send_error(socket_id, ErrorCode::NotYourTurn).await;
            return;
        }

        self.metrics.increment_drawing_messages();
        let event = ServerEvent::DrawingData {
            from_user: user_id,
            strokes,
            is_finished,
            canvas_version: canvas_version.unwrap_or(room.canvas_version),
            sequence,
        };
        self.broadcast_drawing(&room, socket_id, event).await;
        self.send_to_socket(socket_id, ServerEvent::DrawingAck { sequence })
            .await;
    }

    /// Deltas skip the sending socket and any socket mid-resync; those
    /// catch up from the snapshot and resume live data after
    /// `resync_done`.
    async fn broadcast_drawing(&self, room: &Room, sender: SocketId, event: ServerEvent) {
        let Ok(participants) = self.store().participants(room.id).await else {
            return;
        };
        let event = Arc::new(event);
        for participant in participants {
            let Some(socket_id) = participant.socket_id else {
                continue;
            };
            if socket_id == sender || self.sessions().is_resyncing(socket_id) {
                continue;
            }
            self.sessions().send_to_socket(socket_id, Arc::clone(&event));
        }
    }

    pub(super) async fn handle_clear_canvas(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: Option<RoomId>,
        room_code: Option<&str>,
    ) {
        let room = match self.resolve_room(room_id, room_code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve room for clear_canvas");
                return;
            }
        };

        if room.round_phase != Some(RoundPhase::Drawing) {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        }
        if room.current_drawer_id != Some(user_id) {
            self.send_error(socket_id, ErrorCode::NotYourTurn).await;
            return;
        }

        let canvas_version = match self.store().bump_canvas_version(room.id).await {
            Ok(Some(version)) => version,
            _ => return,
        };
        if let Ok(Some(room)) = self.fetch_room(room.id).await {
            self.cache().refresh(&room);
        }
        self.broadcast_to_room(room.id, ServerEvent::CanvasCleared { canvas_version })
            .await;
    }

    // ------------------------------------------------------------------
    // Canvas resync
    // ------------------------------------------------------------------

    /// A socket entered the drawing phase mid-round (join or
    /// reconnect): ask the drawer's live socket for a snapshot. If the
    /// joiner IS the drawer, invert: the joiner serves everyone else.
    /// One request per resume, enforced per (socket, room).
    pub(super) async fn request_canvas_resync(
        self: &Arc<Self>,
        room: &Room,
        socket_id: SocketId,
        user_id: UserId,
    ) {
        if !self.sessions().try_mark_canvas_requested(socket_id, room.id) {
            return;
        }

        let Some(drawer) = room.current_drawer_id else {
            return;
        };

        if drawer == user_id {
            // The drawer holds the authoritative canvas; everyone else
            // is behind it.
            self.send_to_socket(
                socket_id,
                ServerEvent::RequestCanvasData {
                    room_code: room.code.clone(),
                    target_user_id: None,
                    target_socket_id: None,
                },
            )
            .await;
            return;
        }

        self.sessions().mark_resyncing(socket_id, room.id);

        // The drawer's socket is resolved now, not earlier: a drawer
        // who reconnected mid-join still receives the request.
        let Some(drawer_socket) = self.sessions().socket_for_user(drawer) else {
            tracing::debug!(room_id = room.id, "Drawer offline; resync postponed");
            self.sessions().finish_resync(socket_id);
            return;
        };
        self.send_to_socket(
            drawer_socket,
            ServerEvent::RequestCanvasData {
                room_code: room.code.clone(),
                target_user_id: Some(user_id),
                target_socket_id: Some(socket_id),
            },
        )
        .await;
    }

    /// The drawer answered a snapshot request; forward it to the
    /// resyncing socket with a fresh room payload attached.
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn handle_send_canvas_data(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_code: &str,
        target_user_id: Option<UserId>,
        target_socket_id: Option<SocketId>,
        history: serde_json::Value,
        last_sequence: u64,
        remaining_time: u64,
    ) {
        let room = match self.resolve_room(None, Some(room_code)).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve room for send_canvas_data");
                return;
            }
        };

        if room.current_drawer_id != Some(user_id) {
            self.send_error(socket_id, ErrorCode::NotYourTurn).await;
            return;
        }

        // Target resolution happens at forward time through the live
        // user->socket map.
        let target = target_socket_id
            .filter(|socket| self.sessions().has_socket(*socket))
            .or_else(|| target_user_id.and_then(|user| self.sessions().socket_for_user(user)));
        let Some(target) = target else {
            tracing::debug!(room_id = room.id, "Resync target vanished; snapshot dropped");
            return;
        };

        let payload = match self.room_state_payload(&room).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(error = %err, "Failed to build room payload for resync");
                return;
            }
        };
        self.send_to_socket(
            target,
            ServerEvent::CanvasResume {
                history,
                last_sequence,
                remaining_time,
                room: Box::new(payload),
            },
        )
        .await;
    }

    pub(super) fn handle_resync_done(&self, socket_id: SocketId) {
        self.sessions().finish_resync(socket_id);
        tracing::debug!(%socket_id, "Resync complete; live deltas resume");
    }

    // ------------------------------------------------------------------
    // Hints
    // ------------------------------------------------------------------

    pub(super) async fn handle_word_hint(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: Option<RoomId>,
        room_code: Option<&str>,
        revealed_word: String,
        hints_remaining: u8,
    ) {
        let room = match self.resolve_room(room_id, room_code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve room for word_hint");
                return;
            }
        };

        if room.round_phase != Some(RoundPhase::Drawing) {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        }
        if room.current_drawer_id != Some(user_id) {
            self.send_error(socket_id, ErrorCode::NotYourTurn).await;
            return;
        }

        self.broadcast_to_room_except(
            room.id,
            user_id,
            ServerEvent::WordHint {
                revealed_word,
                hints_remaining,
            },
        )
        .await;
    }
}
