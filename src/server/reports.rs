use std::sync::Arc;

use crate::protocol::{
    ErrorCode, ReportKind, RoomId, RoundPhase, ServerEvent, SocketId, UserId,
};
use crate::server::GameServer;

use super::phase_engine::RoundStep;

impl GameServer {
    /// Player reports. Drawing reports escalate: the first strike
    /// aborts the offending drawer's turn, the second bans them from
    /// this room. User reports are recorded for moderation.
    pub(super) async fn handle_report(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
        target_user_id: UserId,
        kind: ReportKind,
    ) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to load room for report");
                return;
            }
        };

        let reporter_is_member = self
            .store()
            .get_participant(room.id, user_id)
            .await
            .ok()
            .flatten()
            .is_some_and(|p| p.is_active && !p.is_banned());
        if !reporter_is_member || target_user_id == user_id {
            self.send_error(socket_id, ErrorCode::RoomNotFound).await;
            return;
        }
        let target_exists = self
            .store()
            .get_participant(room.id, target_user_id)
            .await
            .ok()
            .flatten()
            .is_some();
        if !target_exists {
            self.send_error(socket_id, ErrorCode::RoomNotFound).await;
            return;
        }

        let strikes = match self
            .store()
            .record_report(room.id, target_user_id, kind, user_id)
            .await
        {
            Ok(Some(strikes)) => strikes,
            Ok(None) => return, // duplicate reporter
            Err(err) => {
                tracing::error!(error = %err, "Failed to record report");
                return;
            }
        };
        tracing::info!(
            room_id,
            target = target_user_id,
            ?kind,
            strikes,
            "Report recorded"
        );

        if kind != ReportKind::Drawing {
            return;
        }

        if strikes >= 2 {
            self.ban_from_room(room_id, target_user_id).await;
            return;
        }

        // First strike: abort the reported drawer's current turn. The
        // fromPhase guard makes a racing phase timer lose cleanly.
        let target_is_drawer = room.current_drawer_id == Some(target_user_id);
        let in_turn = matches!(
            room.round_phase,
            Some(RoundPhase::ChoosingWord | RoundPhase::Drawing)
        );
        if target_is_drawer && in_turn {
            self.broadcast_to_room(
                room_id,
                ServerEvent::DrawerSkipped {
                    user_id: target_user_id,
                },
            )
            .await;
            if let Err(err) = self
                .begin_drawer_selection(room_id, room.round_phase, RoundStep::Keep)
                .await
            {
                tracing::error!(room_id, error = %err, "Report-driven skip failed");
            }
        }
    }

    async fn ban_from_room(self: &Arc<Self>, room_id: RoomId, target: UserId) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            _ => return,
        };
        let was_drawer = room.current_drawer_id == Some(target);

        let banned = self
            .store()
            .ban_participant(room_id, target)
            .await
            .unwrap_or(false);
        if !banned {
            return;
        }

        self.sessions().set_not_ready(room_id, target);
        self.sessions().cancel_grace_timer(room_id, target);
        if let Some(target_socket) = self.sessions().socket_for_user(target) {
            self.sessions().clear_socket_room(target_socket);
            self.send_to_socket(target_socket, ServerEvent::UserBanned { user_id: target })
                .await;
        }
        self.broadcast_to_room(room_id, ServerEvent::UserBannedFromRoom { user_id: target })
            .await;
        tracing::info!(room_id, target, "Participant banned from room");

        if was_drawer
            && matches!(
                room.round_phase,
                Some(RoundPhase::ChoosingWord | RoundPhase::Drawing)
            )
        {
            self.handle_drawer_departure(&room).await;
        }
        self.run_room_population_checks(room_id).await;
    }
}
