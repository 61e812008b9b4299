use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

use crate::clock::TimerSlot;
use crate::protocol::{
    room_codes, ChatLine, ErrorCode, GameMode, RemovalReason, Room, RoomId, RoundPhase,
    ServerEvent, SettingsPatch, SocketId, Team, UserId, MAX_MAX_PLAYERS, MIN_MAX_PLAYERS,
};
use crate::server::GameServer;
use crate::store::JoinOutcome;

impl GameServer {
    /// Resolve a room by id or by client-supplied code.
    pub(super) async fn resolve_room(
        &self,
        room_id: Option<RoomId>,
        room_code: Option<&str>,
    ) -> Result<Option<Room>> {
        if let Some(room_id) = room_id {
            return self.fetch_room(room_id).await;
        }
        if let Some(code) = room_code {
            let code = room_codes::normalize_room_code(code);
            if !room_codes::is_valid_room_code(&code) {
                return Ok(None);
            }
            return self.fetch_room_by_code(&code).await;
        }
        Ok(None)
    }

    pub(super) async fn handle_join_room(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: Option<RoomId>,
        room_code: Option<&str>,
        team: Option<Team>,
    ) {
        if !self.is_accepting_joins() {
            self.send_to_socket(socket_id, ServerEvent::ServerSyncing).await;
            self.send_error(socket_id, ErrorCode::ServerSyncing).await;
            return;
        }

        let room = match self.resolve_room(room_id, room_code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve room for join");
                return;
            }
        };

        if room.status == crate::protocol::RoomStatus::Closed {
            self.send_error(socket_id, ErrorCode::RoomClosed).await;
            return;
        }

        // Duplicate join from the same socket inside the lock TTL is a
        // client retry; drop it. A different socket (reconnect) wins.
        if !self
            .sessions()
            .try_acquire_join_lock(room.id, user_id, socket_id)
            .await
        {
            tracing::debug!(room_id = room.id, %user_id, "Duplicate join suppressed");
            return;
        }

        let join_team = if room.game_mode == GameMode::Team {
            team
        } else {
            None
        };
        let outcome = match self.store().join_room(room.id, user_id, join_team).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "Join failed");
                return;
            }
        };

        match outcome {
            JoinOutcome::NotFound => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
            }
            JoinOutcome::Closed => {
                self.send_error(socket_id, ErrorCode::RoomClosed).await;
            }
            JoinOutcome::Full => {
                self.send_error(socket_id, ErrorCode::RoomFull).await;
            }
            JoinOutcome::Banned => {
                self.send_error(socket_id, ErrorCode::YouAreBanned).await;
            }
            JoinOutcome::Rejoined(participant) => {
                self.complete_rejoin(socket_id, user_id, &room, participant.is_active)
                    .await;
            }
            JoinOutcome::Joined(_) => {
                self.complete_fresh_join(socket_id, user_id, &room).await;
            }
        }
    }

    async fn complete_fresh_join(self: &Arc<Self>, socket_id: SocketId, user_id: UserId, room: &Room) {
        self.attach_socket_to_seat(socket_id, user_id, room.id).await;
        self.metrics.increment_players_joined();

        let Ok(Some(room)) = self.fetch_room(room.id).await else {
            return;
        };

        self.send_room_joined(socket_id, &room).await;

        let ready = self.sessions().ready_set(room.id);
        if let Ok(Some(participant)) = self.store().get_participant(room.id, user_id).await {
            let info = self.participant_info(&room, &participant, &ready);
            self.broadcast_to_room_except(
                room.id,
                user_id,
                ServerEvent::PlayerJoined { participant: info },
            )
            .await;
        }
        self.broadcast_participants(&room).await;

        if room.status.is_pregame() {
            self.arm_lobby_idle_timer(&room);
        }

        // A joiner landing mid-drawing catches up through the canvas
        // snapshot protocol.
        if room.round_phase == Some(RoundPhase::Drawing) {
            self.request_canvas_resync(&room, socket_id, user_id).await;
        }

        tracing::info!(room_id = room.id, room_code = %room.code, %user_id, "Player joined room");
    }

    /// Reconnect or duplicate join for a user who already holds a seat.
    async fn complete_rejoin(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room: &Room,
        is_active: bool,
    ) {
        if !is_active {
            if room.is_playing() {
                // Grace expired; the seat is gone until the game ends.
                self.send_to_socket(socket_id, ServerEvent::ExitedDueToInactivity)
                    .await;
                self.send_error(socket_id, ErrorCode::ExitedDueToInactivity)
                    .await;
                return;
            }
            // Pregame: the seat revives.
            let _ = self
                .store()
                .update_participant(room.id, user_id, Box::new(|p| p.is_active = true))
                .await;
        }

        let was_same_socket = self
            .store()
            .get_participant(room.id, user_id)
            .await
            .ok()
            .flatten()
            .and_then(|p| p.socket_id)
            == Some(socket_id);

        let reconnect_cancelled_grace = self.sessions().cancel_grace_timer(room.id, user_id);
        self.attach_socket_to_seat(socket_id, user_id, room.id).await;

        let Ok(Some(room)) = self.fetch_room(room.id).await else {
            return;
        };

        self.send_room_joined(socket_id, &room).await;

        if was_same_socket {
            // Idempotent re-join from the same connection: state went to
            // that socket only, nobody else hears about it.
            return;
        }

        if reconnect_cancelled_grace {
            self.metrics.increment_reconnections();
            tracing::info!(
                room_id = room.id,
                %user_id,
                "Player reconnected within the grace window"
            );
        }
        self.broadcast_participants(&room).await;

        if room.round_phase == Some(RoundPhase::Drawing) {
            self.request_canvas_resync(&room, socket_id, user_id).await;
        }
    }

    async fn attach_socket_to_seat(&self, socket_id: SocketId, user_id: UserId, room_id: RoomId) {
        let _ = self
            .store()
            .update_participant(
                room_id,
                user_id,
                Box::new(move |p| {
                    p.socket_id = Some(socket_id);
                    p.is_active = true;
                }),
            )
            .await;
        self.sessions().set_socket_room(socket_id, room_id);
    }

    async fn send_room_joined(&self, socket_id: SocketId, room: &Room) {
        match self.room_state_payload(room).await {
            Ok(payload) => {
                self.send_to_socket(socket_id, ServerEvent::RoomJoined(Box::new(payload)))
                    .await;
                // Replay recent chat so the client can fill its log.
                if let Ok(lines) = self
                    .store()
                    .recent_messages(room.id, self.config().chat_history_limit)
                    .await
                {
                    for line in lines {
                        self.send_to_socket(socket_id, ServerEvent::ChatMessage(line))
                            .await;
                    }
                }
            }
            Err(err) => {
                tracing::error!(room_id = room.id, error = %err, "Failed to build room payload");
            }
        }
    }

    pub(super) async fn handle_leave_room(
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
                tracing::error!(error = %err, "Failed to resolve room for leave");
                return;
            }
        };

        let participant = match self.store().get_participant(room.id, user_id).await {
            Ok(Some(p)) => p,
            _ => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
        };

        self.sessions().clear_socket_room(socket_id);
        self.sessions().cancel_grace_timer(room.id, user_id);
        self.sessions().release_join_lock(room.id, user_id).await;
        self.metrics.increment_players_left();

        // Owner departure always tears the room down.
        if room.owner_id == user_id {
            self.delete_room(&room, "owner_left").await;
            return;
        }

        let was_drawing_drawer = participant.is_drawer
            && matches!(
                room.round_phase,
                Some(RoundPhase::ChoosingWord | RoundPhase::Drawing)
            );

        let _ = self
            .store()
            .update_participant(
                room.id,
                user_id,
                Box::new(|p| {
                    p.is_active = false;
                    p.socket_id = None;
                    p.is_drawer = false;
                }),
            )
            .await;
        self.sessions().set_not_ready(room.id, user_id);

        self.broadcast_to_room(room.id, ServerEvent::PlayerLeft { user_id })
            .await;

        if was_drawing_drawer {
            self.handle_drawer_departure(&room).await;
        }

        self.run_room_population_checks(room.id).await;

        if let Ok(Some(room)) = self.fetch_room(room.id).await {
            self.broadcast_participants(&room).await;
        }
        tracing::info!(room_id = room.id, %user_id, "Player left room");
    }

    pub(super) async fn handle_update_settings(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
        patch: SettingsPatch,
    ) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to load room for update_settings");
                return;
            }
        };

        if room.owner_id != user_id {
            self.send_error(socket_id, ErrorCode::OnlyOwnerCanUpdateSettings)
                .await;
            return;
        }
        if !room.can_update_settings() {
            self.send_error(socket_id, ErrorCode::CannotUpdateAfterGameStarted)
                .await;
            return;
        }
        if let Some(max_players) = patch.max_players {
            if !(MIN_MAX_PLAYERS..=MAX_MAX_PLAYERS).contains(&max_players) {
                self.send_error(socket_id, ErrorCode::InvalidMaxPlayers).await;
                return;
            }
        }
        if patch.is_empty() {
            return;
        }

        // Enabling voice charges every active participant; one empty
        // wallet rejects the whole change.
        let enabling_voice =
            patch.voice_enabled == Some(true) && !room.settings.voice_enabled;
        if enabling_voice {
            let fee = self.config().voice_fee;
            if fee > 0 {
                let participants = match self.store().participants(room.id).await {
                    Ok(p) => p,
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to load participants for voice fee");
                        return;
                    }
                };
                let active: Vec<_> = participants
                    .iter()
                    .filter(|p| p.is_active && !p.is_banned())
                    .collect();
                for participant in &active {
                    match self.wallet().balance(participant.user_id).await {
                        Ok(balance) if balance >= fee => {}
                        Ok(_) => {
                            self.broadcast_to_room(
                                room.id,
                                ServerEvent::error(ErrorCode::InsufficientCoins),
                            )
                            .await;
                            return;
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "Voice fee balance check failed");
                            return;
                        }
                    }
                }
                for participant in &active {
                    if let Err(err) = self.wallet().debit(participant.user_id, fee).await {
                        // Balance was verified above; a failure here is a
                        // wallet race. Log and keep going so charged
                        // players are not stranded mid-change.
                        tracing::warn!(
                            user_id = participant.user_id,
                            error = %err,
                            "Voice fee debit failed after balance check"
                        );
                    }
                }
            }
        }

        let updated = match self.store().update_settings(room.id, patch).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Settings update failed");
                return;
            }
        };
        self.cache().refresh(&updated);

        // Broadcast first; anything after this point must not surface an
        // error for an already-applied change.
        self.broadcast_to_room(
            updated.id,
            ServerEvent::SettingsUpdated {
                settings: updated.settings.clone(),
                max_players: updated.max_players,
                is_public: updated.is_public,
                game_mode: updated.game_mode,
            },
        )
        .await;

        if enabling_voice {
            if let Err(err) = self.voice().close_room(updated.id).await {
                tracing::warn!(room_id = updated.id, error = %err, "Voice session reset failed");
            }
        }
    }

    pub(super) async fn handle_select_team(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
        team: Team,
    ) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to load room for select_team");
                return;
            }
        };

        if room.game_mode != GameMode::Team {
            self.send_error(socket_id, ErrorCode::NotTeamMode).await;
            return;
        }
        if !room.status.is_pregame() {
            self.send_error(socket_id, ErrorCode::CannotChangeTeamAfterGameStarted)
                .await;
            return;
        }

        let updated = self
            .store()
            .update_participant(room_id, user_id, Box::new(move |p| p.team = Some(team)))
            .await;
        match updated {
            Ok(Some(_)) => {
                self.broadcast_participants(&room).await;
            }
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Team selection failed");
            }
        }
    }

    pub(super) async fn handle_remove_participant(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
        target: UserId,
    ) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to load room for remove_participant");
                return;
            }
        };

        if room.owner_id != user_id {
            self.send_error(socket_id, ErrorCode::OnlyOwnerCanRemoveParticipants)
                .await;
            return;
        }
        if room.is_playing() {
            self.send_error(socket_id, ErrorCode::CannotRemoveDuringGame)
                .await;
            return;
        }
        if target == user_id {
            self.send_error(socket_id, ErrorCode::CannotRemoveSelf).await;
            return;
        }

        let removed = match self.store().remove_participant(room_id, target).await {
            Ok(removed) => removed,
            Err(err) => {
                tracing::error!(error = %err, "Participant removal failed");
                return;
            }
        };
        let Some(removed) = removed else {
            self.send_error(socket_id, ErrorCode::RoomNotFound).await;
            return;
        };

        self.sessions().set_not_ready(room_id, target);
        self.sessions().cancel_grace_timer(room_id, target);
        if let Some(target_socket) = removed.socket_id {
            self.sessions().clear_socket_room(target_socket);
            self.send_to_socket(
                target_socket,
                ServerEvent::PlayerRemoved {
                    user_id: target,
                    reason: RemovalReason::RemovedByOwner,
                },
            )
            .await;
        }
        self.broadcast_to_room(
            room_id,
            ServerEvent::PlayerRemoved {
                user_id: target,
                reason: RemovalReason::RemovedByOwner,
            },
        )
        .await;
        if let Ok(Some(room)) = self.fetch_room(room_id).await {
            self.broadcast_participants(&room).await;
        }
    }

    pub(super) async fn handle_continue_waiting(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
    ) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to load room for continue_waiting");
                return;
            }
        };

        if room.owner_id != user_id {
            self.send_error(socket_id, ErrorCode::OnlyOwnerCanContinueWaiting)
                .await;
            return;
        }

        self.clear_lobby_idle_notice(room.id);
        self.clock().cancel(&room.code, TimerSlot::LobbyIdle);
        self.arm_lobby_idle_timer(&room);
        tracing::debug!(room_id = room.id, "Lobby idle timer reset by owner");
    }

    pub(super) async fn handle_chat_message(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: Option<RoomId>,
        room_code: Option<&str>,
        content: &str,
    ) {
        let room = match self.resolve_room(room_id, room_code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve room for chat");
                return;
            }
        };

        let content = content.trim();
        if content.is_empty() {
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

        let line = ChatLine {
            user_id,
            content: content.to_string(),
            sent_at: Utc::now(),
        };
        if let Err(err) = self.store().append_message(room.id, line.clone()).await {
            tracing::warn!(error = %err, "Failed to persist chat line");
        }
        self.broadcast_to_room(room.id, ServerEvent::ChatMessage(line))
            .await;
    }

    pub(super) async fn handle_join_voice(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
    ) {
        match self.voice().join(room_id, user_id).await {
            Ok(payload) => {
                self.send_to_socket(socket_id, ServerEvent::VoiceSignal { payload })
                    .await;
            }
            Err(err) => {
                tracing::warn!(room_id, %user_id, error = %err, "Voice join failed");
            }
        }
    }

    pub(super) async fn handle_voice_signal(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
        payload: serde_json::Value,
    ) {
        match self.voice().signal(room_id, user_id, payload).await {
            Ok(payload) => {
                self.send_to_socket(socket_id, ServerEvent::VoiceSignal { payload })
                    .await;
            }
            Err(err) => {
                tracing::warn!(room_id, %user_id, error = %err, "Voice signal relay failed");
            }
        }
    }
}
