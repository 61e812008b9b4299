use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tokio::time::Duration;

use crate::clock::TimerSlot;
use crate::protocol::{GameMode, Room, RoomId, RoomStatus, RoundPhase, ServerEvent, SocketId, Team, UserId};
use crate::server::GameServer;
use crate::store::Participant;

impl GameServer {
    // ------------------------------------------------------------------
    // Lobby idle
    // ------------------------------------------------------------------

    /// Arm (or re-arm) the lobby idle timer. First expiry warns the
    /// owner; a second expiry without `continue_waiting` deletes the
    /// room. No owner socket means nobody can answer, so the room goes
    /// straight away.
    pub(super) fn arm_lobby_idle_timer(self: &Arc<Self>, room: &Room) {
        if !room.status.is_pregame() {
            return;
        }
        let fire_at =
            Utc::now() + ChronoDuration::seconds(self.config().timers.lobby_timeout_secs as i64);
        let server = Arc::clone(self);
        let room_id = room.id;
        self.clock().schedule(
            &room.code,
            TimerSlot::LobbyIdle,
            room.id,
            fire_at,
            move || async move {
                server.handle_lobby_idle_timeout(room_id).await;
            },
        );
    }

    pub(super) fn clear_lobby_idle_notice(&self, room_id: RoomId) {
        self.lobby_idle_notified.remove(&room_id);
    }

    async fn handle_lobby_idle_timeout(self: &Arc<Self>, room_id: RoomId) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            _ => return,
        };
        if !room.status.is_pregame() {
            return;
        }

        let owner_socket = self.sessions().socket_for_user(room.owner_id);
        let already_notified = self.lobby_idle_notified.contains_key(&room_id);

        if owner_socket.is_none() || already_notified {
            tracing::info!(room_id, room_code = %room.code, "Lobby idle timeout; deleting room");
            self.delete_room(&room, "lobby_idle_timeout").await;
            return;
        }

        self.lobby_idle_notified.insert(room_id, ());
        if let Some(socket_id) = owner_socket {
            self.send_to_socket(socket_id, ServerEvent::LobbyTimeExceeded)
                .await;
        }
        self.arm_lobby_idle_timer(&room);
    }

    // ------------------------------------------------------------------
    // Room deletion
    // ------------------------------------------------------------------

    /// Tear a room down completely: timers, cache, sessions, store.
    pub(super) async fn delete_room(self: &Arc<Self>, room: &Room, reason: &str) {
        self.clock().cancel_room(&room.code);
        self.clear_lobby_idle_notice(room.id);

        self.broadcast_to_room(room.id, ServerEvent::RoomClosed).await;

        if let Ok(participants) = self.store().participants(room.id).await {
            for participant in participants {
                self.sessions()
                    .cancel_grace_timer(room.id, participant.user_id);
                if let Some(socket_id) = participant.socket_id {
                    self.sessions().clear_socket_room(socket_id);
                }
            }
        }
        self.sessions().clear_ready(room.id);
        self.cache().remove(room.id);

        if let Err(err) = self.store().delete_room(room.id).await {
            tracing::error!(room_id = room.id, error = %err, "Room deletion failed");
            return;
        }
        if let Err(err) = self.voice().close_room(room.id).await {
            tracing::debug!(room_id = room.id, error = %err, "Voice teardown failed");
        }

        self.metrics.increment_rooms_deleted();
        tracing::info!(room_id = room.id, room_code = %room.code, reason, "Room deleted");
    }

    // ------------------------------------------------------------------
    // Population checks
    // ------------------------------------------------------------------

    /// Run after any departure: zero active participants deletes the
    /// room; a playing room short on players ends the game.
    pub(super) async fn run_room_population_checks(self: &Arc<Self>, room_id: RoomId) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            _ => return,
        };
        let participants = match self.store().participants(room_id).await {
            Ok(participants) => participants,
            Err(err) => {
                tracing::error!(error = %err, "Failed to load participants for population check");
                return;
            }
        };

        let active = participants
            .iter()
            .filter(|p| p.is_active && !p.is_banned())
            .count();
        if active == 0 {
            self.delete_room(&room, "no_active_participants").await;
            return;
        }

        if room.is_playing() && !self.has_sufficient_players(&room, &participants) {
            self.end_game_insufficient_players(&room, room.round_phase)
                .await;
        }
    }

    /// Solo needs two active players; team mode needs two per team.
    pub(super) fn has_sufficient_players(&self, room: &Room, participants: &[Participant]) -> bool {
        if !room.is_playing() {
            return true;
        }
        let active: Vec<_> = participants
            .iter()
            .filter(|p| p.is_active && !p.is_banned())
            .collect();
        match room.game_mode {
            GameMode::Solo => active.len() >= 2,
            GameMode::Team => {
                let blue = active.iter().filter(|p| p.team == Some(Team::Blue)).count();
                let orange = active
                    .iter()
                    .filter(|p| p.team == Some(Team::Orange))
                    .count();
                blue >= 2 && orange >= 2
            }
        }
    }

    pub(super) async fn end_game_insufficient_players(
        self: &Arc<Self>,
        room: &Room,
        from: Option<RoundPhase>,
    ) {
        let updated = self
            .store()
            .transition_phase(
                room.id,
                from,
                Box::new(|room| {
                    room.status = RoomStatus::Closed;
                    room.round_phase = None;
                    room.round_phase_end_time = None;
                    room.clear_turn_state();
                }),
            )
            .await;
        match updated {
            Ok(Some(updated)) => {
                self.cache().refresh(&updated);
                self.clock().cancel_room(&room.code);
                self.sessions().clear_ready(room.id);
                self.broadcast_to_room(room.id, ServerEvent::GameEndedInsufficientPlayers)
                    .await;
                self.metrics.increment_games_completed();
                tracing::info!(
                    room_id = room.id,
                    room_code = %room.code,
                    "Game ended: insufficient players"
                );
            }
            Ok(None) => {
                self.metrics.increment_phase_cas_losses();
            }
            Err(err) => {
                tracing::error!(room_id = room.id, error = %err, "Insufficient-players shutdown failed");
            }
        }
    }

    /// The current drawer left mid-turn: clear the turn and rest in
    /// `interval`; the interval timer starts the next round.
    pub(super) async fn handle_drawer_departure(self: &Arc<Self>, room: &Room) {
        match room.round_phase {
            Some(RoundPhase::Drawing) => {
                let duration = self.config().timers.interval_secs;
                let end_time = Utc::now() + ChronoDuration::seconds(duration as i64);
                let updated = self
                    .store()
                    .transition_phase(
                        room.id,
                        Some(RoundPhase::Drawing),
                        Box::new(move |room| {
                            room.clear_turn_state();
                            room.enter_phase(RoundPhase::Interval, Some(end_time));
                        }),
                    )
                    .await;
                match updated {
                    Ok(Some(updated)) => {
                        self.clock().cancel(&room.code, TimerSlot::Phase(RoundPhase::Drawing));
                        self.cache().refresh(&updated);
                        self.broadcast_to_room(
                            updated.id,
                            ServerEvent::PhaseChange {
                                phase: RoundPhase::Interval,
                                duration,
                                phase_end_time: end_time,
                                round: updated.current_round,
                            },
                        )
                        .await;
                        self.schedule_phase_timer(&updated);
                    }
                    Ok(None) => self.metrics.increment_phase_cas_losses(),
                    Err(err) => {
                        tracing::error!(room_id = room.id, error = %err, "Drawer-departure transition failed");
                    }
                }
            }
            Some(RoundPhase::ChoosingWord) => {
                self.clock()
                    .cancel(&room.code, TimerSlot::Phase(RoundPhase::ChoosingWord));
                if let Err(err) = self
                    .begin_drawer_selection(
                        room.id,
                        Some(RoundPhase::ChoosingWord),
                        super::phase_engine::RoundStep::Keep,
                    )
                    .await
                {
                    tracing::error!(room_id = room.id, error = %err, "Drawer-departure reselection failed");
                }
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Disconnects and the grace window
    // ------------------------------------------------------------------

    /// Socket closed. The seat survives with a null socket; the grace
    /// timer decides whether the player actually left.
    pub async fn handle_socket_disconnect(self: &Arc<Self>, socket_id: SocketId) {
        let wants_short_grace = self.sessions().is_leaving_permanently(socket_id);
        let Some((user_id, room_id)) = self.sessions().unregister_socket(socket_id) else {
            self.metrics.decrement_active_connections();
            return;
        };
        self.sessions().clear_leaving_permanently(socket_id);
        self.metrics.decrement_active_connections();
        tracing::info!(%socket_id, %user_id, "Socket disconnected");

        let Some(room_id) = room_id else {
            return;
        };

        // Clear the socket only if the seat still points at this socket;
        // a reconnect that already attached a new socket wins.
        let participant = self
            .store()
            .update_participant(
                room_id,
                user_id,
                Box::new(move |p| {
                    if p.socket_id == Some(socket_id) {
                        p.socket_id = None;
                    }
                }),
            )
            .await;
        let Ok(Some(participant)) = participant else {
            return;
        };
        if participant.socket_id.is_some() || !participant.is_active {
            return;
        }

        let grace = if wants_short_grace {
            self.config().permanent_leave_grace
        } else {
            self.config().grace_period
        };
        self.arm_disconnect_grace(room_id, user_id, grace);
    }

    pub(super) fn arm_disconnect_grace(
        self: &Arc<Self>,
        room_id: RoomId,
        user_id: UserId,
        grace: Duration,
    ) {
        let token = self.sessions().arm_grace_timer(room_id, user_id);
        let server = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(grace) => {
                    server.handle_grace_expired(room_id, user_id).await;
                }
            }
        });
    }

    /// Grace elapsed without a reconnect: the seat is released.
    async fn handle_grace_expired(self: &Arc<Self>, room_id: RoomId, user_id: UserId) {
        self.sessions().clear_grace_timer_entry(room_id, user_id);

        let participant = match self.store().get_participant(room_id, user_id).await {
            Ok(Some(p)) => p,
            _ => return,
        };
        if participant.socket_id.is_some() || !participant.is_active {
            // Reconnected, or already released by another path.
            return;
        }

        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            _ => return,
        };

        let _ = self
            .store()
            .update_participant(
                room_id,
                user_id,
                Box::new(|p| {
                    p.is_active = false;
                    p.is_drawer = false;
                }),
            )
            .await;
        self.sessions().set_not_ready(room_id, user_id);
        self.metrics.increment_grace_expirations();
        tracing::info!(room_id, %user_id, "Disconnect grace expired; seat released");

        self.broadcast_to_room(room_id, ServerEvent::PlayerLeft { user_id })
            .await;

        if room.owner_id == user_id {
            self.delete_room(&room, "owner_disconnected").await;
            return;
        }

        if participant.is_drawer
            && matches!(
                room.round_phase,
                Some(RoundPhase::ChoosingWord | RoundPhase::Drawing)
            )
        {
            self.handle_drawer_departure(&room).await;
        }

        self.run_room_population_checks(room_id).await;
        if let Ok(Some(room)) = self.fetch_room(room_id).await {
            self.broadcast_participants(&room).await;
        }
    }
}
