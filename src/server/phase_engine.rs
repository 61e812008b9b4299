use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;

use crate::clock::TimerSlot;
use crate::protocol::{
    ErrorCode, GameMode, RemovalReason, Room, RoomId, RoomStatus, RoundPhase, ServerEvent,
    SocketId, UserId, DEFAULT_ELIMINATION_COUNT, MAX_SKIP_COUNT,
};
use crate::server::GameServer;
use crate::words::pick_word_options;

use super::rotation;

/// How `current_round` moves when a new drawer selection begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RoundStep {
    /// Game start: round 1, status flips to playing.
    Start,
    /// Interval elapsed: next round.
    Next,
    /// Same round continues (choose-word timeout, skip, report abort).
    Keep,
}

/// Why a drawing turn ended; decides whether the drawer gets a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DrawingEndReason {
    TimerExpired,
    AllGuessed,
    TeamFirstCorrect,
}

impl GameServer {
    // ------------------------------------------------------------------
    // Timer plumbing
    // ------------------------------------------------------------------

    /// Schedule the expiry for the room's current phase at its persisted
    /// absolute end time. Entering a phase cancels every other timer
    /// the room still holds; a single expiry exists per timed phase.
    pub(super) fn schedule_phase_timer(self: &Arc<Self>, room: &Room) {
        let Some(phase) = room.round_phase else {
            return;
        };
        let Some(end_time) = room.round_phase_end_time else {
            return;
        };
        if !phase.is_timed() {
            return;
        }
        self.clock().cancel_room(&room.code);

        let server = Arc::clone(self);
        let room_id = room.id;
        let code = room.code.clone();
        self.clock().schedule(
            &room.code,
            TimerSlot::Phase(phase),
            room.id,
            end_time,
            move || async move {
                server.handle_phase_timeout(room_id, &code, phase).await;
            },
        );
    }

    /// Phase-end callback. Consults the cached snapshot first: a timer
    /// whose phase has already moved on exits without touching the
    /// store. Survivors re-read fresh state and dispatch.
    pub(super) async fn handle_phase_timeout(
        self: &Arc<Self>,
        room_id: RoomId,
        room_code: &str,
        phase: RoundPhase,
    ) {
        self.metrics.increment_phase_timers_fired();

        if let Some(snapshot) = self.cache().get(room_id) {
            if snapshot.round_phase != Some(phase) {
                self.metrics.increment_phase_cas_losses();
                tracing::debug!(
                    %room_id,
                    scheduled = %phase,
                    "Phase moved on before timer fired; exiting"
                );
                return;
            }
        }

        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(%room_id, error = %err, "Failed to load room in phase timeout");
                return;
            }
        };
        if room.round_phase != Some(phase) {
            self.metrics.increment_phase_cas_losses();
            return;
        }

        if let Err(err) = self.dispatch_phase_end(&room, phase).await {
            tracing::error!(
                %room_id,
                room_code,
                %phase,
                error = %err,
                "Phase-end handler failed; recovering with a fresh drawer selection"
            );
            self.recover_room(room_id).await;
        }
    }

    async fn dispatch_phase_end(self: &Arc<Self>, room: &Room, phase: RoundPhase) -> Result<()> {
        match phase {
            RoundPhase::SelectingDrawer => self.enter_choosing_word(room.id).await,
            RoundPhase::ChoosingWord => self.handle_choosing_word_timeout(room).await,
            RoundPhase::Drawing => {
                self.end_drawing_round(room.id, DrawingEndReason::TimerExpired)
                    .await
            }
            RoundPhase::Reveal => self.handle_reveal_timeout(room.id).await,
            RoundPhase::Interval => {
                self.begin_drawer_selection(room.id, Some(RoundPhase::Interval), RoundStep::Next)
                    .await
            }
            RoundPhase::IntervalEnding => self.return_room_to_lobby(room.id).await,
            RoundPhase::Processing => Ok(()),
        }
    }

    /// Last-ditch recovery for a failed phase-end handler: whatever
    /// phase the room is stuck in, restart it with a fresh drawer
    /// selection so the room never hangs.
    async fn recover_room(self: &Arc<Self>, room_id: RoomId) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) if room.is_playing() => room,
            _ => return,
        };
        if let Err(err) = self
            .begin_drawer_selection(room_id, room.round_phase, RoundStep::Keep)
            .await
        {
            tracing::error!(%room_id, error = %err, "Recovery drawer selection failed");
        }
    }

    /// Startup rebuild: reschedule every playing room's phase timer at
    /// the persisted end time. Overdue phases fire immediately, once.
    pub(super) async fn rebuild_phase_timers(self: &Arc<Self>) -> Result<()> {
        let rooms = self.store().list_playing_rooms().await?;
        let mut rebuilt = 0usize;
        for room in rooms {
            if room
                .round_phase
                .is_some_and(RoundPhase::is_timed)
                && room.round_phase_end_time.is_some()
            {
                self.cache().refresh(&room);
                self.schedule_phase_timer(&room);
                rebuilt += 1;
            }
        }
        if rebuilt > 0 {
            tracing::info!(count = rebuilt, "Rebuilt phase timers from persisted state");
        }
        Ok(())
    }

    /// Broadcast the phase entry and arm its expiry.
    async fn announce_phase(self: &Arc<Self>, room: &Room) {
        let Some(phase) = room.round_phase else {
            return;
        };
        let Some(end_time) = room.round_phase_end_time else {
            return;
        };
        self.broadcast_to_room(
            room.id,
            ServerEvent::PhaseChange {
                phase,
                duration: self.config().timers.phase_secs(phase),
                phase_end_time: end_time,
                round: room.current_round,
            },
        )
        .await;
        self.schedule_phase_timer(room);
    }

    // ------------------------------------------------------------------
    // start_game
    // ------------------------------------------------------------------

    pub(super) async fn handle_start_game(
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
                tracing::error!(error = %err, "Failed to resolve room for start_game");
                return;
            }
        };

        if room.owner_id != user_id {
            self.send_error(socket_id, ErrorCode::OnlyOwnerCanStartGame)
                .await;
            return;
        }
        if !room.status.is_pregame() {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        }

        let participants = match self.store().participants(room.id).await {
            Ok(participants) => participants,
            Err(err) => {
                tracing::error!(error = %err, "Failed to load participants for start_game");
                return;
            }
        };
        let active: Vec<_> = participants
            .iter()
            .filter(|p| p.is_active && !p.is_banned())
            .collect();

        if active.len() < 2 {
            self.send_error(socket_id, ErrorCode::NotEnoughPlayers).await;
            return;
        }
        if room.game_mode == GameMode::Team {
            let blue = active
                .iter()
                .filter(|p| p.team == Some(crate::protocol::Team::Blue))
                .count();
            let orange = active
                .iter()
                .filter(|p| p.team == Some(crate::protocol::Team::Orange))
                .count();
            if blue < 2 || orange < 2 || blue + orange != active.len() {
                self.send_error(socket_id, ErrorCode::BothTeamsNeedPlayers)
                    .await;
                return;
            }
        }

        let ready = self.sessions().ready_set(room.id);
        let all_ready = active
            .iter()
            .filter(|p| p.user_id != room.owner_id)
            .all(|p| ready.contains(&p.user_id));
        if !all_ready {
            self.send_error(socket_id, ErrorCode::NotAllReady).await;
            return;
        }

        // Fresh scoreboard before charging so paid flags start clean.
        if let Err(err) = self.store().reset_scores(room.id).await {
            tracing::error!(error = %err, "Failed to reset scores for start_game");
            return;
        }

        if room.settings.entry_points > 0 {
            for participant in &active {
                if participant.has_paid_entry {
                    continue;
                }
                match self
                    .wallet()
                    .debit(participant.user_id, room.settings.entry_points)
                    .await
                {
                    Ok(_) => {
                        let _ = self
                            .store()
                            .update_participant(
                                room.id,
                                participant.user_id,
                                Box::new(|p| p.has_paid_entry = true),
                            )
                            .await;
                    }
                    Err(err) => {
                        tracing::info!(
                            user_id = participant.user_id,
                            error = %err,
                            "Entry fee debit failed; aborting game start"
                        );
                        self.send_error(socket_id, ErrorCode::InsufficientCoins)
                            .await;
                        return;
                    }
                }
            }
        }

        self.sessions().clear_ready(room.id);
        self.clock().cancel(&room.code, TimerSlot::LobbyIdle);
        self.clear_lobby_idle_notice(room.id);
        let _ = self.store().clear_messages(room.id).await;
        self.broadcast_to_room(room.id, ServerEvent::ClearChat).await;

        self.metrics.increment_games_started();
        tracing::info!(room_id = room.id, room_code = %room.code, "Game starting");

        if let Err(err) = self
            .begin_drawer_selection(room.id, None, RoundStep::Start)
            .await
        {
            tracing::error!(room_id = room.id, error = %err, "Failed to start first round");
        }
    }

    // ------------------------------------------------------------------
    // selecting_drawer
    // ------------------------------------------------------------------

    /// Enter `selecting_drawer` from `from`, picking the next drawer in
    /// rotation. The CAS makes racing callers (timer vs. skip vs.
    /// report abort) collapse to a single winner.
    pub(super) async fn begin_drawer_selection(
        self: &Arc<Self>,
        room_id: RoomId,
        from: Option<RoundPhase>,
        step: RoundStep,
    ) -> Result<()> {
        let Some(room) = self.fetch_room(room_id).await? else {
            return Ok(());
        };
        let participants = self.store().participants(room_id).await?;

        if !self.has_sufficient_players(&room, &participants) {
            self.end_game_insufficient_players(&room, from).await;
            return Ok(());
        }

        let Some(outcome) = rotation::next_drawer(
            room.game_mode,
            room.drawer_pointer_index,
            &room.drawn_user_ids,
            &participants,
        ) else {
            self.end_game_insufficient_players(&room, from).await;
            return Ok(());
        };

        let duration = self.config().timers.selecting_drawer_secs;
        let end_time = Utc::now() + ChronoDuration::seconds(duration as i64);
        let drawer = outcome.drawer;
        let pointer = outcome.pointer_index;
        let reset = outcome.cycle_reset;

        let updated = self
            .store()
            .transition_phase(
                room_id,
                from,
                Box::new(move |room| {
                    match step {
                        RoundStep::Start => {
                            room.status = RoomStatus::Playing;
                            room.current_round = 1;
                        }
                        RoundStep::Next => room.current_round += 1,
                        RoundStep::Keep => {}
                    }
                    if reset {
                        room.drawn_user_ids.clear();
                    }
                    room.drawn_user_ids.insert(drawer);
                    room.drawer_pointer_index = pointer;
                    room.last_drawer_id = room.current_drawer_id;
                    room.current_drawer_id = Some(drawer);
                    room.current_word = None;
                    room.current_word_options = None;
                    room.enter_phase(RoundPhase::SelectingDrawer, Some(end_time));
                }),
            )
            .await?;

        let Some(room) = updated else {
            self.metrics.increment_phase_cas_losses();
            return Ok(());
        };
        self.cache().refresh(&room);

        self.store().set_drawer(room_id, Some(drawer)).await?;
        self.store().reset_round_flags(room_id).await?;

        self.broadcast_to_room(
            room_id,
            ServerEvent::DrawerSelected {
                drawer,
                preview_duration: duration,
            },
        )
        .await;
        self.announce_phase(&room).await;
        self.broadcast_participants(&room).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // choosing_word
    // ------------------------------------------------------------------

    /// selecting_drawer expired: claim the processing sentinel, compute
    /// word options (catalog I/O), then enter `choosing_word`. The
    /// sentinel keeps a reconnect-triggered resume from computing a
    /// second, different option set while this one is in flight.
    async fn enter_choosing_word(self: &Arc<Self>, room_id: RoomId) -> Result<()> {
        let claimed = self
            .store()
            .transition_phase(
                room_id,
                Some(RoundPhase::SelectingDrawer),
                Box::new(|room| {
                    room.enter_phase(RoundPhase::Processing, None);
                }),
            )
            .await?;
        let Some(room) = claimed else {
            self.metrics.increment_phase_cas_losses();
            return Ok(());
        };
        self.cache().refresh(&room);

        let options = pick_word_options(
            self.words(),
            &room.settings.language,
            room.settings.script,
            &room.settings.categories,
            &room.used_words,
        )
        .await;

        let duration = self.config().timers.choosing_word_secs;
        let end_time = Utc::now() + ChronoDuration::seconds(duration as i64);
        let options_for_store = options.clone();
        let updated = self
            .store()
            .transition_phase(
                room_id,
                Some(RoundPhase::Processing),
                Box::new(move |room| {
                    room.current_word_options = Some(options_for_store);
                    room.enter_phase(RoundPhase::ChoosingWord, Some(end_time));
                }),
            )
            .await?;
        let Some(room) = updated else {
            self.metrics.increment_phase_cas_losses();
            return Ok(());
        };
        self.cache().refresh(&room);

        // Resolve the drawer's socket at send time; a drawer who
        // reconnected during option computation still gets the words.
        if let Some(drawer) = room.current_drawer_id {
            self.send_to_user(
                drawer,
                ServerEvent::WordOptions {
                    words: options,
                    duration,
                },
            )
            .await;
        }
        self.announce_phase(&room).await;
        Ok(())
    }

    pub(super) async fn handle_choose_word(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
        word: &str,
    ) {
        let room = match self.fetch_room(room_id).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to load room for choose_word");
                return;
            }
        };

        if room.round_phase != Some(RoundPhase::ChoosingWord) {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        }
        if room.current_drawer_id != Some(user_id) {
            self.send_error(socket_id, ErrorCode::NotYourTurn).await;
            return;
        }
        let valid = room
            .current_word_options
            .as_ref()
            .is_some_and(|options| options.iter().any(|option| option == word));
        if !valid {
            self.send_error(socket_id, ErrorCode::InvalidWordChoice).await;
            return;
        }

        let duration = self.config().timers.drawing_secs;
        let end_time = Utc::now() + ChronoDuration::seconds(duration as i64);
        let chosen = word.to_string();
        let updated = match self
            .store()
            .transition_phase(
                room_id,
                Some(RoundPhase::ChoosingWord),
                Box::new(move |room| {
                    room.used_words.insert(chosen.clone());
                    room.current_word = Some(chosen);
                    room.current_word_options = None;
                    room.enter_phase(RoundPhase::Drawing, Some(end_time));
                }),
            )
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                tracing::error!(error = %err, "choose_word transition failed");
                return;
            }
        };
        let Some(room) = updated else {
            // The choose-word timer beat us to it.
            self.metrics.increment_phase_cas_losses();
            self.send_error(socket_id, ErrorCode::RoundEnded).await;
            return;
        };
        self.cache().refresh(&room);

        // A fresh word grants fresh elimination chances.
        let _ = self
            .store()
            .update_participant(
                room_id,
                user_id,
                Box::new(|p| {
                    p.elimination_count = DEFAULT_ELIMINATION_COUNT;
                    p.has_drawn = true;
                }),
            )
            .await;

        self.broadcast_to_room(room_id, ServerEvent::ClearChat).await;
        let _ = self.store().clear_messages(room_id).await;
        self.announce_phase(&room).await;

        tracing::info!(
            room_id,
            drawer = user_id,
            round = room.current_round,
            "Drawing phase started"
        );
    }

    /// choosing_word expired without a pick: the drawer burns an
    /// elimination chance, and at zero loses the seat.
    async fn handle_choosing_word_timeout(self: &Arc<Self>, room: &Room) -> Result<()> {
        let Some(drawer) = room.current_drawer_id else {
            return self
                .begin_drawer_selection(room.id, Some(RoundPhase::ChoosingWord), RoundStep::Keep)
                .await;
        };

        let updated = self
            .store()
            .update_participant(
                room.id,
                drawer,
                Box::new(|p| {
                    p.elimination_count = p.elimination_count.saturating_sub(1);
                }),
            )
            .await?;

        let eliminated = updated.is_some_and(|p| p.elimination_count == 0);
        if eliminated {
            self.store().remove_participant(room.id, drawer).await?;
            self.sessions().set_not_ready(room.id, drawer);
            self.broadcast_to_room(
                room.id,
                ServerEvent::PlayerRemoved {
                    user_id: drawer,
                    reason: RemovalReason::FailedToChooseWord,
                },
            )
            .await;
            self.send_to_user(drawer, ServerEvent::ExitedDueToInactivity)
                .await;
            tracing::info!(
                room_id = room.id,
                user_id = drawer,
                "Drawer eliminated after repeated choose-word timeouts"
            );
        } else {
            self.broadcast_to_room(room.id, ServerEvent::DrawerSkipped { user_id: drawer })
                .await;
        }

        self.begin_drawer_selection(room.id, Some(RoundPhase::ChoosingWord), RoundStep::Keep)
            .await
    }

    // ------------------------------------------------------------------
    // drawing -> reveal
    // ------------------------------------------------------------------

    /// End the drawing turn. Exactly one of the racing callers (timer
    /// expiry, last correct guess, team first-correct, report abort)
    /// wins the CAS; the rest exit silently.
    pub(super) async fn end_drawing_round(
        self: &Arc<Self>,
        room_id: RoomId,
        reason: DrawingEndReason,
    ) -> Result<()> {
        let Some(room) = self.fetch_room(room_id).await? else {
            return Ok(());
        };
        let participants = self.store().participants(room_id).await?;

        let duration = self.config().timers.reveal_secs;
        let end_time = Utc::now() + ChronoDuration::seconds(duration as i64);
        let updated = self
            .store()
            .transition_phase(
                room_id,
                Some(RoundPhase::Drawing),
                Box::new(move |room| {
                    room.current_word = None;
                    room.current_word_options = None;
                    room.enter_phase(RoundPhase::Reveal, Some(end_time));
                }),
            )
            .await?;
        let Some(updated_room) = updated else {
            self.metrics.increment_phase_cas_losses();
            return Ok(());
        };
        self.cache().refresh(&updated_room);

        // Solo drawers earn from their guessers; team turns pay nothing
        // to the drawer.
        if room.game_mode == GameMode::Solo && reason != DrawingEndReason::TeamFirstCorrect {
            if let Some(drawer) = room.current_drawer_id {
                let guessed = participants
                    .iter()
                    .filter(|p| {
                        p.is_active && !p.is_banned() && p.user_id != drawer
                            && p.has_guessed_this_round
                    })
                    .count() as u32;
                let player_count = participants
                    .iter()
                    .filter(|p| p.is_active && !p.is_banned())
                    .count() as u32;
                let reward = super::guess::drawer_reward(guessed, player_count);
                if reward > 0 {
                    if let Some(score) = self
                        .store()
                        .award_player(room_id, drawer, reward, false)
                        .await?
                    {
                        self.broadcast_to_room(
                            room_id,
                            ServerEvent::ScoreUpdate {
                                user_id: drawer,
                                score,
                            },
                        )
                        .await;
                    }
                }
            }
        }

        tracing::info!(room_id, ?reason, "Drawing round ended");

        if self.target_reached(room_id, room.settings.target_points).await? {
            self.end_game(room_id, RoundPhase::Reveal).await?;
        } else {
            self.announce_phase(&updated_room).await;
        }
        Ok(())
    }

    async fn handle_reveal_timeout(self: &Arc<Self>, room_id: RoomId) -> Result<()> {
        let Some(room) = self.fetch_room(room_id).await? else {
            return Ok(());
        };

        if self.target_reached(room_id, room.settings.target_points).await? {
            return self.end_game(room_id, RoundPhase::Reveal).await;
        }

        let duration = self.config().timers.interval_secs;
        let end_time = Utc::now() + ChronoDuration::seconds(duration as i64);
        let updated = self
            .store()
            .transition_phase(
                room_id,
                Some(RoundPhase::Reveal),
                Box::new(move |room| {
                    room.enter_phase(RoundPhase::Interval, Some(end_time));
                }),
            )
            .await?;
        let Some(room) = updated else {
            self.metrics.increment_phase_cas_losses();
            return Ok(());
        };
        self.cache().refresh(&room);
        self.announce_phase(&room).await;
        Ok(())
    }

    pub(super) async fn target_reached(&self, room_id: RoomId, target: u32) -> Result<bool> {
        if target == 0 {
            return Ok(false);
        }
        let participants = self.store().participants(room_id).await?;
        Ok(participants
            .iter()
            .any(|p| p.is_active && !p.is_banned() && p.score >= target))
    }

    // ------------------------------------------------------------------
    // game end
    // ------------------------------------------------------------------

    /// Target reached: emit `game_ended` with rankings and coin
    /// rewards, then pause briefly before the automatic return to
    /// lobby.
    pub(super) async fn end_game(self: &Arc<Self>, room_id: RoomId, from: RoundPhase) -> Result<()> {
        let Some(room) = self.fetch_room(room_id).await? else {
            return Ok(());
        };
        let participants = self.store().participants(room_id).await?;

        let pause = self.config().timers.back_to_lobby_secs;
        let end_time = Utc::now() + ChronoDuration::seconds(pause as i64);
        let updated = self
            .store()
            .transition_phase(
                room_id,
                Some(from),
                Box::new(move |room| {
                    room.current_word = None;
                    room.current_word_options = None;
                    room.current_drawer_id = None;
                    room.enter_phase(RoundPhase::IntervalEnding, Some(end_time));
                }),
            )
            .await?;
        let Some(updated_room) = updated else {
            self.metrics.increment_phase_cas_losses();
            return Ok(());
        };
        self.cache().refresh(&updated_room);

        let rankings = super::guess::compute_rankings(
            room.game_mode,
            room.settings.entry_points,
            &participants,
        );
        for entry in &rankings {
            if entry.reward > 0 {
                if let Err(err) = self.wallet().credit(entry.user_id, entry.reward).await {
                    tracing::warn!(
                        user_id = entry.user_id,
                        error = %err,
                        "Failed to credit game reward"
                    );
                }
            }
        }

        self.broadcast_to_room(
            room_id,
            ServerEvent::GameEnded {
                rankings,
                entry_cost: room.settings.entry_points,
                game_mode: room.game_mode,
            },
        )
        .await;
        self.metrics.increment_games_completed();
        tracing::info!(room_id, room_code = %room.code, "Game ended");

        self.schedule_phase_timer(&updated_room);
        Ok(())
    }

    /// interval_ending expired: scores reset, room returns to lobby.
    pub(super) async fn return_room_to_lobby(self: &Arc<Self>, room_id: RoomId) -> Result<()> {
        let updated = self
            .store()
            .transition_phase(
                room_id,
                Some(RoundPhase::IntervalEnding),
                Box::new(|room| {
                    room.reset_game_state();
                }),
            )
            .await?;
        let Some(room) = updated else {
            self.metrics.increment_phase_cas_losses();
            return Ok(());
        };
        self.cache().refresh(&room);

        self.store().reset_scores(room_id).await?;
        self.store().set_drawer(room_id, None).await?;
        self.sessions().clear_ready(room_id);

        self.broadcast_to_room(room_id, ServerEvent::RoomBackToLobby).await;
        self.broadcast_participants(&room).await;
        self.arm_lobby_idle_timer(&room);
        Ok(())
    }

    // ------------------------------------------------------------------
    // skip_turn
    // ------------------------------------------------------------------

    pub(super) async fn handle_skip_turn(
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
                tracing::error!(error = %err, "Failed to load room for skip_turn");
                return;
            }
        };

        let in_turn = matches!(
            room.round_phase,
            Some(RoundPhase::ChoosingWord | RoundPhase::Drawing)
        );
        if !in_turn {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        }
        if room.current_drawer_id != Some(user_id) {
            self.send_error(socket_id, ErrorCode::NotYourTurn).await;
            return;
        }

        let updated = match self
            .store()
            .update_participant(room_id, user_id, Box::new(|p| p.skip_count += 1))
            .await
        {
            Ok(updated) => updated,
            Err(err) => {
                tracing::error!(error = %err, "Failed to record skip");
                return;
            }
        };

        let eliminated = updated.is_some_and(|p| p.skip_count >= MAX_SKIP_COUNT);
        if eliminated {
            let _ = self.store().remove_participant(room_id, user_id).await;
            self.sessions().set_not_ready(room_id, user_id);
            self.broadcast_to_room(
                room_id,
                ServerEvent::PlayerRemoved {
                    user_id,
                    reason: RemovalReason::SkippedTooManyTimes,
                },
            )
            .await;
        } else {
            self.broadcast_to_room(room_id, ServerEvent::DrawerSkipped { user_id })
                .await;
        }

        if let Err(err) = self
            .begin_drawer_selection(room_id, room.round_phase, RoundStep::Keep)
            .await
        {
            tracing::error!(room_id, error = %err, "Failed to advance after skip");
        }
    }
}
