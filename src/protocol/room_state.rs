use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::collections::BTreeSet;

use super::types::{GameMode, RoomId, RoomSettings, RoomStatus, RoundPhase, UserId};

// ============================================================================
// ROUND PHASE LIFECYCLE
// ============================================================================
//
// A playing room advances through a fixed sequence of timed phases:
//
// ```text
// lobby/waiting --start_game--> selecting_drawer
//
// selecting_drawer --timer--> choosing_word
// choosing_word --drawer picks--> drawing
// choosing_word --timer--> selecting_drawer   (elimination_count--)
// drawing --all guessed | team first-correct | timer--> reveal
// reveal --target reached--> interval_ending --> back to lobby
// reveal --timer--> interval
// interval --timer--> selecting_drawer        (current_round++)
// ```
//
// Every phase entry goes through the store's compare-and-update
// (`transition_phase`): the caller names the phase it believes the room
// is in, and loses silently if a concurrent caller got there first.
// `_internal_processing` is a claim marker for multi-step work (e.g.
// computing word options) that must not run twice.
//
// While a timed phase is active, `round_phase_end_time` holds the
// absolute wall-clock expiry. Clients derive the countdown from it, and
// a process restart reschedules timers from it, so the remaining time
// survives crashes.
//
// ============================================================================

/// The persistent room record — the single source of truth per game
/// session. Participants are stored as separate records keyed by
/// (room, user); the room carries only identifiers.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub code: String,
    pub owner_id: UserId,
    pub max_players: u8,
    pub is_public: bool,
    pub game_mode: GameMode,
    pub settings: RoomSettings,
    pub status: RoomStatus,
    pub current_round: u32,
    pub round_phase: Option<RoundPhase>,
    pub round_phase_end_time: Option<DateTime<Utc>>,
    pub current_drawer_id: Option<UserId>,
    pub last_drawer_id: Option<UserId>,
    pub current_word: Option<String>,
    pub current_word_options: Option<SmallVec<[String; 3]>>,
    pub drawer_pointer_index: usize,
    /// Who has drawn in the current cycle; reset when everyone drew.
    pub drawn_user_ids: BTreeSet<UserId>,
    /// Words already played this game; never reset mid-game.
    pub used_words: BTreeSet<String>,
    /// Bumped on every canvas clear so clients can discard stale strokes.
    pub canvas_version: u32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Room {
    pub fn new(
        id: RoomId,
        code: String,
        owner_id: UserId,
        max_players: u8,
        is_public: bool,
        game_mode: GameMode,
        settings: RoomSettings,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            code,
            owner_id,
            max_players,
            is_public,
            game_mode,
            settings,
            status: RoomStatus::Lobby,
            current_round: 0,
            round_phase: None,
            round_phase_end_time: None,
            current_drawer_id: None,
            last_drawer_id: None,
            current_word: None,
            current_word_options: None,
            drawer_pointer_index: 0,
            drawn_user_ids: BTreeSet::new(),
            used_words: BTreeSet::new(),
            canvas_version: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn update_activity(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Whole seconds left in the current phase: `max(0, ceil((end - now) / 1000))`.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u64 {
        remaining_seconds(self.round_phase_end_time, now)
    }

    /// Enter a phase, recording its absolute expiry. The expiry is `None`
    /// only for the untimed `Processing` sentinel.
    pub fn enter_phase(&mut self, phase: RoundPhase, end_time: Option<DateTime<Utc>>) {
        debug_assert!(
            end_time.is_some() || !phase.is_timed(),
            "timed phases must carry an end time"
        );
        self.round_phase = Some(phase);
        self.round_phase_end_time = end_time;
        self.update_activity();
    }

    /// Clear per-turn word and drawer state (end of a drawing turn, or
    /// drawer left mid-turn).
    pub fn clear_turn_state(&mut self) {
        self.current_word = None;
        self.current_word_options = None;
        self.current_drawer_id = None;
    }

    /// Reset everything game-scoped when the room returns to the lobby.
    pub fn reset_game_state(&mut self) {
        self.status = RoomStatus::Lobby;
        self.current_round = 0;
        self.round_phase = None;
        self.round_phase_end_time = None;
        self.clear_turn_state();
        self.last_drawer_id = None;
        self.drawer_pointer_index = 0;
        self.drawn_user_ids.clear();
        self.used_words.clear();
        self.canvas_version = 0;
        self.update_activity();
    }

    pub fn is_playing(&self) -> bool {
        self.status == RoomStatus::Playing
    }

    pub fn can_update_settings(&self) -> bool {
        self.status.is_pregame()
    }
}

/// Shared remaining-time computation used by rooms and cached snapshots.
pub fn remaining_seconds(end_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    let Some(end) = end_time else {
        return 0;
    };
    let ms = end.signed_duration_since(now).num_milliseconds();
    if ms <= 0 {
        0
    } else {
        ((ms as u64) + 999) / 1000
    }
}
