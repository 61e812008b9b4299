use crate::protocol::{
    room_codes, ChatLine, GameMode, ReportKind, Room, RoomId, RoomSettings, RoomStatus,
    RoundPhase, SettingsPatch, SocketId, Team, UserId, DEFAULT_ELIMINATION_COUNT,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};

/// One record per (room, user), kept across disconnects. The grace
/// window works by clearing `socket_id` while leaving `is_active` set.
#[derive(Debug, Clone)]
pub struct Participant {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub team: Option<Team>,
    pub is_drawer: bool,
    pub score: u32,
    /// Wall-clock instant of the last score increase; ASC tie-breaker
    /// behind DESC score.
    pub points_updated_at: DateTime<Utc>,
    pub has_guessed_this_round: bool,
    pub has_paid_entry: bool,
    pub has_drawn: bool,
    /// Chances left to pick a word before removal; reset when a word is
    /// chosen.
    pub elimination_count: u8,
    pub skip_count: u8,
    pub is_active: bool,
    pub socket_id: Option<SocketId>,
    /// Bans apply to this room only.
    pub banned_at: Option<DateTime<Utc>>,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(room_id: RoomId, user_id: UserId, team: Option<Team>) -> Self {
        let now = Utc::now();
        Self {
            room_id,
            user_id,
            team,
            is_drawer: false,
            score: 0,
            points_updated_at: now,
            has_guessed_this_round: false,
            has_paid_entry: false,
            has_drawn: false,
            elimination_count: DEFAULT_ELIMINATION_COUNT,
            skip_count: 0,
            is_active: true,
            socket_id: None,
            banned_at: None,
            joined_at: now,
        }
    }

    pub fn is_banned(&self) -> bool {
        self.banned_at.is_some()
    }
}

/// Accumulated reports against one target in one room.
#[derive(Debug, Clone)]
pub struct Report {
    pub room_id: RoomId,
    pub target_user_id: UserId,
    pub kind: ReportKind,
    pub reporters: std::collections::BTreeSet<UserId>,
    pub strike_count: u32,
}

/// Outcome of a join attempt, decided under the capacity lock.
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Joined(Participant),
    /// The user already had a seat (reconnect path); record untouched.
    Rejoined(Participant),
    Full,
    Banned,
    Closed,
    NotFound,
}

/// Mutation applied to a room inside a successful phase transition.
pub type PhaseMutation = Box<dyn FnOnce(&mut Room) + Send>;

/// Mutation applied to a single participant record.
pub type ParticipantMutation = Box<dyn FnOnce(&mut Participant) + Send>;

/// Storage abstraction for rooms, participants, chat, and reports.
///
/// `transition_phase` is the sole permitted way to change `round_phase`:
/// it is a compare-and-update predicated on the caller's expected
/// predecessor phase, and every possibly-racing caller (timer expiry,
/// reconnect resume, report-driven skip, team first-correct) goes
/// through it. Multi-participant invariants (capacity on join, team-wide
/// awards) run inside the store's critical sections, the in-process
/// equivalent of short row-locked transactions.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn initialize(&self) -> Result<()>;

    async fn create_room(
        &self,
        owner_id: UserId,
        max_players: u8,
        is_public: bool,
        game_mode: GameMode,
        settings: RoomSettings,
    ) -> Result<Room>;

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>>;

    async fn get_room_by_code(&self, code: &str) -> Result<Option<Room>>;

    /// Remove the room and everything keyed by it.
    async fn delete_room(&self, room_id: RoomId) -> Result<bool>;

    /// Rooms mid-game, for the startup timer rebuild.
    async fn list_playing_rooms(&self) -> Result<Vec<Room>>;

    /// Compare-and-update on `round_phase`: applies `apply` only when the
    /// current phase equals `from`, returning the post-image. `None`
    /// means a concurrent caller won; losers exit silently.
    async fn transition_phase(
        &self,
        room_id: RoomId,
        from: Option<RoundPhase>,
        apply: PhaseMutation,
    ) -> Result<Option<Room>>;

    /// Settings update outside the phase machine (pregame only; the
    /// status check belongs to the caller).
    async fn update_settings(&self, room_id: RoomId, patch: SettingsPatch)
        -> Result<Option<Room>>;

    async fn set_room_status(&self, room_id: RoomId, status: RoomStatus) -> Result<Option<Room>>;

    /// Bump the canvas version (canvas clear) and return the new value.
    async fn bump_canvas_version(&self, room_id: RoomId) -> Result<Option<u32>>;

    /// Join enforcing `max_players` by counting active participants
    /// under the lock. An existing seat is returned as `Rejoined`.
    async fn join_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        team: Option<Team>,
    ) -> Result<JoinOutcome>;

    async fn get_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>>;

    /// All participants ordered by user id (the rotation order).
    async fn participants(&self, room_id: RoomId) -> Result<Vec<Participant>>;

    async fn update_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
        apply: ParticipantMutation,
    ) -> Result<Option<Participant>>;

    async fn remove_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>>;

    /// Mark `drawer` as the single drawer, clearing the flag everywhere
    /// else.
    async fn set_drawer(&self, room_id: RoomId, drawer: Option<UserId>) -> Result<()>;

    /// Award points to one participant; returns the new score. Sets
    /// `points_updated_at` and optionally `has_guessed_this_round`.
    async fn award_player(
        &self,
        room_id: RoomId,
        user_id: UserId,
        reward: u32,
        mark_guessed: bool,
    ) -> Result<Option<u32>>;

    /// Award the whole team exactly once per round: if any active member
    /// already has `has_guessed_this_round`, returns `None` and changes
    /// nothing. Otherwise awards every active member in one critical
    /// section and returns their (user, new score) pairs.
    async fn award_team(
        &self,
        room_id: RoomId,
        team: Team,
        reward: u32,
    ) -> Result<Option<Vec<(UserId, u32)>>>;

    /// Clear per-round guess flags for every participant.
    async fn reset_round_flags(&self, room_id: RoomId) -> Result<()>;

    /// Zero scores and entry-paid flags when the room returns to lobby.
    async fn reset_scores(&self, room_id: RoomId) -> Result<()>;

    async fn ban_participant(&self, room_id: RoomId, user_id: UserId) -> Result<bool>;

    async fn append_message(&self, room_id: RoomId, line: ChatLine) -> Result<()>;

    async fn recent_messages(&self, room_id: RoomId, limit: usize) -> Result<Vec<ChatLine>>;

    async fn clear_messages(&self, room_id: RoomId) -> Result<()>;

    /// Record a report, deduplicated by reporter. Returns the updated
    /// strike count, or `None` when this reporter already reported.
    async fn record_report(
        &self,
        room_id: RoomId,
        target_user_id: UserId,
        kind: ReportKind,
        reporter: UserId,
    ) -> Result<Option<u32>>;

    /// Crash-recovery sweep: every participant with a null socket still
    /// marked active is flipped inactive. Returns the affected rooms so
    /// the caller can run empty-room checks.
    async fn sweep_orphaned_participants(&self) -> Result<Vec<RoomId>>;

    /// Downcast helper to access backend-specific implementations.
    fn as_any(&self) -> &(dyn Any + Send + Sync);
}

/// Store configuration — in-memory only for doodleduel-server. A SQL
/// backend would attach here.
#[derive(Debug, Clone, Default)]
pub enum StoreConfig {
    #[default]
    InMemory,
}

/// Create a store instance based on configuration.
pub async fn create_store(config: StoreConfig) -> Result<Box<dyn RoomStore>> {
    match config {
        StoreConfig::InMemory => Ok(Box::new(InMemoryStore::new())),
    }
}

/// In-memory store for single-instance deployments and tests. The rooms
/// write lock is the row-lock equivalent; every compound invariant is
/// decided while holding it.
pub struct InMemoryStore {
    rooms: tokio::sync::RwLock<HashMap<RoomId, Room>>,
    room_codes: tokio::sync::RwLock<HashMap<String, RoomId>>,
    /// BTreeMap keeps participants in user-id order, which is the
    /// drawer rotation order.
    participants: tokio::sync::RwLock<HashMap<RoomId, BTreeMap<UserId, Participant>>>,
    messages: tokio::sync::RwLock<HashMap<RoomId, Vec<ChatLine>>>,
    reports: tokio::sync::RwLock<HashMap<(RoomId, UserId, ReportKind), Report>>,
    next_room_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: tokio::sync::RwLock::new(HashMap::new()),
            room_codes: tokio::sync::RwLock::new(HashMap::new()),
            participants: tokio::sync::RwLock::new(HashMap::new()),
            messages: tokio::sync::RwLock::new(HashMap::new()),
            reports: tokio::sync::RwLock::new(HashMap::new()),
            next_room_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomStore for InMemoryStore {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn create_room(
        &self,
        owner_id: UserId,
        max_players: u8,
        is_public: bool,
        game_mode: GameMode,
        settings: RoomSettings,
    ) -> Result<Room> {
        // Lock ordering: rooms first, then room_codes (consistent with
        // delete_room). Both are held so no task can observe a code
        // mapping without its room.
        let mut rooms = self.rooms.write().await;
        let mut codes = self.room_codes.write().await;

        let code = {
            let mut attempts = 0u8;
            loop {
                let candidate = room_codes::generate_room_code();
                if !codes.contains_key(&candidate) {
                    break candidate;
                }
                attempts += 1;
                if attempts >= 16 {
                    anyhow::bail!("Failed to generate unique room code after {attempts} attempts");
                }
            }
        };

        let room_id = self.next_room_id.fetch_add(1, Ordering::SeqCst);
        let room = Room::new(
            room_id,
            code.clone(),
            owner_id,
            max_players,
            is_public,
            game_mode,
            settings,
        );

        rooms.insert(room_id, room.clone());
        codes.insert(code, room_id);

        Ok(room)
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Option<Room>> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(&room_id).cloned())
    }

    async fn get_room_by_code(&self, code: &str) -> Result<Option<Room>> {
        let rooms = self.rooms.read().await;
        let codes = self.room_codes.read().await;
        if let Some(room_id) = codes.get(code) {
            if let Some(room) = rooms.get(room_id) {
                return Ok(Some(room.clone()));
            }
        }
        Ok(None)
    }

    async fn delete_room(&self, room_id: RoomId) -> Result<bool> {
        let mut rooms = self.rooms.write().await;
        let mut codes = self.room_codes.write().await;
        let mut participants = self.participants.write().await;
        let mut messages = self.messages.write().await;
        let mut reports = self.reports.write().await;

        if let Some(room) = rooms.remove(&room_id) {
            codes.remove(&room.code);
            participants.remove(&room_id);
            messages.remove(&room_id);
            reports.retain(|(rid, _, _), _| *rid != room_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_playing_rooms(&self) -> Result<Vec<Room>> {
        let rooms = self.rooms.read().await;
        Ok(rooms
            .values()
            .filter(|room| room.status == RoomStatus::Playing)
            .cloned()
            .collect())
    }

    async fn transition_phase(
        &self,
        room_id: RoomId,
        from: Option<RoundPhase>,
        apply: PhaseMutation,
    ) -> Result<Option<Room>> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&room_id) else {
            return Ok(None);
        };
        if room.round_phase != from {
            return Ok(None);
        }
        apply(room);
        room.update_activity();
        Ok(Some(room.clone()))
    }

    async fn update_settings(
        &self,
        room_id: RoomId,
        patch: SettingsPatch,
    ) -> Result<Option<Room>> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&room_id) else {
            return Ok(None);
        };

        if let Some(language) = patch.language {
            room.settings.language = language;
        }
        if let Some(script) = patch.script {
            room.settings.script = script;
        }
        if let Some(country) = patch.country {
            room.settings.country = country;
        }
        if let Some(categories) = patch.categories {
            room.settings.categories = categories;
        }
        if let Some(entry_points) = patch.entry_points {
            room.settings.entry_points = entry_points;
        }
        if let Some(target_points) = patch.target_points {
            room.settings.target_points = target_points;
        }
        if let Some(voice_enabled) = patch.voice_enabled {
            room.settings.voice_enabled = voice_enabled;
        }
        if let Some(max_players) = patch.max_players {
            room.max_players = max_players;
        }
        if let Some(is_public) = patch.is_public {
            room.is_public = is_public;
        }
        if let Some(game_mode) = patch.game_mode {
            room.game_mode = game_mode;
        }
        room.update_activity();
        Ok(Some(room.clone()))
    }

    async fn set_room_status(&self, room_id: RoomId, status: RoomStatus) -> Result<Option<Room>> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&room_id) else {
            return Ok(None);
        };
        room.status = status;
        room.update_activity();
        Ok(Some(room.clone()))
    }

    async fn bump_canvas_version(&self, room_id: RoomId) -> Result<Option<u32>> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(&room_id) else {
            return Ok(None);
        };
        room.canvas_version += 1;
        Ok(Some(room.canvas_version))
    }

    async fn join_room(
        &self,
        room_id: RoomId,
        user_id: UserId,
        team: Option<Team>,
    ) -> Result<JoinOutcome> {
        let rooms = self.rooms.read().await;
        let mut participants = self.participants.write().await;

        let Some(room) = rooms.get(&room_id) else {
            return Ok(JoinOutcome::NotFound);
        };
        if room.status == RoomStatus::Closed {
            return Ok(JoinOutcome::Closed);
        }

        let seats = participants.entry(room_id).or_default();

        if let Some(existing) = seats.get(&user_id) {
            if existing.is_banned() {
                return Ok(JoinOutcome::Banned);
            }
            return Ok(JoinOutcome::Rejoined(existing.clone()));
        }

        // Capacity is decided here, under the participants write lock,
        // so two concurrent joins cannot both observe a free seat.
        let active_count = seats.values().filter(|p| p.is_active).count();
        if active_count >= room.max_players as usize {
            return Ok(JoinOutcome::Full);
        }

        let participant = Participant::new(room_id, user_id, team);
        seats.insert(user_id, participant.clone());
        Ok(JoinOutcome::Joined(participant))
    }

    async fn get_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>> {
        let participants = self.participants.read().await;
        Ok(participants
            .get(&room_id)
            .and_then(|seats| seats.get(&user_id))
            .cloned())
    }

    async fn participants(&self, room_id: RoomId) -> Result<Vec<Participant>> {
        let participants = self.participants.read().await;
        Ok(participants
            .get(&room_id)
            .map(|seats| seats.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
        apply: ParticipantMutation,
    ) -> Result<Option<Participant>> {
        let mut participants = self.participants.write().await;
        let Some(participant) = participants
            .get_mut(&room_id)
            .and_then(|seats| seats.get_mut(&user_id))
        else {
            return Ok(None);
        };
        apply(participant);
        Ok(Some(participant.clone()))
    }

    async fn remove_participant(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> Result<Option<Participant>> {
        let mut participants = self.participants.write().await;
        Ok(participants
            .get_mut(&room_id)
            .and_then(|seats| seats.remove(&user_id)))
    }

    async fn set_drawer(&self, room_id: RoomId, drawer: Option<UserId>) -> Result<()> {
        let mut participants = self.participants.write().await;
        if let Some(seats) = participants.get_mut(&room_id) {
            for participant in seats.values_mut() {
                participant.is_drawer = Some(participant.user_id) == drawer;
            }
        }
        Ok(())
    }

    async fn award_player(
        &self,
        room_id: RoomId,
        user_id: UserId,
        reward: u32,
        mark_guessed: bool,
    ) -> Result<Option<u32>> {
        let mut participants = self.participants.write().await;
        let Some(participant) = participants
            .get_mut(&room_id)
            .and_then(|seats| seats.get_mut(&user_id))
        else {
            return Ok(None);
        };
        participant.score += reward;
        participant.points_updated_at = Utc::now();
        if mark_guessed {
            participant.has_guessed_this_round = true;
        }
        Ok(Some(participant.score))
    }

    async fn award_team(
        &self,
        room_id: RoomId,
        team: Team,
        reward: u32,
    ) -> Result<Option<Vec<(UserId, u32)>>> {
        let mut participants = self.participants.write().await;
        let Some(seats) = participants.get_mut(&room_id) else {
            return Ok(None);
        };

        // The once-per-round check and the award share one critical
        // section, so a racing second guess observes the flags already
        // set and awards nothing.
        let already_awarded = seats
            .values()
            .any(|p| p.team == Some(team) && p.is_active && p.has_guessed_this_round);
        if already_awarded {
            return Ok(None);
        }

        let now = Utc::now();
        let mut awarded = Vec::new();
        for participant in seats.values_mut() {
            if participant.team == Some(team) && participant.is_active {
                participant.score += reward;
                participant.points_updated_at = now;
                participant.has_guessed_this_round = true;
                awarded.push((participant.user_id, participant.score));
            }
        }
        Ok(Some(awarded))
    }

    async fn reset_round_flags(&self, room_id: RoomId) -> Result<()> {
        let mut participants = self.participants.write().await;
        if let Some(seats) = participants.get_mut(&room_id) {
            for participant in seats.values_mut() {
                participant.has_guessed_this_round = false;
            }
        }
        Ok(())
    }

    async fn reset_scores(&self, room_id: RoomId) -> Result<()> {
        let mut participants = self.participants.write().await;
        if let Some(seats) = participants.get_mut(&room_id) {
            for participant in seats.values_mut() {
                participant.score = 0;
                participant.has_guessed_this_round = false;
                participant.has_paid_entry = false;
                participant.has_drawn = false;
                participant.is_drawer = false;
                participant.elimination_count = DEFAULT_ELIMINATION_COUNT;
                participant.skip_count = 0;
            }
        }
        Ok(())
    }

    async fn ban_participant(&self, room_id: RoomId, user_id: UserId) -> Result<bool> {
        let mut participants = self.participants.write().await;
        let Some(participant) = participants
            .get_mut(&room_id)
            .and_then(|seats| seats.get_mut(&user_id))
        else {
            return Ok(false);
        };
        participant.banned_at = Some(Utc::now());
        participant.is_active = false;
        Ok(true)
    }

    async fn append_message(&self, room_id: RoomId, line: ChatLine) -> Result<()> {
        let mut messages = self.messages.write().await;
        messages.entry(room_id).or_default().push(line);
        Ok(())
    }

    async fn recent_messages(&self, room_id: RoomId, limit: usize) -> Result<Vec<ChatLine>> {
        let messages = self.messages.read().await;
        Ok(messages
            .get(&room_id)
            .map(|lines| {
                let skip = lines.len().saturating_sub(limit);
                lines.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn clear_messages(&self, room_id: RoomId) -> Result<()> {
        let mut messages = self.messages.write().await;
        messages.remove(&room_id);
        Ok(())
    }

    async fn record_report(
        &self,
        room_id: RoomId,
        target_user_id: UserId,
        kind: ReportKind,
        reporter: UserId,
    ) -> Result<Option<u32>> {
        let mut reports = self.reports.write().await;
        let report = reports
            .entry((room_id, target_user_id, kind))
            .or_insert_with(|| Report {
                room_id,
                target_user_id,
                kind,
                reporters: std::collections::BTreeSet::new(),
                strike_count: 0,
            });
        if !report.reporters.insert(reporter) {
            return Ok(None);
        }
        report.strike_count += 1;
        Ok(Some(report.strike_count))
    }

    async fn sweep_orphaned_participants(&self) -> Result<Vec<RoomId>> {
        let mut participants = self.participants.write().await;
        let mut affected = Vec::new();
        for (room_id, seats) in participants.iter_mut() {
            let mut touched = false;
            for participant in seats.values_mut() {
                if participant.socket_id.is_none() && participant.is_active {
                    participant.is_active = false;
                    touched = true;
                }
            }
            if touched {
                affected.push(*room_id);
            }
        }
        Ok(affected)
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }
}
