use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Numeric user identifier issued by the account service.
pub type UserId = i64;

/// Numeric room identifier, assigned sequentially by the store.
pub type RoomId = i64;

/// Per-connection socket identifier.
pub type SocketId = Uuid;

pub const ROOM_CODE_LENGTH: usize = 5;
pub const MIN_MAX_PLAYERS: u8 = 2;
pub const MAX_MAX_PLAYERS: u8 = 15;
pub const DEFAULT_MAX_PLAYERS: u8 = 8;

/// Fresh drawers get this many chances to pick a word before elimination.
pub const DEFAULT_ELIMINATION_COUNT: u8 = 3;

/// Skipping your own turn this many times removes you from the rotation.
pub const MAX_SKIP_COUNT: u8 = 3;

/// Upper bound on points a single round can award to one player.
pub const MAX_POINTS_PER_ROUND: u32 = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Team {
    Blue,
    Orange,
}

impl Team {
    pub fn other(self) -> Team {
        match self {
            Team::Blue => Team::Orange,
            Team::Orange => Team::Blue,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Team::Blue => write!(f, "blue"),
            Team::Orange => write!(f, "orange"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Solo,
    Team,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Lobby,
    Waiting,
    Playing,
    Finished,
    Closed,
}

impl RoomStatus {
    /// Settings and team changes are only allowed before a game starts.
    pub fn is_pregame(self) -> bool {
        matches!(self, RoomStatus::Lobby | RoomStatus::Waiting)
    }
}

/// The per-round phase state machine. `Processing` is a short-lived
/// sentinel claimed before work that must not be redone by a racing
/// caller; it never has a timer of its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    SelectingDrawer,
    ChoosingWord,
    Drawing,
    Reveal,
    Interval,
    #[serde(rename = "_internal_processing")]
    Processing,
    IntervalEnding,
}

impl RoundPhase {
    /// Phases that own a scheduled expiry and participate in the
    /// startup rebuild.
    pub fn is_timed(self) -> bool {
        !matches!(self, RoundPhase::Processing)
    }
}

impl std::fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoundPhase::SelectingDrawer => "selecting_drawer",
            RoundPhase::ChoosingWord => "choosing_word",
            RoundPhase::Drawing => "drawing",
            RoundPhase::Reveal => "reveal",
            RoundPhase::Interval => "interval",
            RoundPhase::Processing => "_internal_processing",
            RoundPhase::IntervalEnding => "interval_ending",
        };
        write!(f, "{name}")
    }
}

/// Word rendering requested by the room: roman transliteration,
/// native script, or plain English.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    #[default]
    Default,
    Native,
    English,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    User,
    Drawing,
}

/// Room settings, mutable only while the room is in a pregame status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomSettings {
    pub language: String,
    pub script: Script,
    /// ISO-2 country code used for word catalog regionalization.
    pub country: String,
    pub categories: BTreeSet<String>,
    pub entry_points: u32,
    pub target_points: u32,
    pub voice_enabled: bool,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            language: "english".to_string(),
            script: Script::Default,
            country: "US".to_string(),
            categories: BTreeSet::new(),
            entry_points: 0,
            target_points: 60,
            voice_enabled: false,
        }
    }
}

/// Partial settings update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<Script>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_points: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_mode: Option<GameMode>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.language.is_none()
            && self.script.is_none()
            && self.country.is_none()
            && self.categories.is_none()
            && self.entry_points.is_none()
            && self.target_points.is_none()
            && self.voice_enabled.is_none()
            && self.max_players.is_none()
            && self.is_public.is_none()
            && self.game_mode.is_none()
    }
}

/// Client-visible participant snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantInfo {
    pub user_id: UserId,
    pub team: Option<Team>,
    pub is_owner: bool,
    pub is_drawer: bool,
    pub is_ready: bool,
    pub is_active: bool,
    pub connected: bool,
    pub score: u32,
    pub has_guessed_this_round: bool,
}

/// Final standing of one player when a game ends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankingEntry {
    pub user_id: UserId,
    pub rank: u32,
    pub score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<Team>,
    pub reward: u32,
}

/// One persisted chat line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLine {
    pub user_id: UserId,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}
