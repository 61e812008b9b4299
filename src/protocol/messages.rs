use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::error_codes::ErrorCode;
use super::types::{
    ChatLine, GameMode, ParticipantInfo, RankingEntry, ReportKind, RoomId, RoomSettings,
    RoomStatus, RoundPhase, SettingsPatch, SocketId, Team, UserId,
};

/// Why a participant was removed from a room.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    FailedToChooseWord,
    SkippedTooManyTimes,
    RemovedByOwner,
    Banned,
}

/// Events sent from client to server.
///
/// Room-scoped events accept either a numeric `room_id` or the
/// human-readable `room_code`; at least one must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ClientEvent {
    /// Authenticate with a bearer session token (MUST be first event).
    Authenticate { token: String },
    /// Heartbeat.
    Ping {},
    JoinRoom {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
        #[serde(default)]
        team: Option<Team>,
    },
    LeaveRoom {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
    },
    /// Owner-only; lobby/waiting only.
    UpdateSettings {
        room_id: RoomId,
        settings: SettingsPatch,
    },
    SelectTeam { room_id: RoomId, team: Team },
    SetReady {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
    },
    SetNotReady {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
    },
    RemoveParticipant { room_id: RoomId, user_id: UserId },
    /// Owner resets the lobby idle timer.
    ContinueWaiting { room_id: RoomId },
    StartGame {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
    },
    ChooseWord { room_id: RoomId, word: String },
    DrawingData {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
        strokes: serde_json::Value,
        #[serde(default)]
        is_finished: Option<bool>,
        #[serde(default)]
        canvas_version: Option<u32>,
        sequence: u64,
    },
    ClearCanvas {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
        canvas_version: u32,
    },
    /// The drawer serves a canvas snapshot to a resyncing participant.
    SendCanvasData {
        room_code: String,
        #[serde(default)]
        target_user_id: Option<UserId>,
        #[serde(default)]
        target_socket_id: Option<SocketId>,
        history: serde_json::Value,
        last_sequence: u64,
        remaining_time: u64,
    },
    ResyncDone {},
    ChatMessage {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
        content: String,
    },
    SubmitGuess {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
        guess: String,
    },
    /// Current drawer forfeits the turn.
    SkipTurn { room_id: RoomId },
    /// Drawer-originated hint relay.
    WordHint {
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        room_code: Option<String>,
        revealed_word: String,
        hints_remaining: u8,
    },
    /// Shortens the disconnect grace window to one second.
    PrepareToLeavePermanently {},
    Report {
        room_id: RoomId,
        target_user_id: UserId,
        kind: ReportKind,
    },
    /// Opaque voice events, relayed to the voice collaborator.
    JoinVoice { room_id: RoomId },
    VoiceSignal {
        room_id: RoomId,
        payload: serde_json::Value,
    },
}

/// Full room snapshot delivered on join and on canvas resume.
/// Boxed in ServerEvent to reduce enum size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomStatePayload {
    pub room_id: RoomId,
    pub room_code: String,
    pub owner_id: UserId,
    pub status: RoomStatus,
    pub game_mode: GameMode,
    pub max_players: u8,
    pub is_public: bool,
    pub settings: RoomSettings,
    pub current_round: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_phase: Option<RoundPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_end_time: Option<DateTime<Utc>>,
    /// Whole seconds left in the current phase at serialization time.
    pub remaining_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_drawer_id: Option<UserId>,
    pub canvas_version: u32,
    pub participants: Vec<ParticipantInfo>,
}

/// Events sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ServerEvent {
    Authenticated { user_id: UserId },
    Pong,
    /// Successfully joined a room (boxed to reduce enum size).
    RoomJoined(Box<RoomStatePayload>),
    RoomParticipants { participants: Vec<ParticipantInfo> },
    PlayerJoined { participant: ParticipantInfo },
    PlayerLeft { user_id: UserId },
    PlayerRemoved {
        user_id: UserId,
        reason: RemovalReason,
    },
    SettingsUpdated {
        settings: RoomSettings,
        max_players: u8,
        is_public: bool,
        game_mode: GameMode,
    },
    PhaseChange {
        phase: RoundPhase,
        duration: u64,
        phase_end_time: DateTime<Utc>,
        round: u32,
    },
    DrawerSelected {
        drawer: UserId,
        preview_duration: u64,
    },
    DrawerSkipped { user_id: UserId },
    /// Sent to the drawer only.
    WordOptions {
        words: SmallVec<[String; 3]>,
        duration: u64,
    },
    ClearChat,
    DrawingData {
        from_user: UserId,
        strokes: serde_json::Value,
        is_finished: bool,
        canvas_version: u32,
        sequence: u64,
    },
    DrawingAck { sequence: u64 },
    CanvasCleared { canvas_version: u32 },
    /// Asks the current drawer to serve a snapshot to a resyncing peer.
    RequestCanvasData {
        room_code: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_user_id: Option<UserId>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_socket_id: Option<SocketId>,
    },
    /// Snapshot forwarded to the resyncing socket (boxed payload).
    CanvasResume {
        history: serde_json::Value,
        last_sequence: u64,
        remaining_time: u64,
        room: Box<RoomStatePayload>,
    },
    ChatMessage(ChatLine),
    CorrectGuess {
        user_id: UserId,
        reward: u32,
        remaining_guessers: u32,
    },
    IncorrectGuess { user_id: UserId, guess: String },
    /// Private verdict to the guesser.
    GuessResult { correct: bool, reward: u32 },
    ScoreUpdate { user_id: UserId, score: u32 },
    GameEnded {
        rankings: Vec<RankingEntry>,
        entry_cost: u32,
        game_mode: GameMode,
    },
    GameEndedInsufficientPlayers,
    RoomBackToLobby,
    RoomClosed,
    UserBanned { user_id: UserId },
    UserBannedFromRoom { user_id: UserId },
    /// Owner notification that the lobby idle timer elapsed.
    LobbyTimeExceeded,
    ExitedDueToInactivity,
    /// Joins are gated until the startup sweep finishes.
    ServerSyncing,
    WordHint {
        revealed_word: String,
        hints_remaining: u8,
    },
    VoiceSignal { payload: serde_json::Value },
    Error {
        message: String,
        code: ErrorCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<serde_json::Value>,
    },
}

impl ServerEvent {
    pub fn error(code: ErrorCode) -> Self {
        ServerEvent::Error {
            message: code.description().to_string(),
            code,
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_shape() {
        let raw = r#"{"type":"join_room","data":{"room_code":"ABCDE","team":"blue"}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        match event {
            ClientEvent::JoinRoom {
                room_id,
                room_code,
                team,
            } => {
                assert_eq!(room_id, None);
                assert_eq!(room_code.as_deref(), Some("ABCDE"));
                assert_eq!(team, Some(Team::Blue));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_empty_payload_events_parse() {
        let raw = r#"{"type":"resync_done","data":{}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, ClientEvent::ResyncDone {}));

        let raw = r#"{"type":"prepare_to_leave_permanently","data":{}}"#;
        let event: ClientEvent = serde_json::from_str(raw).unwrap();
        assert!(matches!(event, ClientEvent::PrepareToLeavePermanently {}));
    }

    #[test]
    fn test_server_event_phase_tag() {
        let event = ServerEvent::PhaseChange {
            phase: RoundPhase::Drawing,
            duration: 80,
            phase_end_time: Utc::now(),
            round: 2,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"phase_change\""));
        assert!(json.contains("\"phase\":\"drawing\""));
    }

    #[test]
    fn test_internal_processing_phase_rename() {
        let json = serde_json::to_string(&RoundPhase::Processing).unwrap();
        assert_eq!(json, "\"_internal_processing\"");
    }

    #[test]
    fn test_error_event_carries_code_and_message() {
        let event = ServerEvent::error(ErrorCode::WrongPhase);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"code\":\"wrong_phase\""));
        assert!(json.contains("not allowed"));
    }
}
