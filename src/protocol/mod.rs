// Protocol module: event types, error codes, and the room record

pub mod error_codes;
pub mod messages;
pub mod room_codes;
pub mod room_state;
pub mod types;

pub use error_codes::ErrorCode;

pub use types::{
    ChatLine, GameMode, ParticipantInfo, RankingEntry, ReportKind, RoomId, RoomSettings,
    RoomStatus, RoundPhase, Script, SettingsPatch, SocketId, Team, UserId,
    DEFAULT_ELIMINATION_COUNT, DEFAULT_MAX_PLAYERS, MAX_MAX_PLAYERS, MAX_POINTS_PER_ROUND,
    MAX_SKIP_COUNT, MIN_MAX_PLAYERS, ROOM_CODE_LENGTH,
};

pub use messages::{ClientEvent, RemovalReason, RoomStatePayload, ServerEvent};

pub use room_state::{remaining_seconds, Room};
