use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes surfaced to clients inside `error {message}` events.
/// The wire form is the snake_case name, matching what game clients
/// switch on.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Session / auth
    NotAuthenticated,
    ServerSyncing,
    ExitedDueToInactivity,

    // Room membership
    RoomNotFound,
    RoomClosed,
    RoomFull,
    YouAreBanned,

    // Ownership / pregame guards
    OnlyOwnerCanUpdateSettings,
    OnlyOwnerCanStartGame,
    OnlyOwnerCanRemoveParticipants,
    OnlyOwnerCanContinueWaiting,
    CannotUpdateAfterGameStarted,
    CannotChangeTeamAfterGameStarted,
    CannotRemoveSelf,
    CannotRemoveDuringGame,
    InvalidMaxPlayers,

    // Team selection
    InvalidTeam,
    NotTeamMode,
    BothTeamsNeedPlayers,

    // Game start
    NotEnoughPlayers,
    NotAllReady,
    InsufficientCoins,

    // In-round guards
    NotYourTurn,
    WrongPhase,
    InvalidWordChoice,
    AlreadyGuessed,
    DrawerCannotGuess,
    WrongTeam,
    RoundEnded,
}

impl ErrorCode {
    /// Human-readable message delivered alongside the code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotAuthenticated => "Authenticate before sending game events.",
            Self::ServerSyncing => "The server is restoring game state. Retry in a moment.",
            Self::ExitedDueToInactivity => {
                "Your seat was released after the disconnect grace period expired."
            }
            Self::RoomNotFound => "No room exists with that code or id.",
            Self::RoomClosed => "The room has been closed.",
            Self::RoomFull => "The room has reached its player limit.",
            Self::YouAreBanned => "You have been banned from this room.",
            Self::OnlyOwnerCanUpdateSettings => "Only the room owner can change settings.",
            Self::OnlyOwnerCanStartGame => "Only the room owner can start the game.",
            Self::OnlyOwnerCanRemoveParticipants => {
                "Only the room owner can remove participants."
            }
            Self::OnlyOwnerCanContinueWaiting => {
                "Only the room owner can extend the lobby timer."
            }
            Self::CannotUpdateAfterGameStarted => {
                "Settings are locked once the game has started."
            }
            Self::CannotChangeTeamAfterGameStarted => {
                "Teams are locked once the game has started."
            }
            Self::CannotRemoveSelf => "Use leave_room to exit your own room.",
            Self::CannotRemoveDuringGame => "Participants cannot be removed mid-game.",
            Self::InvalidMaxPlayers => "max_players must be between 2 and 15.",
            Self::InvalidTeam => "Team must be blue or orange.",
            Self::NotTeamMode => "This room is not in team mode.",
            Self::BothTeamsNeedPlayers => "Both teams need at least two players to start.",
            Self::NotEnoughPlayers => "At least two players are required to start.",
            Self::NotAllReady => "All players must be ready before starting.",
            Self::InsufficientCoins => "Not enough coins for the entry fee.",
            Self::NotYourTurn => "You are not the current drawer.",
            Self::WrongPhase => "That action is not allowed in the current phase.",
            Self::InvalidWordChoice => "Pick one of the offered words.",
            Self::AlreadyGuessed => "You already guessed correctly this round.",
            Self::DrawerCannotGuess => "The drawer cannot submit guesses.",
            Self::WrongTeam => "Only the drawer's team can guess this round.",
            Self::RoundEnded => "The round has already ended.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_is_snake_case() {
        let json = serde_json::to_string(&ErrorCode::RoomNotFound).unwrap();
        assert_eq!(json, "\"room_not_found\"");
        let json = serde_json::to_string(&ErrorCode::OnlyOwnerCanStartGame).unwrap();
        assert_eq!(json, "\"only_owner_can_start_game\"");
        let json = serde_json::to_string(&ErrorCode::ExitedDueToInactivity).unwrap();
        assert_eq!(json, "\"exited_due_to_inactivity\"");
    }

    #[test]
    fn test_all_error_codes_have_descriptions() {
        let codes = [
            ErrorCode::NotAuthenticated,
            ErrorCode::ServerSyncing,
            ErrorCode::ExitedDueToInactivity,
            ErrorCode::RoomNotFound,
            ErrorCode::RoomClosed,
            ErrorCode::RoomFull,
            ErrorCode::YouAreBanned,
            ErrorCode::OnlyOwnerCanUpdateSettings,
            ErrorCode::OnlyOwnerCanStartGame,
            ErrorCode::OnlyOwnerCanRemoveParticipants,
            ErrorCode::OnlyOwnerCanContinueWaiting,
            ErrorCode::CannotUpdateAfterGameStarted,
            ErrorCode::CannotChangeTeamAfterGameStarted,
            ErrorCode::CannotRemoveSelf,
            ErrorCode::CannotRemoveDuringGame,
            ErrorCode::InvalidMaxPlayers,
            ErrorCode::InvalidTeam,
            ErrorCode::NotTeamMode,
            ErrorCode::BothTeamsNeedPlayers,
            ErrorCode::NotEnoughPlayers,
            ErrorCode::NotAllReady,
            ErrorCode::InsufficientCoins,
            ErrorCode::NotYourTurn,
            ErrorCode::WrongPhase,
            ErrorCode::InvalidWordChoice,
            ErrorCode::AlreadyGuessed,
            ErrorCode::DrawerCannotGuess,
            ErrorCode::WrongTeam,
            ErrorCode::RoundEnded,
        ];
        for code in &codes {
            assert!(
                code.description().len() > 10,
                "ErrorCode::{code:?} has a suspiciously short description"
            );
        }
    }
}
