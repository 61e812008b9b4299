//! Server behavior configuration types.

use super::defaults::{
    default_back_to_lobby_secs, default_cache_ttl_ms, default_chat_history_limit,
    default_choosing_word_secs, default_drawing_secs, default_grace_period_secs,
    default_interval_secs, default_join_lock_ttl_ms, default_lobby_timeout_secs,
    default_permanent_leave_grace_secs, default_phase_jitter_ms, default_ping_timeout,
    default_reveal_secs, default_selecting_drawer_secs, default_starting_balance,
    default_voice_fee,
};
use crate::protocol::RoundPhase;
use serde::{Deserialize, Serialize};

/// Session and caching behavior.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Timeout for client ping responses (seconds)
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
    /// Disconnect grace window before a seat is released (seconds)
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    /// Grace window after the client announced a permanent leave (seconds)
    #[serde(default = "default_permanent_leave_grace_secs")]
    pub permanent_leave_grace_secs: u64,
    /// TTL of the hot room snapshot cache (milliseconds)
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    /// Deterministic per-room timer jitter modulus (milliseconds)
    #[serde(default = "default_phase_jitter_ms")]
    pub phase_jitter_ms: u64,
    /// TTL of the join dedup lock (milliseconds)
    #[serde(default = "default_join_lock_ttl_ms")]
    pub join_lock_ttl_ms: u64,
    /// Chat lines replayed to a joining client
    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,
    /// Starting coin grant in the in-memory wallet
    #[serde(default = "default_starting_balance")]
    pub starting_balance: u32,
    /// Per-player fee charged when voice is enabled
    #[serde(default = "default_voice_fee")]
    pub voice_fee: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ping_timeout: default_ping_timeout(),
            grace_period_secs: default_grace_period_secs(),
            permanent_leave_grace_secs: default_permanent_leave_grace_secs(),
            cache_ttl_ms: default_cache_ttl_ms(),
            phase_jitter_ms: default_phase_jitter_ms(),
            join_lock_ttl_ms: default_join_lock_ttl_ms(),
            chat_history_limit: default_chat_history_limit(),
            starting_balance: default_starting_balance(),
            voice_fee: default_voice_fee(),
        }
    }
}

/// Fixed phase durations. Overridable so integration tests can run
/// whole games in milliseconds.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TimersConfig {
    #[serde(default = "default_selecting_drawer_secs")]
    pub selecting_drawer_secs: u64,
    #[serde(default = "default_choosing_word_secs")]
    pub choosing_word_secs: u64,
    #[serde(default = "default_drawing_secs")]
    pub drawing_secs: u64,
    #[serde(default = "default_reveal_secs")]
    pub reveal_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Pause between `game_ended` and the automatic return to lobby.
    #[serde(default = "default_back_to_lobby_secs")]
    pub back_to_lobby_secs: u64,
    #[serde(default = "default_lobby_timeout_secs")]
    pub lobby_timeout_secs: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        Self {
            selecting_drawer_secs: default_selecting_drawer_secs(),
            choosing_word_secs: default_choosing_word_secs(),
            drawing_secs: default_drawing_secs(),
            reveal_secs: default_reveal_secs(),
            interval_secs: default_interval_secs(),
            back_to_lobby_secs: default_back_to_lobby_secs(),
            lobby_timeout_secs: default_lobby_timeout_secs(),
        }
    }
}

impl TimersConfig {
    /// Duration of a timed phase in seconds.
    pub fn phase_secs(&self, phase: RoundPhase) -> u64 {
        match phase {
            RoundPhase::SelectingDrawer => self.selecting_drawer_secs,
            RoundPhase::ChoosingWord => self.choosing_word_secs,
            RoundPhase::Drawing => self.drawing_secs,
            RoundPhase::Reveal => self.reveal_secs,
            RoundPhase::Interval => self.interval_secs,
            RoundPhase::IntervalEnding => self.back_to_lobby_secs,
            RoundPhase::Processing => 0,
        }
    }
}
