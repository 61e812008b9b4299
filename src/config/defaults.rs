//! Default value functions referenced by the config structs.

use super::logging::LogFormat;

pub fn default_port() -> u16 {
    3840
}

// Server behavior

pub fn default_ping_timeout() -> u64 {
    30
}

pub fn default_grace_period_secs() -> u64 {
    90
}

pub fn default_permanent_leave_grace_secs() -> u64 {
    1
}

pub fn default_cache_ttl_ms() -> u64 {
    3_000
}

pub fn default_phase_jitter_ms() -> u64 {
    250
}

pub fn default_join_lock_ttl_ms() -> u64 {
    2_000
}

pub fn default_chat_history_limit() -> usize {
    50
}

pub fn default_starting_balance() -> u32 {
    200
}

pub fn default_voice_fee() -> u32 {
    10
}

// Phase durations (seconds)

pub fn default_selecting_drawer_secs() -> u64 {
    5
}

pub fn default_choosing_word_secs() -> u64 {
    10
}

pub fn default_drawing_secs() -> u64 {
    80
}

pub fn default_reveal_secs() -> u64 {
    7
}

pub fn default_interval_secs() -> u64 {
    4
}

pub fn default_back_to_lobby_secs() -> u64 {
    2
}

pub fn default_lobby_timeout_secs() -> u64 {
    120
}

// Security

pub fn default_cors_origins() -> String {
    "*".to_string()
}

pub fn default_max_message_size() -> usize {
    65_536
}

pub fn default_token_ttl_secs() -> i64 {
    86_400
}

// Logging

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "server.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub fn default_enable_file_logging() -> bool {
    false
}

pub fn default_log_format() -> LogFormat {
    LogFormat::Text
}
