//! Configuration module.
//!
//! Supports JSON configuration files, environment variable overrides,
//! and compiled-in defaults.
//!
//! # Module Structure
//!
//! - [`types`]: Root `Config` struct
//! - [`server`]: Session behavior and phase durations
//! - [`security`]: Token secret, CORS, message limits, voice IP
//! - [`logging`]: Logging configuration
//! - [`loader`]: Configuration loading functions
//! - [`validation`]: Configuration validation functions
//! - [`defaults`]: Default value functions

pub mod defaults;
pub mod loader;
pub mod logging;
pub mod security;
pub mod server;
pub mod types;
pub mod validation;

pub use loader::load;

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use security::SecurityConfig;

pub use server::{ServerConfig, TimersConfig};

pub use types::Config;

pub use validation::{is_production_mode, validate_config_security};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RoundPhase;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();

        assert_eq!(config.port, 3840);
        assert_eq!(config.server.ping_timeout, 30);
        assert_eq!(config.server.grace_period_secs, 90);
        assert_eq!(config.server.permanent_leave_grace_secs, 1);
        assert_eq!(config.server.cache_ttl_ms, 3_000);
        assert_eq!(config.server.phase_jitter_ms, 250);
        assert_eq!(config.server.join_lock_ttl_ms, 2_000);

        assert_eq!(config.timers.selecting_drawer_secs, 5);
        assert_eq!(config.timers.choosing_word_secs, 10);
        assert_eq!(config.timers.drawing_secs, 80);
        assert_eq!(config.timers.reveal_secs, 7);
        assert_eq!(config.timers.interval_secs, 4);
        assert_eq!(config.timers.lobby_timeout_secs, 120);

        assert_eq!(config.logging.dir, "logs");
        assert_eq!(config.logging.filename, "server.log");
        assert_eq!(config.logging.rotation, "daily");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let deserialized: Config = serde_json::from_str(&json).unwrap();

        assert_eq!(config.port, deserialized.port);
        assert_eq!(
            config.server.grace_period_secs,
            deserialized.server.grace_period_secs
        );
        assert_eq!(config.timers.drawing_secs, deserialized.timers.drawing_secs);
    }

    #[test]
    fn test_phase_duration_lookup() {
        let timers = TimersConfig::default();
        assert_eq!(timers.phase_secs(RoundPhase::SelectingDrawer), 5);
        assert_eq!(timers.phase_secs(RoundPhase::ChoosingWord), 10);
        assert_eq!(timers.phase_secs(RoundPhase::Drawing), 80);
        assert_eq!(timers.phase_secs(RoundPhase::Reveal), 7);
        assert_eq!(timers.phase_secs(RoundPhase::Interval), 4);
        assert_eq!(timers.phase_secs(RoundPhase::Processing), 0);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let raw = r#"{"port": 9000, "timers": {"drawing_secs": 5}}"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.timers.drawing_secs, 5);
        assert_eq!(config.timers.reveal_secs, 7);
        assert_eq!(config.server.grace_period_secs, 90);
    }
}
