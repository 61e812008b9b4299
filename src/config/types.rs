//! Root configuration type.

use super::defaults::default_port;
use super::logging::LoggingConfig;
use super::security::SecurityConfig;
use super::server::{ServerConfig, TimersConfig};
use serde::{Deserialize, Serialize};

/// Root configuration struct for the server binary.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timers: TimersConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            server: ServerConfig::default(),
            timers: TimersConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
