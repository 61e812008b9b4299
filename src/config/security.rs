//! Security and transport configuration types.

use super::defaults::{default_cors_origins, default_max_message_size, default_token_ttl_secs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SecurityConfig {
    /// HMAC secret for session token verification. Required in
    /// production mode; a development fallback is generated otherwise.
    #[serde(default)]
    pub token_secret: Option<String>,
    /// Accepted session token lifetime (seconds), used by local token
    /// issuing tools.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: i64,
    /// Comma-separated CORS origins, or "*"
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
    /// Maximum inbound WebSocket frame size (bytes)
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Public IP announced to voice clients for SFU transports.
    #[serde(default)]
    pub announced_voice_ip: Option<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_secs: default_token_ttl_secs(),
            cors_origins: default_cors_origins(),
            max_message_size: default_max_message_size(),
            announced_voice_ip: None,
        }
    }
}
