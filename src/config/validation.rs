//! Configuration validation.

use super::Config;

/// Whether the process is running in production mode
/// (`DOODLEDUEL_ENV=production`).
#[must_use]
pub fn is_production_mode() -> bool {
    std::env::var("DOODLEDUEL_ENV")
        .map(|v| v.trim().eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

/// Validate security-sensitive settings. In production a token secret
/// is mandatory; in development a missing secret only warns, because
/// the server generates an ephemeral one at startup.
pub fn validate_config_security(config: &Config) -> anyhow::Result<()> {
    let mut problems = Vec::new();

    match &config.security.token_secret {
        Some(secret) if secret.len() < 16 => {
            problems.push("security.token_secret must be at least 16 characters".to_string());
        }
        None if is_production_mode() => {
            problems.push(
                "security.token_secret is required when DOODLEDUEL_ENV=production".to_string(),
            );
        }
        _ => {}
    }

    if config.server.grace_period_secs == 0 {
        problems.push("server.grace_period_secs must be greater than zero".to_string());
    }

    if config.timers.drawing_secs == 0 {
        problems.push("timers.drawing_secs must be greater than zero".to_string());
    }

    if is_production_mode() && config.security.cors_origins == "*" {
        tracing::warn!("Permissive CORS ('*') in production; consider restricting origins");
    }

    if problems.is_empty() {
        Ok(())
    } else {
        anyhow::bail!(problems.join("\n"))
    }
}
