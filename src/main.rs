#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use doodleduel_server::auth::SessionTokens;
use doodleduel_server::config;
use doodleduel_server::logging;
use doodleduel_server::server::{GameServer, ServerConfig};
use doodleduel_server::voice::NullVoiceRelay;
use doodleduel_server::wallet::InMemoryWallet;
use doodleduel_server::websocket;
use doodleduel_server::words::InMemoryWordCatalog;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::Duration;

/// Doodle Duel -- authoritative WebSocket server for the drawing game
#[derive(Parser, Debug)]
#[command(name = "doodleduel-server")]
#[command(about = "Authoritative real-time server for a multiplayer drawing-and-guessing game")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    /// Useful for CI/CD pipelines and pre-deployment checks.
    #[arg(long, short = 'c', conflicts_with_all = ["print_config", "issue_token"])]
    validate_config: bool,

    /// Print the loaded configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with_all = ["validate_config", "issue_token"])]
    print_config: bool,

    /// Issue a session token for the given user id and exit.
    /// Local development tool; production tokens come from the account
    /// service.
    #[arg(long, value_name = "USER_ID")]
    issue_token: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration from config.json if present; otherwise use
    // code defaults.
    let cfg = Arc::new(config::load());

    if cli.print_config {
        let json = serde_json::to_string_pretty(&*cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config_security(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!("  Storage backend: InMemory");
                println!(
                    "  Token secret configured: {}",
                    cfg.security.token_secret.is_some()
                );
                println!("  Grace period: {}s", cfg.server.grace_period_secs);
                println!("  Drawing phase: {}s", cfg.timers.drawing_secs);
                println!("  Lobby timeout: {}s", cfg.timers.lobby_timeout_secs);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    // A missing secret outside production gets an ephemeral one; every
    // restart invalidates outstanding dev tokens, which is fine.
    let secret = cfg.security.token_secret.clone().unwrap_or_else(|| {
        let generated = uuid::Uuid::new_v4().to_string();
        eprintln!("No token secret configured; using an ephemeral development secret");
        generated
    });
    let tokens = SessionTokens::new(&secret);

    if let Some(user_id) = cli.issue_token {
        println!("{}", tokens.issue(user_id, cfg.security.token_ttl_secs));
        return Ok(());
    }

    // The guard flushes buffered file logs when main returns.
    let _log_guard = logging::init_with_config(&cfg.logging);

    let port: u16 = cfg.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "Starting Doodle Duel server");

    let server_config = ServerConfig {
        grace_period: Duration::from_secs(cfg.server.grace_period_secs),
        permanent_leave_grace: Duration::from_secs(cfg.server.permanent_leave_grace_secs),
        cache_ttl: Duration::from_millis(cfg.server.cache_ttl_ms),
        phase_jitter_ms: cfg.server.phase_jitter_ms,
        join_lock_ttl: Duration::from_millis(cfg.server.join_lock_ttl_ms),
        chat_history_limit: cfg.server.chat_history_limit,
        starting_balance: cfg.server.starting_balance,
        voice_fee: cfg.server.voice_fee,
        max_message_size: cfg.security.max_message_size,
        timers: cfg.timers.clone(),
    };

    let wallet = Arc::new(InMemoryWallet::new(cfg.server.starting_balance));
    let words = Arc::new(InMemoryWordCatalog::with_builtin_words());
    let voice = Arc::new(NullVoiceRelay);

    let game_server = GameServer::new(server_config, tokens, words, wallet, voice).await?;

    // Crash recovery runs before the listener accepts game traffic;
    // the join gate answers early connectors with server_syncing.
    let startup_server = game_server.clone();
    tokio::spawn(async move {
        if let Err(err) = startup_server.startup().await {
            tracing::error!(error = %err, "Startup recovery failed; retrying");
            loop {
                tokio::time::sleep(Duration::from_secs(5)).await;
                match startup_server.startup().await {
                    Ok(()) => break,
                    Err(err) => {
                        tracing::error!(error = %err, "Startup recovery retry failed");
                    }
                }
            }
        }
    });

    let app = websocket::create_router(&cfg.security.cors_origins).with_state(game_server);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cors_origins = %cfg.security.cors_origins,
        "Server started - WebSocket: /ws, Health: /health, Metrics: /metrics"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod cli_tests {
    use super::Cli;
    use clap::Parser;

    #[test]
    fn test_cli_default_no_flags() {
        let cli = Cli::try_parse_from(["doodleduel-server"]).unwrap();
        assert!(!cli.validate_config);
        assert!(!cli.print_config);
        assert!(cli.issue_token.is_none());
    }

    #[test]
    fn test_cli_validate_config_short() {
        let cli = Cli::try_parse_from(["doodleduel-server", "-c"]).unwrap();
        assert!(cli.validate_config);
    }

    #[test]
    fn test_cli_issue_token_takes_user_id() {
        let cli = Cli::try_parse_from(["doodleduel-server", "--issue-token", "42"]).unwrap();
        assert_eq!(cli.issue_token, Some(42));
    }

    #[test]
    fn test_cli_validate_and_print_config_conflict() {
        let result =
            Cli::try_parse_from(["doodleduel-server", "--validate-config", "--print-config"]);
        assert!(result.is_err());
    }
}
