use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize logging: stdout plus an optional rolling file appender.
///
/// The level comes from config when set, otherwise RUST_LOG, otherwise
/// "info". Returns the file appender's flush guard when file logging is
/// enabled; the caller must keep it alive for the process lifetime or
/// buffered lines are lost on shutdown.
#[must_use]
pub fn init_with_config(cfg: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = match &cfg.level {
        Some(level) => EnvFilter::new(level.as_str()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let json = cfg.format == LogFormat::Json;

    let (file_writer, guard) = match build_file_writer(cfg) {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    // The json and text layers are distinct types, so each slot is an
    // Option layer and exactly one stdout (and at most one file) slot
    // is populated.
    let stdout_json = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stdout)
    });
    let stdout_text = (!json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(std::io::stdout)
    });
    let file_json = file_writer.clone().filter(|_| json).map(|writer| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(writer)
    });
    let file_text = file_writer.filter(|_| !json).map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_timer(UtcTime::rfc_3339())
            .with_writer(writer)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stdout_json)
        .with(stdout_text)
        .with(file_json)
        .with(file_text)
        .try_init();

    guard
}

/// Non-blocking rolling file writer, or `None` when file logging is
/// disabled or the log directory cannot be created (stdout logging
/// still works in that case).
fn build_file_writer(cfg: &LoggingConfig) -> Option<(NonBlocking, WorkerGuard)> {
    if !cfg.enable_file_logging {
        return None;
    }

    let rotation = match cfg.rotation.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    };

    if let Err(err) = std::fs::create_dir_all(&cfg.dir) {
        eprintln!(
            "Failed to create log directory '{}': {err}; continuing with stdout logs",
            cfg.dir
        );
        return None;
    }

    let appender = RollingFileAppender::new(rotation, &cfg.dir, &cfg.filename);
    Some(tracing_appender::non_blocking(appender))
}
