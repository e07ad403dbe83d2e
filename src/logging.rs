// src/logging.rs

//! Logging setup for `zeppelin-sync` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `ZEPPELIN_SYNC_LOG` environment variable, either a bare level
//!    ("debug") or full `EnvFilter` directives ("zeppelin_sync=trace,reqwest=debug")
//! 3. default to `info`
//!
//! A bare level applies to this crate only; the HTTP stack stays at `warn`
//! so request plumbing does not drown the sync log.
//!
//! Logs are sent to STDERR so that stdout only carries the printed note.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

const ENV_VAR: &str = "ZEPPELIN_SYNC_LOG";

/// Initialise global logging subscriber.
///
/// Safe to call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let directives = match cli_level {
        Some(lvl) => crate_directives(level_from_log_level(lvl)),
        None => match std::env::var(ENV_VAR) {
            Ok(raw) => env_directives(&raw),
            Err(_) => crate_directives(Level::INFO),
        },
    };

    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter {directives:?}"))?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn crate_directives(level: Level) -> String {
    format!("warn,zeppelin_sync={}", level.as_str().to_lowercase())
}

/// A bare level is scoped to this crate; anything else is passed through.
fn env_directives(raw: &str) -> String {
    match parse_level_str(raw) {
        Some(level) => crate_directives(level),
        None => raw.trim().to_string(),
    }
}

fn level_from_log_level(lvl: LogLevel) -> Level {
    match lvl {
        LogLevel::Error => Level::ERROR,
        LogLevel::Warn => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Trace => Level::TRACE,
    }
}

fn parse_level_str(s: &str) -> Option<Level> {
    match s.trim().to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
