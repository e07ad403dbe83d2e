// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `zeppelin-sync`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "zeppelin-sync",
    version,
    about = "Mirror a Zeppelin note locally, run its paragraphs and track them to completion.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Zeppelin.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Zeppelin.toml")]
    pub config: String,

    /// Id of the remote note to mirror.
    #[arg(long, value_name = "ID")]
    pub note: Option<String>,

    /// Run every code cell after the initial sync and wait for completion.
    #[arg(long)]
    pub run: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ZEPPELIN_SYNC_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config, print it, but don't contact the server.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
