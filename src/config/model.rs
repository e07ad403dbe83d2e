// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::Concurrency;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// url = "http://localhost:8080"
/// username = "alice"
/// password = "secret"
///
/// [sync]
/// pooling_interval = "1s"
/// throttle_window = "5s"
///
/// [execution]
/// track_interval = "1s"
/// concurrency = "by-interpreter"
/// ```
///
/// Every section is optional except for `server.url`, which validation
/// insists on.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub execution: ExecutionSection,
}

/// `[server]` section: where the notebook server lives and how to talk to it.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    /// Base URL of the server. A missing scheme is treated as `http://`.
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Duration string, e.g. `"30s"`.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    /// Optional credentials; a login is performed when both are present.
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_user_agent() -> String {
    concat!("zeppelin-sync/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
            username: None,
            password: None,
        }
    }
}

/// `[sync]` section: how local edits are batched before reaching the server.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    /// Period of the pending-update flush timer.
    #[serde(default = "default_pooling_interval")]
    pub pooling_interval: String,

    /// Minimum age of an unflushed edit before it is sent.
    #[serde(default = "default_throttle_window")]
    pub throttle_window: String,
}

fn default_pooling_interval() -> String {
    "1s".to_string()
}

fn default_throttle_window() -> String {
    "5s".to_string()
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            pooling_interval: default_pooling_interval(),
            throttle_window: default_throttle_window(),
        }
    }
}

/// `[execution]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSection {
    /// Period of the execution poll timer.
    #[serde(default = "default_track_interval")]
    pub track_interval: String,

    #[serde(default)]
    pub concurrency: Concurrency,
}

fn default_track_interval() -> String {
    "1s".to_string()
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            track_interval: default_track_interval(),
            concurrency: Concurrency::default(),
        }
    }
}

/// Connection settings resolved from `[server]`.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub credentials: Option<(String, String)>,
}

/// Timing and dispatch settings consumed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub pooling_interval: Duration,
    pub throttle_window: Duration,
    pub track_interval: Duration,
    pub concurrency: Concurrency,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            pooling_interval: Duration::from_secs(1),
            throttle_window: Duration::from_secs(5),
            track_interval: Duration::from_secs(1),
            concurrency: Concurrency::ByInterpreter,
        }
    }
}

/// Validated configuration. Only constructible through
/// `ConfigFile::try_from(RawConfigFile)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub server: ServerSettings,
    pub engine: EngineSettings,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(server: ServerSettings, engine: EngineSettings) -> Self {
        Self { server, engine }
    }
}
