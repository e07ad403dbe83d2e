// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigFile, EngineSettings, RawConfigFile, ServerSettings};
use crate::errors::{Result, SyncError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::SyncError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let server = validate_server(&raw)?;
        let engine = validate_engine(&raw)?;
        Ok(ConfigFile::new_unchecked(server, engine))
    }
}

fn validate_server(cfg: &RawConfigFile) -> Result<ServerSettings> {
    let url = cfg.server.url.trim();
    if url.is_empty() {
        return Err(SyncError::ConfigError(
            "[server].url must be set to the notebook server address".to_string(),
        ));
    }

    let credentials = match (&cfg.server.username, &cfg.server.password) {
        (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
        (None, None) => None,
        _ => {
            return Err(SyncError::ConfigError(
                "[server].username and [server].password must be set together".to_string(),
            ));
        }
    };

    Ok(ServerSettings {
        url: url.to_string(),
        user_agent: cfg.server.user_agent.clone(),
        request_timeout: positive_duration("server.request_timeout", &cfg.server.request_timeout)?,
        credentials,
    })
}

fn validate_engine(cfg: &RawConfigFile) -> Result<EngineSettings> {
    Ok(EngineSettings {
        pooling_interval: positive_duration("sync.pooling_interval", &cfg.sync.pooling_interval)?,
        throttle_window: parse_duration(&cfg.sync.throttle_window)
            .map_err(|e| SyncError::ConfigError(format!("[sync].throttle_window: {e}")))?,
        track_interval: positive_duration(
            "execution.track_interval",
            &cfg.execution.track_interval,
        )?,
        concurrency: cfg.execution.concurrency,
    })
}

/// Timer periods must be strictly positive; a zero period would spin.
fn positive_duration(field: &str, value: &str) -> Result<Duration> {
    let (section, key) = field.split_once('.').unwrap_or(("", field));
    let dur = parse_duration(value)
        .map_err(|e| SyncError::ConfigError(format!("[{section}].{key}: {e}")))?;
    if dur.is_zero() {
        return Err(SyncError::ConfigError(format!(
            "[{section}].{key} must be greater than zero (got {value:?})"
        )));
    }
    Ok(dur)
}
