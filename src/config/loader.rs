// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks the server URL, credential pairing and parses every duration.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// Default config location: `Zeppelin.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Zeppelin.toml")
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use super::*;
    use crate::errors::SyncError;
    use crate::types::Concurrency;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn loads_full_config() {
        let file = write_config(
            r#"
[server]
url = "localhost:8080"
username = "alice"
password = "secret"

[sync]
pooling_interval = "500ms"
throttle_window = "2s"

[execution]
track_interval = "3s"
concurrency = "sequential"
"#,
        );

        let cfg = load_and_validate(file.path()).expect("valid config");
        assert_eq!(cfg.server.url, "localhost:8080");
        assert_eq!(
            cfg.server.credentials,
            Some(("alice".to_string(), "secret".to_string()))
        );
        assert_eq!(cfg.engine.pooling_interval, Duration::from_millis(500));
        assert_eq!(cfg.engine.throttle_window, Duration::from_secs(2));
        assert_eq!(cfg.engine.track_interval, Duration::from_secs(3));
        assert_eq!(cfg.engine.concurrency, Concurrency::Sequential);
    }

    #[test]
    fn defaults_apply_when_sections_missing() {
        let file = write_config("[server]\nurl = \"http://zeppelin:8080\"\n");

        let cfg = load_and_validate(file.path()).expect("valid config");
        assert_eq!(cfg.engine.concurrency, Concurrency::ByInterpreter);
        assert_eq!(cfg.engine.throttle_window, Duration::from_secs(5));
        assert_eq!(cfg.server.request_timeout, Duration::from_secs(30));
        assert!(cfg.server.credentials.is_none());
    }

    #[test]
    fn missing_url_is_rejected() {
        let file = write_config("[sync]\nthrottle_window = \"1s\"\n");

        let err = load_and_validate(file.path()).unwrap_err();
        assert!(matches!(err, SyncError::ConfigError(msg) if msg.contains("url")));
    }

    #[test]
    fn zero_track_interval_is_rejected() {
        let file = write_config(
            "[server]\nurl = \"x\"\n[execution]\ntrack_interval = \"0s\"\n",
        );

        let err = load_and_validate(file.path()).unwrap_err();
        assert!(matches!(err, SyncError::ConfigError(msg) if msg.contains("track_interval")));
    }

    #[test]
    fn unknown_concurrency_fails_deserialization() {
        let file = write_config(
            "[server]\nurl = \"x\"\n[execution]\nconcurrency = \"random\"\n",
        );

        assert!(matches!(
            load_and_validate(file.path()),
            Err(SyncError::TomlError(_))
        ));
    }

    #[test]
    fn lone_username_is_rejected() {
        let file = write_config("[server]\nurl = \"x\"\nusername = \"bob\"\n");

        assert!(matches!(
            load_and_validate(file.path()),
            Err(SyncError::ConfigError(_))
        ));
    }
}
