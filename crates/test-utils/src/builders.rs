// src/builders.rs

#![allow(dead_code)]

use std::time::Duration;

use zeppelin_sync::client::{
    Note, Paragraph, ParagraphConfig, ParagraphResult, ParagraphStatus, ResultCode,
    ResultMessage, Timestamp,
};
use zeppelin_sync::config::{ConfigFile, EngineSettings, RawConfigFile};
use zeppelin_sync::types::Concurrency;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        let mut config = RawConfigFile::default();
        config.server.url = "http://localhost:8080".to_string();
        Self { config }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.config.server.url = url.to_string();
        self
    }

    pub fn with_credentials(mut self, user: &str, password: &str) -> Self {
        self.config.server.username = Some(user.to_string());
        self.config.server.password = Some(password.to_string());
        self
    }

    pub fn with_throttle_window(mut self, window: &str) -> Self {
        self.config.sync.throttle_window = window.to_string();
        self
    }

    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.config.execution.concurrency = concurrency;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine settings with short periods, for tests running on a paused clock.
pub fn fast_settings(concurrency: Concurrency) -> EngineSettings {
    EngineSettings {
        pooling_interval: Duration::from_millis(100),
        throttle_window: Duration::from_millis(500),
        track_interval: Duration::from_millis(100),
        concurrency,
    }
}

/// Builder for remote `Paragraph`s.
pub struct ParagraphBuilder {
    paragraph: Paragraph,
}

impl ParagraphBuilder {
    pub fn new(id: &str, text: &str) -> Self {
        Self {
            paragraph: Paragraph {
                id: id.to_string(),
                text: text.to_string(),
                config: ParagraphConfig::for_language("python", true),
                ..Default::default()
            },
        }
    }

    pub fn language(mut self, language: &str) -> Self {
        self.paragraph.config = ParagraphConfig::for_language(language, language != "markdown");
        self
    }

    pub fn status(mut self, status: ParagraphStatus) -> Self {
        self.paragraph.status = status;
        self
    }

    pub fn progress(mut self, percent: u8) -> Self {
        self.paragraph.progress = Some(percent);
        self
    }

    pub fn text_result(mut self, code: ResultCode, text: &str) -> Self {
        self.paragraph.results = Some(text_result(code, text));
        self
    }

    pub fn started(mut self, at: Timestamp) -> Self {
        self.paragraph.date_started = Some(at);
        self
    }

    pub fn finished(mut self, at: Timestamp) -> Self {
        self.paragraph.date_finished = Some(at);
        self
    }

    pub fn build(self) -> Paragraph {
        self.paragraph
    }
}

pub fn text_result(code: ResultCode, text: &str) -> ParagraphResult {
    ParagraphResult {
        code,
        msg: vec![ResultMessage::new("TEXT", text)],
    }
}

/// A note named "test" holding `paragraphs` in order.
pub fn note(id: &str, paragraphs: Vec<Paragraph>) -> Note {
    Note {
        id: id.to_string(),
        name: "test".to_string(),
        paragraphs,
    }
}
