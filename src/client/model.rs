// src/client/model.rs

//! Wire types of the notebook REST API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type Timestamp = DateTime<Utc>;

/// Remote paragraph status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParagraphStatus {
    Ready,
    Pending,
    Running,
    #[serde(alias = "FINISHED")]
    Success,
    Error,
    Abort,
}

impl ParagraphStatus {
    /// RUNNING and PENDING are the only non-terminal states.
    pub fn is_active(self) -> bool {
        matches!(self, ParagraphStatus::Running | ParagraphStatus::Pending)
    }
}

impl Default for ParagraphStatus {
    fn default() -> Self {
        ParagraphStatus::Ready
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Success,
    Error,
    Incomplete,
    KeepPreviousResult,
    #[serde(other)]
    Unknown,
}

/// One typed message inside a paragraph result (`TEXT`, `HTML`, `IMG`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: String,
}

impl ResultMessage {
    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParagraphResult {
    pub code: ResultCode,
    #[serde(default)]
    pub msg: Vec<ResultMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorSetting {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub edit_on_dbl_click: bool,
    #[serde(default = "default_completion_key")]
    pub completion_key: String,
    #[serde(default)]
    pub completion_support: bool,
}

fn default_completion_key() -> String {
    "TAB".to_string()
}

/// Paragraph configuration. Only the editor language is interpreted; every
/// other setting (column width, font size, ...) is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphConfig {
    #[serde(default)]
    pub editor_setting: EditorSetting,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParagraphConfig {
    pub fn for_language(language: &str, completion_support: bool) -> Self {
        Self {
            editor_setting: EditorSetting {
                language: language.to_string(),
                edit_on_dbl_click: false,
                completion_key: default_completion_key(),
                completion_support,
            },
            extra: Map::new(),
        }
    }

    pub fn language(&self) -> &str {
        &self.editor_setting.language
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
    #[serde(default)]
    pub config: ParagraphConfig,
    #[serde(default)]
    pub status: ParagraphStatus,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub results: Option<ParagraphResult>,
    #[serde(default, deserialize_with = "remote_date", skip_serializing)]
    pub date_started: Option<Timestamp>,
    #[serde(default, deserialize_with = "remote_date", skip_serializing)]
    pub date_finished: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
}

/// Body of a paragraph creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewParagraph {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<ParagraphConfig>,
}

/// Extra parameters forwarded to a run request (dynamic form values).
pub type RunOptions = Map<String, Value>;

/// Final result of a synchronous run; asynchronous runs return `None`.
pub type RunResult = Option<ParagraphResult>;

/// `{ "status": "OK", "message": "...", "body": ... }` envelope used by every
/// endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub body: Option<T>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn remote_date<'de, D>(deserializer: D) -> Result<Option<Timestamp>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_remote_date))
}

/// Parse a server timestamp. The server emits dates like
/// `"Oct 19, 2026 10:04:05 AM"`; RFC 3339 is accepted as well. Unparseable
/// dates are treated as absent.
pub fn parse_remote_date(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%b %e, %Y %l:%M:%S %p")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%b %d, %Y %I:%M:%S %p"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    use super::*;

    #[test]
    fn paragraph_deserializes_from_server_payload() {
        let payload = json!({
            "id": "paragraph_1",
            "text": null,
            "status": "FINISHED",
            "dateStarted": "Oct 19, 2026 9:04:05 AM",
            "config": {
                "editorSetting": { "language": "python", "editOnDblClick": false },
                "colWidth": 12.0
            },
            "results": { "code": "SUCCESS", "msg": [{ "type": "TEXT", "data": "2\n" }] }
        });

        let p: Paragraph = serde_json::from_value(payload).expect("paragraph");
        assert_eq!(p.text, "");
        assert_eq!(p.status, ParagraphStatus::Success);
        assert_eq!(p.config.language(), "python");
        assert_eq!(p.config.extra.get("colWidth"), Some(&json!(12.0)));
        let started = p.date_started.expect("date parsed");
        assert_eq!((started.month(), started.day(), started.hour()), (10, 19, 9));
        assert!(p.date_finished.is_none());
    }

    #[test]
    fn unknown_result_code_does_not_fail() {
        let r: ParagraphResult =
            serde_json::from_value(json!({ "code": "SOMETHING_NEW", "msg": [] })).unwrap();
        assert_eq!(r.code, ResultCode::Unknown);
    }

    #[test]
    fn config_round_trips_extra_settings() {
        let mut config = ParagraphConfig::for_language("scala", true);
        config.extra.insert("fontSize".into(), json!(9));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["fontSize"], json!(9));
        assert_eq!(value["editorSetting"]["completionKey"], json!("TAB"));
    }
}
