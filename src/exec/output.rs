// src/exec/output.rs

//! Conversion of remote paragraph results into local cell outputs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::warn;

use crate::client::{ParagraphResult, ResultCode};

/// One output item shown under a cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFragment {
    /// Progress line rendered while the paragraph is running.
    Stdout(String),
    Text(String),
    Html(String),
    /// PNG bytes.
    Image(Vec<u8>),
    Error { name: String, message: String },
}

impl OutputFragment {
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        OutputFragment::Error {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Convert a paragraph result into output fragments.
///
/// `HTML` messages are concatenated into one html fragment, every `IMG`
/// message is base64-decoded and appended to one image buffer, and anything
/// else becomes error text when the result code is `ERROR`, plain text
/// otherwise. Fragments are emitted in the order: progress line, html,
/// error, image, text. Empty groups produce nothing.
pub fn convert_results(results: &ParagraphResult, progress: Option<&str>) -> Vec<OutputFragment> {
    let mut html = String::new();
    let mut error = String::new();
    let mut text = String::new();
    let mut image: Vec<u8> = Vec::new();

    for msg in &results.msg {
        match msg.kind.as_str() {
            "HTML" => html.push_str(&msg.data),
            "IMG" => match STANDARD.decode(msg.data.trim()) {
                Ok(bytes) => image.extend_from_slice(&bytes),
                Err(e) => warn!(error = %e, "skipping undecodable image output"),
            },
            _ if results.code == ResultCode::Error => error.push_str(&msg.data),
            _ => text.push_str(&msg.data),
        }
    }

    let mut out = Vec::new();
    if let Some(line) = progress {
        out.push(OutputFragment::Stdout(line.to_string()));
    }
    if !html.is_empty() {
        out.push(OutputFragment::Html(html));
    }
    if !error.is_empty() {
        out.push(OutputFragment::error("ERROR", error));
    }
    if !image.is_empty() {
        out.push(OutputFragment::Image(image));
    }
    if !text.is_empty() {
        out.push(OutputFragment::Text(text));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResultMessage;

    fn result(code: ResultCode, msgs: &[(&str, &str)]) -> ParagraphResult {
        ParagraphResult {
            code,
            msg: msgs.iter().map(|(k, d)| ResultMessage::new(*k, *d)).collect(),
        }
    }

    #[test]
    fn groups_messages_in_fixed_order() {
        let r = result(
            ResultCode::Success,
            &[
                ("TEXT", "a"),
                ("IMG", "AQI="),
                ("HTML", "<b>x</b>"),
                ("TABLE", "b"),
                ("IMG", "Aw=="),
            ],
        );
        let out = convert_results(&r, Some("[|] 10%"));
        assert_eq!(
            out,
            vec![
                OutputFragment::Stdout("[|] 10%".into()),
                OutputFragment::Html("<b>x</b>".into()),
                OutputFragment::Image(vec![1, 2, 3]),
                OutputFragment::Text("ab".into()),
            ]
        );
    }

    #[test]
    fn error_code_turns_text_into_error_fragment() {
        let r = result(ResultCode::Error, &[("TEXT", "Traceback"), ("TEXT", "!")]);
        assert_eq!(
            convert_results(&r, None),
            vec![OutputFragment::error("ERROR", "Traceback!")]
        );
    }

    #[test]
    fn bad_image_is_skipped() {
        let r = result(ResultCode::Success, &[("IMG", "%%%not base64")]);
        assert!(convert_results(&r, None).is_empty());
    }
}
