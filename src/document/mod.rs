// src/document/mod.rs

//! Local document surface.
//!
//! The engine never owns cells. It talks to the editor through
//! [`NotebookDocument`] and references cells by stable [`CellRef`] handles,
//! so a cell keeps its identity while it is moved, and a deleted cell can
//! still be recognised (its index becomes `None`).
//!
//! - [`ExecutionSurface`] is the editor-side view of one run of a cell.
//! - [`Notifier`] shows messages and asks the user questions.
//! - [`MemoryNotebook`] is an in-memory implementation used by the binary
//!   and the tests.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::client::{Paragraph, ParagraphConfig, ParagraphResult, ParagraphStatus, Timestamp};
use crate::exec::output::{OutputFragment, convert_results};
use crate::types::CellKind;

pub mod memory;

pub use memory::{MemoryNotebook, RunRecord};

/// Stable opaque handle of a local cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRef(pub u64);

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell#{}", self.0)
    }
}

/// Remote bookkeeping attached to a local cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CellMetadata {
    pub paragraph_id: Option<String>,
    pub status: Option<ParagraphStatus>,
    /// Index of the paragraph in the remote note, as last observed or
    /// written by us.
    pub remote_index: Option<usize>,
    pub config: Option<ParagraphConfig>,
    pub results: Option<ParagraphResult>,
    pub date_started: Option<Timestamp>,
    pub date_finished: Option<Timestamp>,
    /// The server answered 404 for this cell's paragraph.
    pub remote_missing: bool,
}

impl CellMetadata {
    /// Copy status, results and dates from a freshly fetched paragraph.
    pub fn refresh_from(&mut self, paragraph: &Paragraph) {
        self.status = Some(paragraph.status);
        self.results = paragraph.results.clone();
        self.date_started = paragraph.date_started;
        self.date_finished = paragraph.date_finished;
        self.remote_missing = false;
    }
}

/// Content of one cell, used both to read a cell and to build new ones.
#[derive(Debug, Clone, PartialEq)]
pub struct CellData {
    pub kind: CellKind,
    pub language: String,
    pub text: String,
    pub outputs: Vec<OutputFragment>,
    pub metadata: CellMetadata,
}

impl CellData {
    pub fn code(language: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Code,
            language: language.into(),
            text: text.into(),
            outputs: Vec::new(),
            metadata: CellMetadata::default(),
        }
    }

    pub fn markup(text: impl Into<String>) -> Self {
        Self {
            kind: CellKind::Markup,
            language: "markdown".to_string(),
            text: text.into(),
            outputs: Vec::new(),
            metadata: CellMetadata::default(),
        }
    }

    /// Build the local view of a remote paragraph located at `index`.
    pub fn from_paragraph(paragraph: &Paragraph, index: usize) -> Self {
        let language = paragraph.config.language().to_string();
        let outputs = paragraph
            .results
            .as_ref()
            .map(|r| convert_results(r, None))
            .unwrap_or_default();

        Self {
            kind: CellKind::from_language(&language),
            language,
            text: paragraph.text.clone(),
            outputs,
            metadata: CellMetadata {
                paragraph_id: Some(paragraph.id.clone()),
                status: Some(paragraph.status),
                remote_index: Some(index),
                config: Some(paragraph.config.clone()),
                results: paragraph.results.clone(),
                date_started: paragraph.date_started,
                date_finished: paragraph.date_finished,
                remote_missing: false,
            },
        }
    }

    pub fn paragraph_id(&self) -> Option<&str> {
        self.metadata.paragraph_id.as_deref()
    }

    /// Paragraph config to send for this cell: the known config with the
    /// current language, or a fresh one when the cell was never synced.
    pub fn paragraph_config(&self) -> ParagraphConfig {
        match (&self.metadata.paragraph_id, &self.metadata.config) {
            (Some(_), Some(config)) => {
                let mut config = config.clone();
                config.editor_setting.language = self.language.clone();
                config
            }
            _ => ParagraphConfig::for_language(&self.language, self.kind != CellKind::Markup),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteMetadata {
    pub id: String,
    pub name: String,
}

/// The editor's notebook as seen by the engine.
pub trait NotebookDocument: Send + Sync {
    fn note_id(&self) -> String;

    /// Live cells in document order.
    fn cells(&self) -> Vec<CellRef>;

    /// Current position of `cell`, or `None` once it has been deleted.
    fn index_of(&self, cell: CellRef) -> Option<usize>;

    /// Snapshot of a cell. Deleted cells are still readable.
    fn cell(&self, cell: CellRef) -> Option<CellData>;

    fn set_metadata(&self, cell: CellRef, metadata: CellMetadata);

    /// Replace every cell and the note metadata; returns the new handles in
    /// order.
    fn replace_cells(&self, cells: Vec<CellData>, note: NoteMetadata) -> Vec<CellRef>;

    fn create_execution(&self, cell: CellRef) -> Box<dyn ExecutionSurface>;
}

/// Read-modify-write of a cell's metadata. Returns `false` for unknown
/// cells.
pub fn update_metadata(
    document: &dyn NotebookDocument,
    cell: CellRef,
    f: impl FnOnce(&mut CellMetadata),
) -> bool {
    match document.cell(cell) {
        Some(data) => {
            let mut metadata = data.metadata;
            f(&mut metadata);
            document.set_metadata(cell, metadata);
            true
        }
        None => false,
    }
}

/// Editor-side run of one cell.
pub trait ExecutionSurface: Send + Sync {
    fn start(&self, at: Option<Timestamp>);

    /// `success = None` marks an inconclusive run.
    fn end(&self, success: Option<bool>, at: Option<Timestamp>);

    fn replace_output(&self, outputs: Vec<OutputFragment>);

    fn clear_output(&self);

    /// Fires when the user asks to stop this run.
    fn cancellation(&self) -> CancellationToken;
}

pub type PromptFuture<'a> = Pin<Box<dyn Future<Output = bool> + Send + 'a>>;

pub trait Notifier: Send + Sync {
    fn show_error(&self, message: &str);

    fn show_warning(&self, message: &str);

    /// Ask whether the missing remote paragraph behind `cell` should be
    /// created again.
    fn confirm_recreate<'a>(&'a self, cell: CellRef) -> PromptFuture<'a>;
}

/// Non-interactive notifier writing to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier {
    /// Answer to every recreate prompt.
    pub recreate: bool,
}

impl Notifier for TracingNotifier {
    fn show_error(&self, message: &str) {
        error!("{message}");
    }

    fn show_warning(&self, message: &str) {
        warn!("{message}");
    }

    fn confirm_recreate<'a>(&'a self, cell: CellRef) -> PromptFuture<'a> {
        let answer = self.recreate;
        Box::pin(async move {
            info!(%cell, recreate = answer, "paragraph missing on server");
            answer
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ParagraphResult, ResultCode, ResultMessage};

    #[test]
    fn from_paragraph_keeps_remote_bookkeeping() {
        let paragraph = Paragraph {
            id: "p1".into(),
            text: "%md # hi".into(),
            config: ParagraphConfig::for_language("markdown", false),
            status: ParagraphStatus::Success,
            results: Some(ParagraphResult {
                code: ResultCode::Success,
                msg: vec![ResultMessage::new("HTML", "<h1>hi</h1>")],
            }),
            ..Default::default()
        };

        let cell = CellData::from_paragraph(&paragraph, 3);
        assert_eq!(cell.kind, CellKind::Markup);
        assert_eq!(cell.paragraph_id(), Some("p1"));
        assert_eq!(cell.metadata.remote_index, Some(3));
        assert_eq!(cell.outputs, vec![OutputFragment::Html("<h1>hi</h1>".into())]);
    }

    #[test]
    fn paragraph_config_for_new_and_synced_cells() {
        let fresh = CellData::code("python", "1+1");
        let config = fresh.paragraph_config();
        assert_eq!(config.language(), "python");
        assert!(config.editor_setting.completion_support);

        let mut synced = CellData::markup("x");
        synced.metadata.paragraph_id = Some("p".into());
        let mut known = ParagraphConfig::for_language("python", true);
        known.extra.insert("fontSize".into(), serde_json::json!(9));
        synced.metadata.config = Some(known);

        let config = synced.paragraph_config();
        assert_eq!(config.language(), "markdown");
        assert!(config.extra.contains_key("fontSize"));
    }
}
