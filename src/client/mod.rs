// src/client/mod.rs

//! Remote notebook service abstraction.
//!
//! The engine talks to a [`NotebookApi`] instead of an HTTP client directly.
//! This makes it easy to swap in a scripted fake in tests while keeping the
//! production client in [`http`].
//!
//! - [`HttpNotebookClient`] is the reqwest-backed implementation used by the
//!   binary.
//! - Tests provide their own `NotebookApi` that records calls and serves
//!   canned paragraphs.

use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod http;
pub mod model;

pub use error::{ApiResult, TransportError};
pub use http::HttpNotebookClient;
pub use model::{
    EditorSetting, NewParagraph, Note, Paragraph, ParagraphConfig, ParagraphResult,
    ParagraphStatus, ResultCode, ResultMessage, RunOptions, RunResult, Timestamp,
};

/// Boxed future returned by every [`NotebookApi`] call.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = ApiResult<T>> + Send + 'a>>;

/// Calls the engine needs from the remote notebook service.
pub trait NotebookApi: Send + Sync {
    /// Fetch a whole note with all of its paragraphs.
    fn get_note<'a>(&'a self, note_id: &'a str) -> ApiFuture<'a, Note>;

    fn get_paragraph<'a>(&'a self, note_id: &'a str, paragraph_id: &'a str)
    -> ApiFuture<'a, Paragraph>;

    /// Run a paragraph.
    ///
    /// With `sync = true` the call only returns once the paragraph finished
    /// and carries its result; with `sync = false` the job is submitted and
    /// the call returns `None` immediately.
    fn run_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
        sync: bool,
        options: Option<RunOptions>,
    ) -> ApiFuture<'a, RunResult>;

    fn stop_paragraph<'a>(&'a self, note_id: &'a str, paragraph_id: &'a str)
    -> ApiFuture<'a, ()>;

    /// Create a paragraph and return its id.
    fn create_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph: NewParagraph,
    ) -> ApiFuture<'a, String>;

    fn update_paragraph_text<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
        text: &'a str,
    ) -> ApiFuture<'a, ()>;

    fn update_paragraph_config<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
        config: &'a ParagraphConfig,
    ) -> ApiFuture<'a, ()>;

    fn delete_paragraph<'a>(&'a self, note_id: &'a str, paragraph_id: &'a str)
    -> ApiFuture<'a, ()>;

    fn move_paragraph<'a>(
        &'a self,
        note_id: &'a str,
        paragraph_id: &'a str,
        index: usize,
    ) -> ApiFuture<'a, ()>;

    /// Abort every request currently in flight; they resolve with
    /// [`TransportError::Canceled`]. Later requests are unaffected.
    fn cancel_in_flight(&self) {}
}
