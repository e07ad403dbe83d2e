// tests/common/mod.rs

#![allow(dead_code)]

use std::sync::Arc;

pub use zeppelin_sync_test_utils::builders;
pub use zeppelin_sync_test_utils::fake_api::{ApiCall, FakeNotebookApi, Op};
pub use zeppelin_sync_test_utils::notifier::RecordingNotifier;
pub use zeppelin_sync_test_utils::{init_tracing, wait_until, with_timeout};

use zeppelin_sync::client::Note;
use zeppelin_sync::config::EngineSettings;
use zeppelin_sync::document::{CellRef, MemoryNotebook, NotebookDocument};
use zeppelin_sync::engine::{SyncContext, SyncEngine};
use zeppelin_sync::types::Concurrency;

pub const NOTE_ID: &str = "2JQRS1XYZ";

/// Fake server, in-memory document and engine wired together.
pub struct Harness {
    pub api: FakeNotebookApi,
    pub doc: MemoryNotebook,
    pub notifier: RecordingNotifier,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new(note: Note, concurrency: Concurrency) -> Self {
        Self::with(note, builders::fast_settings(concurrency), RecordingNotifier::declining())
    }

    pub fn with(note: Note, settings: EngineSettings, notifier: RecordingNotifier) -> Self {
        let api = FakeNotebookApi::new(note);
        let doc = MemoryNotebook::new(NOTE_ID);
        let ctx = Arc::new(SyncContext::new(
            Arc::new(api.clone()),
            Arc::new(doc.clone()),
            Arc::new(notifier.clone()),
        ));
        let engine = Arc::new(SyncEngine::new(ctx, settings));
        Self {
            api,
            doc,
            notifier,
            engine,
        }
    }

    /// Harness whose document already mirrors `note`.
    pub async fn synced(note: Note, concurrency: Concurrency) -> Self {
        let harness = Self::new(note, concurrency);
        harness
            .engine
            .sync_note()
            .await
            .expect("initial sync should succeed");
        harness.api.clear_calls();
        harness
    }

    pub fn ctx(&self) -> &Arc<SyncContext> {
        self.engine.context()
    }

    pub fn cells(&self) -> Vec<CellRef> {
        self.doc.cells()
    }

    pub fn cell_for(&self, paragraph_id: &str) -> CellRef {
        self.doc
            .cells()
            .into_iter()
            .find(|c| {
                self.doc
                    .cell(*c)
                    .is_some_and(|d| d.paragraph_id() == Some(paragraph_id))
            })
            .unwrap_or_else(|| panic!("no cell for {paragraph_id}"))
    }
}
