// src/engine/context.rs

//! State shared by every component working on one note.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::classify::{Disposition, ErrorCategory, classify};
use crate::client::{ApiResult, NewParagraph, NotebookApi, ParagraphStatus, TransportError};
use crate::document::{CellRef, Notifier, NotebookDocument, update_metadata};

/// Collaborators and flags of one engine instance.
///
/// The syncing set and the suppress-registration flag are consulted by
/// every producer of pending updates and cancellation effects.
pub struct SyncContext {
    api: Arc<dyn NotebookApi>,
    document: Arc<dyn NotebookDocument>,
    notifier: Arc<dyn Notifier>,
    syncing: Mutex<HashSet<String>>,
    suppress_registration: AtomicBool,
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("note", &self.document.note_id())
            .field("syncing", &*self.syncing.lock())
            .field(
                "suppress_registration",
                &self.suppress_registration.load(Ordering::SeqCst),
            )
            .finish_non_exhaustive()
    }
}

/// Marks a note as syncing until dropped.
#[derive(Debug)]
pub struct SyncingGuard<'a> {
    ctx: &'a SyncContext,
    note_id: String,
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.ctx.syncing.lock().remove(&self.note_id);
        debug!(note = %self.note_id, "note no longer syncing");
    }
}

/// Suppresses pending-update registration until dropped.
#[derive(Debug)]
pub struct SuppressGuard<'a> {
    ctx: &'a SyncContext,
}

impl Drop for SuppressGuard<'_> {
    fn drop(&mut self) {
        self.ctx.suppress_registration.store(false, Ordering::SeqCst);
    }
}

impl SyncContext {
    pub fn new(
        api: Arc<dyn NotebookApi>,
        document: Arc<dyn NotebookDocument>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            api,
            document,
            notifier,
            syncing: Mutex::new(HashSet::new()),
            suppress_registration: AtomicBool::new(false),
        }
    }

    pub fn api(&self) -> &dyn NotebookApi {
        self.api.as_ref()
    }

    pub fn document(&self) -> &dyn NotebookDocument {
        self.document.as_ref()
    }

    pub fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub fn note_id(&self) -> String {
        self.document.note_id()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.lock().contains(&self.note_id())
    }

    /// Mark the note as syncing. Returns `None` when it already is.
    pub fn begin_sync(&self) -> Option<SyncingGuard<'_>> {
        let note_id = self.note_id();
        if !self.syncing.lock().insert(note_id.clone()) {
            return None;
        }
        debug!(note = %note_id, "note syncing");
        Some(SyncingGuard { ctx: self, note_id })
    }

    pub fn registration_suppressed(&self) -> bool {
        self.suppress_registration.load(Ordering::SeqCst)
    }

    pub fn suppress_registration(&self) -> SuppressGuard<'_> {
        self.suppress_registration.store(true, Ordering::SeqCst);
        SuppressGuard { ctx: self }
    }

    /// Create the remote paragraph for `cell` at its current index and store
    /// the returned id. Returns `None` when the cell has been deleted.
    pub async fn create_paragraph(&self, cell: CellRef) -> ApiResult<Option<String>> {
        let (Some(data), Some(index)) = (self.document.cell(cell), self.document.index_of(cell))
        else {
            return Ok(None);
        };

        let note_id = self.note_id();
        let config = data.paragraph_config();
        let request = NewParagraph {
            title: None,
            text: data.text.clone(),
            index,
            config: Some(config.clone()),
        };
        let id = self.api.create_paragraph(&note_id, request).await?;
        info!(note = %note_id, paragraph = %id, %cell, index, "paragraph created");

        update_metadata(self.document(), cell, |m| {
            m.paragraph_id = Some(id.clone());
            m.remote_index = Some(index);
            m.status = Some(ParagraphStatus::Ready);
            m.config = Some(config);
            m.remote_missing = false;
        });
        Ok(Some(id))
    }

    /// Apply the disposition of a classified remote failure.
    ///
    /// `cell` is the cell the failed call was about, if any; a "not found"
    /// for a cell leads to the recreate prompt.
    pub async fn report_remote_error(
        &self,
        err: &TransportError,
        cell: Option<CellRef>,
    ) -> ErrorCategory {
        let category = classify(err);
        match (category.disposition(), cell) {
            (Disposition::Silent, _) => debug!(error = %err, "remote call canceled"),
            (Disposition::PromptRecreate, Some(cell)) => self.prompt_recreate(cell).await,
            (Disposition::PromptRecreate, None) => {
                self.notifier.show_error(&category.describe(err));
            }
            (Disposition::Surface, _) => {
                let message = category.describe(err);
                if category == ErrorCategory::Unauthorized {
                    self.notifier.show_warning(&message);
                } else {
                    self.notifier.show_error(&message);
                }
            }
        }
        category
    }

    /// Flag the cell's paragraph as missing, ask the user, and create it
    /// again on acceptance.
    pub async fn prompt_recreate(&self, cell: CellRef) {
        update_metadata(self.document(), cell, |m| m.remote_missing = true);

        if !self.notifier.confirm_recreate(cell).await {
            debug!(%cell, "recreate declined");
            return;
        }

        update_metadata(self.document(), cell, |m| m.paragraph_id = None);
        match self.create_paragraph(cell).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!(%cell, "cell deleted before it could be recreated"),
            Err(err) => {
                warn!(%cell, error = %err, "recreating paragraph failed");
                self.notifier.show_error(&classify(&err).describe(&err));
            }
        }
    }
}
