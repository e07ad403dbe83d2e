// src/sync/reconcile.rs

//! Whole-note reconciliation: the remote note replaces the local cells.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::client::{ParagraphStatus, Timestamp};
use crate::document::{CellData, NoteMetadata};
use crate::engine::context::SyncContext;
use crate::errors::Result;
use crate::exec::tracker::ExecutionTracker;
use crate::sync::pending::PendingUpdateQueue;

/// Outcome of one [`NoteReconciler::reconcile`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Another reconciliation of the note was already running.
    pub skipped: bool,
    pub cells: usize,
    /// Old executions ended as inconclusive.
    pub force_ended: usize,
    /// New cells given an execution lifecycle.
    pub resumed: usize,
}

#[derive(Debug)]
pub struct NoteReconciler {
    ctx: Arc<SyncContext>,
    pending: Arc<PendingUpdateQueue>,
    tracker: Arc<ExecutionTracker>,
}

impl NoteReconciler {
    pub fn new(
        ctx: Arc<SyncContext>,
        pending: Arc<PendingUpdateQueue>,
        tracker: Arc<ExecutionTracker>,
    ) -> Self {
        Self {
            ctx,
            pending,
            tracker,
        }
    }

    /// Replace the local cells with the remote note and restore execution
    /// state for every cell.
    ///
    /// While this runs the note is marked as syncing: edits are not
    /// registered, flushes are postponed and cancellations are ignored. On
    /// a fetch failure nothing local changes.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let Some(_syncing) = self.ctx.begin_sync() else {
            debug!("note already syncing; reconcile skipped");
            return Ok(ReconcileReport {
                skipped: true,
                ..Default::default()
            });
        };

        let note_id = self.ctx.note_id();
        let note = match self.ctx.api().get_note(&note_id).await {
            Ok(note) => note,
            Err(err) => {
                self.ctx.report_remote_error(&err, None).await;
                return Err(err.into());
            }
        };

        let document = self.ctx.document();
        let mut report = ReconcileReport {
            cells: note.paragraphs.len(),
            ..Default::default()
        };

        // Old executions end as inconclusive; their start times are kept so
        // a paragraph that is still running keeps its elapsed time.
        let mut old_starts: HashMap<String, Timestamp> = HashMap::new();
        for cell in document.cells() {
            self.pending.unregister(cell);
            if let Some(execution) = self.tracker.unregister(cell) {
                if let Some(started) = execution.started_at() {
                    old_starts.insert(execution.paragraph_id().to_string(), started);
                }
                execution.end(None, Some(Utc::now()));
                report.force_ended += 1;
            }
        }

        let cells = note
            .paragraphs
            .iter()
            .enumerate()
            .map(|(index, paragraph)| CellData::from_paragraph(paragraph, index))
            .collect();
        let metadata = NoteMetadata {
            id: if note.id.is_empty() {
                note_id.clone()
            } else {
                note.id.clone()
            },
            name: note.name.clone(),
        };

        let refs = {
            let _suppress = self.ctx.suppress_registration();
            document.replace_cells(cells, metadata)
        };

        for (cell, paragraph) in refs.iter().zip(&note.paragraphs) {
            if paragraph.status == ParagraphStatus::Ready {
                continue;
            }
            let fallback = old_starts.get(&paragraph.id).copied();
            self.tracker.resume(*cell, paragraph, fallback);
            report.resumed += 1;
        }

        info!(
            note = %note_id,
            cells = report.cells,
            force_ended = report.force_ended,
            resumed = report.resumed,
            "note reconciled"
        );
        Ok(report)
    }
}
