// src/engine/mod.rs

//! Orchestration engine for one note.
//!
//! This module ties together:
//! - the pending update queue and its flush timer
//! - the execution tracker and its poll timer
//! - the note reconciler
//! - the runtime event loop that reacts to:
//!   - cell edits and deletions
//!   - document saves
//!   - run / interrupt requests
//!   - explicit syncs and shutdown
//!
//! Shared collaborators and flags live in [`context`]; the async event
//! shell is implemented in [`runtime`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::EngineSettings;
use crate::document::CellRef;
use crate::errors::Result;
use crate::exec::tracker::ExecutionTracker;
use crate::sync::pending::PendingUpdateQueue;
use crate::sync::reconcile::{NoteReconciler, ReconcileReport};
use crate::sync::timer::PeriodicTimer;

pub mod context;
pub mod runtime;

pub use context::SyncContext;
pub use runtime::Runtime;

/// Events flowing into the runtime from the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Text, language or position of a cell changed, or a cell was added.
    CellEdited(CellRef),
    /// A cell was removed from the document.
    CellDeleted(CellRef),
    /// The document was saved; pending edits are written immediately.
    DocumentSaved,
    /// Run these cells with the configured concurrency.
    RunCells(Vec<CellRef>),
    /// Replace the local cells with the remote note.
    SyncNote,
    /// Stop every tracked execution.
    Interrupt,
    /// Graceful shutdown requested (e.g. Ctrl-C).
    Shutdown,
}

/// All components working on one note, wired together.
#[derive(Debug)]
pub struct SyncEngine {
    ctx: Arc<SyncContext>,
    settings: EngineSettings,
    tracker: Arc<ExecutionTracker>,
    pending: Arc<PendingUpdateQueue>,
    reconciler: NoteReconciler,
    flush_timer: PeriodicTimer,
    poll_timer: PeriodicTimer,
}

impl SyncEngine {
    pub fn new(ctx: Arc<SyncContext>, settings: EngineSettings) -> Self {
        let tracker = Arc::new(ExecutionTracker::new(
            Arc::clone(&ctx),
            settings.concurrency,
        ));
        let pending = Arc::new(PendingUpdateQueue::new(
            Arc::clone(&ctx),
            Arc::clone(&tracker),
            settings.throttle_window,
        ));
        let reconciler =
            NoteReconciler::new(Arc::clone(&ctx), Arc::clone(&pending), Arc::clone(&tracker));

        Self {
            ctx,
            settings,
            tracker,
            pending,
            reconciler,
            flush_timer: PeriodicTimer::new("pending flush", settings.pooling_interval),
            poll_timer: PeriodicTimer::new("execution poll", settings.track_interval),
        }
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }

    pub fn pending(&self) -> &Arc<PendingUpdateQueue> {
        &self.pending
    }

    pub fn is_active(&self) -> bool {
        self.flush_timer.is_scheduled() || self.poll_timer.is_scheduled()
    }

    /// Start the flush and poll timers. Calling it again is a no-op.
    pub fn activate(&self) {
        let pending = Arc::clone(&self.pending);
        self.flush_timer.schedule(move || {
            let pending = Arc::clone(&pending);
            async move {
                pending.flush_due().await;
            }
        });

        let tracker = Arc::clone(&self.tracker);
        self.poll_timer.schedule(move || {
            let tracker = Arc::clone(&tracker);
            async move {
                tracker.poll_all().await;
            }
        });
        info!(note = %self.ctx.note_id(), "engine active");
    }

    /// Stop both timers, then write every pending edit.
    pub async fn deactivate(&self) {
        self.flush_timer.unschedule().await;
        self.poll_timer.unschedule().await;
        let flushed = self.pending.flush_now().await;
        info!(note = %self.ctx.note_id(), flushed, "engine inactive");
    }

    pub fn cell_edited(&self, cell: CellRef) -> bool {
        self.pending.register(cell)
    }

    /// A deleted cell is queued like an edit; the flush deletes its
    /// paragraph.
    pub fn cell_deleted(&self, cell: CellRef) -> bool {
        self.pending.register(cell)
    }

    pub async fn document_saved(&self) -> usize {
        self.pending.flush_now().await
    }

    /// Write pending edits, then run `cells`.
    pub async fn run_cells(&self, cells: Vec<CellRef>) {
        self.pending.flush_now().await;
        self.tracker.run_cells(cells).await;
    }

    pub async fn sync_note(&self) -> Result<ReconcileReport> {
        self.reconciler.reconcile().await
    }

    /// Stop every running paragraph. Returns once the stop calls are done.
    pub async fn interrupt(&self) {
        self.tracker.interrupt_all().await;
    }

    /// Wait until no execution is tracked. Polls directly when the poll
    /// timer is not running.
    pub async fn wait_idle(&self) {
        while self.tracker.tracked_count() > 0 {
            if !self.poll_timer.is_scheduled() {
                self.tracker.poll_all().await;
            }
            tokio::time::sleep(self.settings.track_interval).await;
        }
        debug!("no tracked executions left");
    }
}
