// src/exec/tracker.rs

//! Tracks remote runs of cells until they reach a terminal status.
//!
//! Executions are keyed by paragraph id; at most one is tracked per
//! paragraph. The poll timer calls [`ExecutionTracker::poll_all`], which
//! fetches every tracked paragraph concurrently and mirrors its status,
//! progress and results into the cell.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::dispatcher::{InterpreterDispatcher, extract_key};
use super::execution::{Execution, ExecutionState};
use super::output::{OutputFragment, convert_results};
use crate::classify::{ErrorCategory, classify};
use crate::client::{Paragraph, ParagraphStatus, ResultCode, Timestamp, TransportError};
use crate::document::{CellRef, update_metadata};
use crate::engine::context::SyncContext;
use crate::sync::mutex::AsyncMutex;
use crate::types::Concurrency;

/// What to remove from the tracked set.
#[derive(Debug, Clone, Copy)]
pub enum Untrack<'a> {
    /// Only this exact execution.
    Execution(&'a Execution),
    /// Whatever is tracked for this cell.
    Cell(CellRef),
}

impl<'a> From<&'a Execution> for Untrack<'a> {
    fn from(execution: &'a Execution) -> Self {
        Untrack::Execution(execution)
    }
}

impl From<CellRef> for Untrack<'_> {
    fn from(cell: CellRef) -> Self {
        Untrack::Cell(cell)
    }
}

pub struct ExecutionTracker {
    ctx: Arc<SyncContext>,
    concurrency: Concurrency,
    tracked: Mutex<HashMap<String, Arc<Execution>>>,
    dispatcher: InterpreterDispatcher,
    sequential: AsyncMutex,
}

impl std::fmt::Debug for ExecutionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTracker")
            .field("concurrency", &self.concurrency)
            .field("tracked", &self.tracked_count())
            .finish_non_exhaustive()
    }
}

fn error_output(err: &TransportError) -> OutputFragment {
    let name = match classify(err) {
        ErrorCategory::LocalNetworkIssue => "NetworkError",
        ErrorCategory::Unauthorized | ErrorCategory::Forbidden => "AuthorizationError",
        ErrorCategory::NotFound => "NotFoundError",
        ErrorCategory::MissingSecurityManager | ErrorCategory::ServerError => "ServerError",
        ErrorCategory::Canceled => "Canceled",
    };
    OutputFragment::error(name, err.to_string())
}

/// Success value of a run that finished with `status`. Aborted runs are
/// inconclusive.
fn terminal_success(status: ParagraphStatus) -> Option<bool> {
    match status {
        ParagraphStatus::Error => Some(false),
        ParagraphStatus::Abort => None,
        _ => Some(true),
    }
}

impl ExecutionTracker {
    pub fn new(ctx: Arc<SyncContext>, concurrency: Concurrency) -> Self {
        Self {
            ctx,
            concurrency,
            tracked: Mutex::new(HashMap::new()),
            dispatcher: InterpreterDispatcher::new(),
            sequential: AsyncMutex::new("execute"),
        }
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    pub fn dispatcher(&self) -> &InterpreterDispatcher {
        &self.dispatcher
    }

    // ---------------------------------------------------------------------
    // Tracked set
    // ---------------------------------------------------------------------

    /// Track `execution`. A different execution tracked for the same
    /// paragraph is force-ended.
    pub fn register(&self, execution: Arc<Execution>) {
        let previous = self
            .tracked
            .lock()
            .insert(execution.paragraph_id().to_string(), Arc::clone(&execution));

        if let Some(previous) = previous {
            if !Arc::ptr_eq(&previous, &execution) {
                debug!(paragraph = %execution.paragraph_id(), "replacing tracked execution");
                previous.end(None, Some(Utc::now()));
            }
        }
    }

    pub fn unregister<'a>(&self, what: impl Into<Untrack<'a>>) -> Option<Arc<Execution>> {
        let mut tracked = self.tracked.lock();
        match what.into() {
            Untrack::Execution(execution) => {
                let same = tracked
                    .get(execution.paragraph_id())
                    .is_some_and(|e| std::ptr::eq(Arc::as_ptr(e), execution));
                if same {
                    tracked.remove(execution.paragraph_id())
                } else {
                    None
                }
            }
            Untrack::Cell(cell) => {
                let key = tracked
                    .iter()
                    .find(|(_, e)| e.cell() == cell)
                    .map(|(k, _)| k.clone())?;
                tracked.remove(&key)
            }
        }
    }

    pub fn get(&self, paragraph_id: &str) -> Option<Arc<Execution>> {
        self.tracked.lock().get(paragraph_id).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracked.lock().len()
    }

    /// Stop tracking the paragraph and mark its run inconclusive.
    pub fn force_end(&self, paragraph_id: &str) {
        let execution = self.tracked.lock().remove(paragraph_id);
        if let Some(execution) = execution {
            debug!(paragraph = %paragraph_id, "force-ending execution");
            execution.end(None, Some(Utc::now()));
        }
    }

    /// Stop every tracked paragraph, then abandon whatever requests are
    /// still waiting on the server. Returns once each stop call has
    /// returned and its execution has ended.
    pub async fn interrupt_all(self: &Arc<Self>) {
        let executions: Vec<_> = self.tracked.lock().values().cloned().collect();
        info!(count = executions.len(), "interrupting tracked executions");

        let mut set = JoinSet::new();
        for execution in executions {
            let tracker = Arc::clone(self);
            set.spawn(async move { tracker.handle_cancel(execution).await });
        }
        join_all(set).await;

        self.ctx.api().cancel_in_flight();
    }

    /// Flag the cell for recreation when its paragraph is gone remotely.
    fn mark_if_missing(&self, cell: CellRef, err: &TransportError) {
        if classify(err) == ErrorCategory::NotFound {
            debug!(%cell, "paragraph missing remotely");
            update_metadata(self.ctx.document(), cell, |m| m.remote_missing = true);
        }
    }

    // ---------------------------------------------------------------------
    // Executions and cancellation
    // ---------------------------------------------------------------------

    fn new_execution(self: &Arc<Self>, cell: CellRef, paragraph_id: &str) -> Arc<Execution> {
        let surface = self.ctx.document().create_execution(cell);
        let execution = Arc::new(Execution::new(cell, paragraph_id, surface));
        self.watch_cancellation(&execution);
        execution
    }

    /// React to the execution's cancellation signal until it resolves.
    fn watch_cancellation(self: &Arc<Self>, execution: &Arc<Execution>) {
        let cancel = execution.cancellation();
        let resolved = execution.resolved();
        let tracker: Weak<Self> = Arc::downgrade(self);
        let execution = Arc::downgrade(execution);

        tokio::spawn(async move {
            tokio::select! {
                _ = resolved.cancelled() => {}
                _ = cancel.cancelled() => {
                    if let (Some(tracker), Some(execution)) = (tracker.upgrade(), execution.upgrade()) {
                        tracker.handle_cancel(execution).await;
                    }
                }
            }
        });
    }

    async fn handle_cancel(&self, execution: Arc<Execution>) {
        if self.ctx.is_syncing() {
            debug!(cell = %execution.cell(), "ignoring cancellation while note is syncing");
            return;
        }

        let cell = execution.cell();
        if self.ctx.document().index_of(cell).is_none() {
            self.unregister(&*execution);
        }

        let note_id = self.ctx.note_id();
        info!(note = %note_id, paragraph = %execution.paragraph_id(), "stopping paragraph");
        if let Err(err) = self
            .ctx
            .api()
            .stop_paragraph(&note_id, execution.paragraph_id())
            .await
        {
            self.ctx.report_remote_error(&err, None).await;
        }

        execution.start_if_init();
        execution.end(Some(false), Some(Utc::now()));
    }

    // ---------------------------------------------------------------------
    // Polling
    // ---------------------------------------------------------------------

    /// Fetch the paragraph behind `execution` and mirror it into the cell.
    pub async fn poll_one(&self, execution: Arc<Execution>) {
        let cell = execution.cell();
        if self.ctx.document().index_of(cell).is_none() {
            debug!(%cell, "untracking execution of deleted cell");
            self.unregister(&*execution);
            return;
        }
        if execution.state() == ExecutionState::Resolved {
            debug!(%cell, "untracking resolved execution");
            self.unregister(&*execution);
            return;
        }

        let note_id = self.ctx.note_id();
        let paragraph = match self
            .ctx
            .api()
            .get_paragraph(&note_id, execution.paragraph_id())
            .await
        {
            Ok(paragraph) => paragraph,
            Err(err) => {
                warn!(%cell, paragraph = %execution.paragraph_id(), error = %err, "polling paragraph failed");
                self.unregister(&*execution);
                self.mark_if_missing(cell, &err);
                if err != TransportError::Canceled {
                    execution.replace_output(vec![error_output(&err)]);
                }
                execution.start_if_init();
                execution.end(Some(false), Some(Utc::now()));
                return;
            }
        };

        update_metadata(self.ctx.document(), cell, |m| m.refresh_from(&paragraph));

        if paragraph.status != ParagraphStatus::Pending
            && execution.state() == ExecutionState::Init
        {
            execution.start(Some(Utc::now()));
            self.register(Arc::clone(&execution));
        }

        let progress = if paragraph.status == ParagraphStatus::Running {
            execution.render_progress(f64::from(paragraph.progress.unwrap_or(0)))
        } else {
            None
        };

        if let Some(results) = &paragraph.results {
            execution.replace_output(convert_results(results, progress.as_deref()));
        } else if paragraph.status != ParagraphStatus::Pending {
            match progress {
                Some(line) => execution.replace_output(vec![OutputFragment::Stdout(line)]),
                None => execution.clear_output(),
            }
        }

        if !paragraph.status.is_active() {
            debug!(%cell, status = ?paragraph.status, "paragraph no longer running");
            self.unregister(&*execution);
            execution.end(terminal_success(paragraph.status), Some(Utc::now()));
        }
    }

    /// Poll every tracked execution concurrently and wait for all of them.
    pub async fn poll_all(self: &Arc<Self>) {
        let executions: Vec<_> = self.tracked.lock().values().cloned().collect();
        if executions.is_empty() {
            return;
        }

        let mut set = JoinSet::new();
        for execution in executions {
            let tracker = Arc::clone(self);
            set.spawn(async move { tracker.poll_one(execution).await });
        }
        while let Some(res) = set.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "poll task failed");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Running cells
    // ---------------------------------------------------------------------

    /// Run `cells` with the configured concurrency. Returns once every
    /// dispatched run call has returned.
    pub async fn run_cells(self: &Arc<Self>, cells: Vec<CellRef>) {
        let cells: Vec<CellRef> = cells
            .into_iter()
            .filter(|cell| {
                let live = self.ctx.document().index_of(*cell).is_some();
                if !live {
                    debug!(%cell, "skipping deleted cell");
                }
                live
            })
            .collect();

        info!(count = cells.len(), concurrency = ?self.concurrency, "running cells");

        match self.concurrency {
            Concurrency::Parallel => {
                let mut set = JoinSet::new();
                for cell in cells {
                    let tracker = Arc::clone(self);
                    set.spawn(async move { tracker.run_async(cell).await });
                }
                join_all(set).await;
            }
            Concurrency::Sequential => {
                for cell in cells {
                    let ok = self
                        .sequential
                        .run_exclusive(|| self.run_sync(cell))
                        .await;
                    if !ok {
                        debug!(%cell, "sequential batch stopped after failed run");
                        break;
                    }
                }
            }
            Concurrency::ByInterpreter => {
                // One task per interpreter keeps the submission order within
                // an interpreter while interpreters run side by side.
                let mut groups: Vec<(String, Vec<(CellRef, String)>)> = Vec::new();
                for cell in cells {
                    let text = self
                        .ctx
                        .document()
                        .cell(cell)
                        .map(|c| c.text)
                        .unwrap_or_default();
                    let key = extract_key(&text).to_string();
                    match groups.iter_mut().find(|(k, _)| *k == key) {
                        Some((_, group)) => group.push((cell, text)),
                        None => groups.push((key, vec![(cell, text)])),
                    }
                }

                let mut set = JoinSet::new();
                for (_, group) in groups {
                    let tracker = Arc::clone(self);
                    set.spawn(async move {
                        for (cell, text) in group {
                            tracker
                                .dispatcher
                                .dispatch(cell, &text, || tracker.run_sync(cell))
                                .await;
                        }
                    });
                }
                join_all(set).await;
            }
        }
    }

    /// Paragraph id to run for `cell`, or `None` when it cannot be run now.
    async fn runnable_paragraph(&self, cell: CellRef) -> Option<String> {
        let document = self.ctx.document();
        let data = document.cell(cell)?;
        if document.index_of(cell).is_none() {
            debug!(%cell, "not running deleted cell");
            return None;
        }
        if data.metadata.remote_missing {
            self.ctx.prompt_recreate(cell).await;
            return None;
        }
        match data.metadata.paragraph_id {
            Some(id) => Some(id),
            None => {
                self.ctx.notifier().show_warning(&format!(
                    "{cell} has not been synchronized with the server yet"
                ));
                None
            }
        }
    }

    /// Run `cell` and block until the server returns its result. Returns
    /// whether the run succeeded.
    pub async fn run_sync(self: &Arc<Self>, cell: CellRef) -> bool {
        let Some(paragraph_id) = self.runnable_paragraph(cell).await else {
            return false;
        };

        let execution = self.new_execution(cell, &paragraph_id);
        self.register(Arc::clone(&execution));

        let note_id = self.ctx.note_id();
        debug!(note = %note_id, paragraph = %paragraph_id, %cell, "running paragraph");
        let result = self
            .ctx
            .api()
            .run_paragraph(&note_id, &paragraph_id, true, None)
            .await;
        self.unregister(&*execution);

        match result {
            Ok(results) => {
                execution.start_if_init();
                let success = match &results {
                    Some(r) => {
                        execution.replace_output(convert_results(r, None));
                        r.code != ResultCode::Error
                    }
                    None => {
                        execution.clear_output();
                        true
                    }
                };
                update_metadata(self.ctx.document(), cell, |m| {
                    m.status = Some(if success {
                        ParagraphStatus::Success
                    } else {
                        ParagraphStatus::Error
                    });
                    m.results = results;
                });
                execution.end(Some(success), Some(Utc::now()));
                success
            }
            Err(TransportError::Canceled) => {
                debug!(%cell, "run canceled");
                execution.start_if_init();
                execution.end(Some(false), Some(Utc::now()));
                false
            }
            Err(err) => {
                warn!(%cell, paragraph = %paragraph_id, error = %err, "run failed");
                self.mark_if_missing(cell, &err);
                execution.start_if_init();
                execution.replace_output(vec![error_output(&err)]);
                execution.end(Some(false), Some(Utc::now()));
                false
            }
        }
    }

    /// Submit `cell` as an asynchronous job; completion is observed by
    /// [`poll_all`](Self::poll_all).
    pub async fn run_async(self: &Arc<Self>, cell: CellRef) {
        let Some(paragraph_id) = self.runnable_paragraph(cell).await else {
            return;
        };
        if self.get(&paragraph_id).is_some() {
            debug!(%cell, paragraph = %paragraph_id, "paragraph already tracked");
            return;
        }

        let execution = self.new_execution(cell, &paragraph_id);
        let note_id = self.ctx.note_id();

        let submitted = async {
            let paragraph = self
                .ctx
                .api()
                .get_paragraph(&note_id, &paragraph_id)
                .await?;
            update_metadata(self.ctx.document(), cell, |m| m.refresh_from(&paragraph));
            if paragraph.status.is_active() {
                debug!(%cell, status = ?paragraph.status, "paragraph already running; tracking it");
            } else {
                self.ctx
                    .api()
                    .run_paragraph(&note_id, &paragraph_id, false, None)
                    .await?;
            }
            Ok::<_, TransportError>(())
        }
        .await;

        execution.start(Some(Utc::now()));
        match submitted {
            Ok(()) => self.register(execution),
            Err(err) => {
                warn!(%cell, paragraph = %paragraph_id, error = %err, "submitting run failed");
                self.mark_if_missing(cell, &err);
                if err != TransportError::Canceled {
                    execution.replace_output(vec![error_output(&err)]);
                }
                execution.end(Some(false), Some(Utc::now()));
            }
        }
    }

    /// Detached synchronous run so that markup cells get rendered output.
    pub fn spawn_markup_run(self: &Arc<Self>, cell: CellRef) -> JoinHandle<bool> {
        let tracker = Arc::clone(self);
        tokio::spawn(async move {
            let text = tracker
                .ctx
                .document()
                .cell(cell)
                .map(|c| c.text)
                .unwrap_or_default();
            tracker
                .dispatcher
                .dispatch(cell, &text, || tracker.run_sync(cell))
                .await
        })
    }

    /// Recreate the execution state of a cell from its remote paragraph.
    ///
    /// Active paragraphs are started at the remote start time (or
    /// `fallback_start`) and tracked; finished ones are started, given their
    /// output and ended at once; `READY` paragraphs get no execution.
    pub fn resume(
        self: &Arc<Self>,
        cell: CellRef,
        paragraph: &Paragraph,
        fallback_start: Option<Timestamp>,
    ) {
        match paragraph.status {
            ParagraphStatus::Ready => return,
            ParagraphStatus::Running | ParagraphStatus::Pending => {
                let execution = self.new_execution(cell, &paragraph.id);
                execution.start(paragraph.date_started.or(fallback_start));
                self.register(execution);
                return;
            }
            ParagraphStatus::Success | ParagraphStatus::Error | ParagraphStatus::Abort => {}
        }

        let execution = self.new_execution(cell, &paragraph.id);
        execution.start(paragraph.date_started);
        match &paragraph.results {
            Some(results) => execution.replace_output(convert_results(results, None)),
            None => execution.clear_output(),
        }
        execution.end(
            terminal_success(paragraph.status),
            paragraph.date_finished.or_else(|| Some(Utc::now())),
        );
    }
}

async fn join_all<T: 'static>(mut set: JoinSet<T>) {
    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "run task failed");
        }
    }
}
