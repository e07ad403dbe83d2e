// src/sync/pending.rs

//! Debounced propagation of local cell edits to the server.
//!
//! Edits only mark a cell as dirty. The flush timer later writes every cell
//! whose first unflushed edit is older than the throttle window, so a burst
//! of keystrokes costs one round of remote calls.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::classify::{ErrorCategory, classify};
use crate::client::{ApiResult, TransportError};
use crate::document::{CellData, CellRef, update_metadata};
use crate::engine::context::SyncContext;
use crate::exec::tracker::ExecutionTracker;
use crate::sync::mutex::AsyncMutex;
use crate::types::CellKind;

#[derive(Debug)]
pub struct PendingUpdateQueue {
    ctx: Arc<SyncContext>,
    tracker: Arc<ExecutionTracker>,
    throttle_window: Duration,
    /// Cell -> time of its first unflushed edit, in insertion order.
    entries: Mutex<IndexMap<CellRef, Instant>>,
    update: AsyncMutex,
}

impl PendingUpdateQueue {
    pub fn new(
        ctx: Arc<SyncContext>,
        tracker: Arc<ExecutionTracker>,
        throttle_window: Duration,
    ) -> Self {
        Self {
            ctx,
            tracker,
            throttle_window,
            entries: Mutex::new(IndexMap::new()),
            update: AsyncMutex::new("paragraph update"),
        }
    }

    /// Mark `cell` as dirty. The time of the first edit is kept until the
    /// entry is flushed. Returns whether the cell was registered.
    pub fn register(&self, cell: CellRef) -> bool {
        if self.ctx.registration_suppressed() {
            trace!(%cell, "registration suppressed");
            return false;
        }
        if self.ctx.is_syncing() {
            trace!(%cell, "note syncing; edit not registered");
            return false;
        }
        self.entries.lock().entry(cell).or_insert_with(Instant::now);
        true
    }

    pub fn unregister(&self, cell: CellRef) -> bool {
        self.entries.lock().shift_remove(&cell).is_some()
    }

    pub fn is_pending(&self, cell: CellRef) -> bool {
        self.entries.lock().contains_key(&cell)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Write every pending cell now. Returns the number of cells applied.
    pub async fn flush_now(&self) -> usize {
        self.flush(None).await
    }

    /// Write the cells whose first edit is at least `throttle_window` old.
    pub async fn flush_due(&self) -> usize {
        self.flush(Some(self.throttle_window)).await
    }

    async fn flush(&self, min_age: Option<Duration>) -> usize {
        self.update
            .run_exclusive(|| async {
                if self.ctx.is_syncing() {
                    debug!("note syncing; flush postponed");
                    return 0;
                }

                let mut applied = 0;
                loop {
                    // A reconcile may start while an earlier write is in flight.
                    if self.ctx.is_syncing() {
                        debug!(applied, remaining = self.len(), "note syncing; flush stopped");
                        break;
                    }
                    let Some(cell) = self.next_due(min_age) else {
                        break;
                    };
                    self.apply(cell).await;
                    applied += 1;
                }
                if applied > 0 {
                    debug!(applied, remaining = self.len(), "pending updates flushed");
                }
                applied
            })
            .await
    }

    /// Pop the oldest entry if it is old enough. Entries are ordered by
    /// first edit, so a young head means every later entry is young too.
    fn next_due(&self, min_age: Option<Duration>) -> Option<CellRef> {
        let mut entries = self.entries.lock();
        let (_, first_edit) = entries.first()?;
        if let Some(min_age) = min_age {
            if first_edit.elapsed() < min_age {
                return None;
            }
        }
        entries.shift_remove_index(0).map(|(cell, _)| cell)
    }

    async fn apply(&self, cell: CellRef) {
        let Some(data) = self.ctx.document().cell(cell) else {
            debug!(%cell, "unknown cell dropped from pending updates");
            return;
        };

        match self.write(cell, &data).await {
            Ok(true) if data.kind == CellKind::Markup => {
                self.tracker.spawn_markup_run(cell);
            }
            Ok(_) => {}
            Err(TransportError::Canceled) => debug!(%cell, "paragraph update canceled"),
            Err(err) => {
                warn!(%cell, error = %err, "paragraph update failed");
                if classify(&err) == ErrorCategory::NotFound {
                    update_metadata(self.ctx.document(), cell, |m| m.remote_missing = true);
                }
            }
        }
    }

    /// Perform the remote call(s) for one cell. Returns whether the cell is
    /// still part of the document.
    async fn write(&self, cell: CellRef, data: &CellData) -> ApiResult<bool> {
        let api = self.ctx.api();
        let note_id = self.ctx.note_id();
        let index = self.ctx.document().index_of(cell);

        let (Some(index), Some(paragraph_id)) = (index, data.paragraph_id()) else {
            return match (index, data.paragraph_id()) {
                (None, Some(paragraph_id)) => {
                    api.delete_paragraph(&note_id, paragraph_id).await?;
                    info!(note = %note_id, paragraph = %paragraph_id, "paragraph deleted");
                    Ok(false)
                }
                (None, None) => Ok(false),
                (Some(_), _) => Ok(self.ctx.create_paragraph(cell).await?.is_some()),
            };
        };

        if data.metadata.remote_index != Some(index) {
            api.move_paragraph(&note_id, paragraph_id, index).await?;
            debug!(note = %note_id, paragraph = %paragraph_id, index, "paragraph moved");
            update_metadata(self.ctx.document(), cell, |m| m.remote_index = Some(index));
        }

        // A moved cell may have been edited as well.
        let config = data.paragraph_config();
        api.update_paragraph_config(&note_id, paragraph_id, &config)
            .await?;
        api.update_paragraph_text(&note_id, paragraph_id, &data.text)
            .await?;
        debug!(note = %note_id, paragraph = %paragraph_id, "paragraph updated");
        update_metadata(self.ctx.document(), cell, |m| m.config = Some(config));
        Ok(true)
    }
}
