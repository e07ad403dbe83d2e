// src/exec/execution.rs

//! A single local run of a cell and its state machine.
//!
//! ```text
//! Init --start(ts?)--> Started --end(success?, ts?)--> Resolved
//! ```
//!
//! Calls that do not match the current state are logged and ignored, so a
//! resolved execution can never be restarted.

use std::fmt;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::output::OutputFragment;
use super::progress::{ProgressRenderer, TextProgressBar};
use crate::client::Timestamp;
use crate::document::{CellRef, ExecutionSurface};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Init,
    Started,
    Resolved,
}

struct Inner {
    state: ExecutionState,
    started_at: Option<Timestamp>,
    ended_at: Option<Timestamp>,
    progress: Option<Box<dyn ProgressRenderer>>,
}

pub struct Execution {
    cell: CellRef,
    paragraph_id: String,
    surface: Box<dyn ExecutionSurface>,
    inner: Mutex<Inner>,
    resolved: CancellationToken,
}

impl fmt::Debug for Execution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("cell", &self.cell)
            .field("paragraph_id", &self.paragraph_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Execution {
    pub fn new(
        cell: CellRef,
        paragraph_id: impl Into<String>,
        surface: Box<dyn ExecutionSurface>,
    ) -> Self {
        Self {
            cell,
            paragraph_id: paragraph_id.into(),
            surface,
            inner: Mutex::new(Inner {
                state: ExecutionState::Init,
                started_at: None,
                ended_at: None,
                progress: None,
            }),
            resolved: CancellationToken::new(),
        }
    }

    pub fn cell(&self) -> CellRef {
        self.cell
    }

    pub fn paragraph_id(&self) -> &str {
        &self.paragraph_id
    }

    pub fn state(&self) -> ExecutionState {
        self.inner.lock().state
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.inner.lock().started_at
    }

    pub fn ended_at(&self) -> Option<Timestamp> {
        self.inner.lock().ended_at
    }

    /// Fires when the user asks to stop this run.
    pub fn cancellation(&self) -> CancellationToken {
        self.surface.cancellation()
    }

    /// Fires once the execution is resolved or dropped.
    pub fn resolved(&self) -> CancellationToken {
        self.resolved.clone()
    }

    /// Move from `Init` to `Started`. Returns whether the call took effect.
    pub fn start(&self, at: Option<Timestamp>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ExecutionState::Init {
            debug!(
                paragraph = %self.paragraph_id,
                state = ?inner.state,
                "execution skips wrong start call"
            );
            return false;
        }
        inner.progress = Some(Box::new(TextProgressBar::new(at)));
        inner.state = ExecutionState::Started;
        inner.started_at = at;
        self.surface.start(at);
        true
    }

    /// Start at "now" unless already started or resolved.
    pub fn start_if_init(&self) {
        if self.state() == ExecutionState::Init {
            self.start(Some(Utc::now()));
        }
    }

    /// Move from `Started` to `Resolved`. `success = None` records an
    /// inconclusive run.
    pub fn end(&self, success: Option<bool>, at: Option<Timestamp>) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ExecutionState::Started {
            debug!(
                paragraph = %self.paragraph_id,
                state = ?inner.state,
                "execution skips wrong end call"
            );
            return false;
        }
        inner.state = ExecutionState::Resolved;
        inner.ended_at = at;
        inner.progress = None;
        self.surface.end(success, at);
        drop(inner);
        self.resolved.cancel();
        true
    }

    /// Render the progress line. `None` unless the execution is started.
    pub fn render_progress(&self, percent: f64) -> Option<String> {
        let mut inner = self.inner.lock();
        if inner.state != ExecutionState::Started {
            return None;
        }
        inner.progress.as_mut().map(|bar| bar.render(percent))
    }

    pub fn replace_output(&self, outputs: Vec<OutputFragment>) {
        self.surface.replace_output(outputs);
    }

    pub fn clear_output(&self) {
        self.surface.clear_output();
    }
}

impl Drop for Execution {
    fn drop(&mut self) {
        self.resolved.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CellData, MemoryNotebook, NotebookDocument};

    fn execution() -> (MemoryNotebook, CellRef, Execution) {
        let doc = MemoryNotebook::new("note");
        let cell = doc.push_cell(CellData::code("python", "1"));
        let exec = Execution::new(cell, "p1", doc.create_execution(cell));
        (doc, cell, exec)
    }

    #[test]
    fn follows_init_started_resolved() {
        let (doc, cell, exec) = execution();
        assert_eq!(exec.state(), ExecutionState::Init);
        assert!(exec.render_progress(10.0).is_none());

        assert!(exec.start(None));
        assert!(exec.render_progress(10.0).is_some());
        assert!(!exec.start(None));

        assert!(exec.end(Some(false), None));
        assert_eq!(exec.state(), ExecutionState::Resolved);
        assert!(exec.resolved().is_cancelled());

        let record = doc.run_record(cell).unwrap();
        assert_eq!(record.success, Some(false));
    }

    #[test]
    fn wrong_calls_are_no_ops() {
        let (doc, cell, exec) = execution();
        assert!(!exec.end(Some(true), None));
        assert_eq!(exec.state(), ExecutionState::Init);

        exec.start_if_init();
        exec.end(None, None);
        assert!(!exec.start(None));
        assert!(!exec.end(Some(true), None));

        let record = doc.run_record(cell).unwrap();
        assert_eq!(record.success, None);
        assert_eq!(exec.state(), ExecutionState::Resolved);
    }
}
