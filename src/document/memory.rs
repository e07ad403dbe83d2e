// src/document/memory.rs

//! In-memory notebook surface.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{CellData, CellMetadata, CellRef, ExecutionSurface, NoteMetadata, NotebookDocument};
use crate::client::Timestamp;
use crate::exec::output::OutputFragment;

/// Lifecycle of one run as seen by the surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRecord {
    pub started: bool,
    pub started_at: Option<Timestamp>,
    pub ended: bool,
    pub success: Option<bool>,
    pub ended_at: Option<Timestamp>,
}

#[derive(Debug)]
struct Slot {
    data: CellData,
    runs: Vec<RunRecord>,
    cancel: Option<CancellationToken>,
}

#[derive(Debug, Default)]
struct State {
    note: NoteMetadata,
    order: Vec<CellRef>,
    // Deleted cells stay here as tombstones.
    slots: HashMap<CellRef, Slot>,
    next_id: u64,
}

impl State {
    fn alloc(&mut self, data: CellData) -> CellRef {
        let cell = CellRef(self.next_id);
        self.next_id += 1;
        self.slots.insert(
            cell,
            Slot {
                data,
                runs: Vec::new(),
                cancel: None,
            },
        );
        cell
    }
}

/// [`NotebookDocument`] backed by a plain cell list.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotebook {
    state: Arc<Mutex<State>>,
}

impl MemoryNotebook {
    pub fn new(note_id: impl Into<String>) -> Self {
        let state = State {
            note: NoteMetadata {
                id: note_id.into(),
                name: String::new(),
            },
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn note(&self) -> NoteMetadata {
        self.state.lock().note.clone()
    }

    pub fn push_cell(&self, data: CellData) -> CellRef {
        let mut state = self.state.lock();
        let cell = state.alloc(data);
        state.order.push(cell);
        cell
    }

    pub fn insert_cell(&self, index: usize, data: CellData) -> CellRef {
        let mut state = self.state.lock();
        let cell = state.alloc(data);
        let index = index.min(state.order.len());
        state.order.insert(index, cell);
        cell
    }

    pub fn edit_text(&self, cell: CellRef, text: impl Into<String>) -> bool {
        match self.state.lock().slots.get_mut(&cell) {
            Some(slot) => {
                slot.data.text = text.into();
                true
            }
            None => false,
        }
    }

    pub fn move_cell(&self, cell: CellRef, index: usize) -> bool {
        let mut state = self.state.lock();
        let Some(from) = state.order.iter().position(|c| *c == cell) else {
            return false;
        };
        state.order.remove(from);
        let index = index.min(state.order.len());
        state.order.insert(index, cell);
        true
    }

    pub fn delete_cell(&self, cell: CellRef) -> bool {
        let mut state = self.state.lock();
        let before = state.order.len();
        state.order.retain(|c| *c != cell);
        before != state.order.len()
    }

    pub fn outputs(&self, cell: CellRef) -> Vec<OutputFragment> {
        self.state
            .lock()
            .slots
            .get(&cell)
            .map(|s| s.data.outputs.clone())
            .unwrap_or_default()
    }

    /// Latest run of `cell`, if it was ever executed.
    pub fn run_record(&self, cell: CellRef) -> Option<RunRecord> {
        self.state
            .lock()
            .slots
            .get(&cell)
            .and_then(|s| s.runs.last().cloned())
    }

    pub fn run_count(&self, cell: CellRef) -> usize {
        self.state
            .lock()
            .slots
            .get(&cell)
            .map_or(0, |s| s.runs.len())
    }

    /// Request cancellation of the cell's current run, as the user pressing
    /// "stop" would.
    pub fn cancel(&self, cell: CellRef) -> bool {
        let token = self
            .state
            .lock()
            .slots
            .get(&cell)
            .and_then(|s| s.cancel.clone());
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

impl NotebookDocument for MemoryNotebook {
    fn note_id(&self) -> String {
        self.state.lock().note.id.clone()
    }

    fn cells(&self) -> Vec<CellRef> {
        self.state.lock().order.clone()
    }

    fn index_of(&self, cell: CellRef) -> Option<usize> {
        self.state.lock().order.iter().position(|c| *c == cell)
    }

    fn cell(&self, cell: CellRef) -> Option<CellData> {
        self.state.lock().slots.get(&cell).map(|s| s.data.clone())
    }

    fn set_metadata(&self, cell: CellRef, metadata: CellMetadata) {
        if let Some(slot) = self.state.lock().slots.get_mut(&cell) {
            slot.data.metadata = metadata;
        }
    }

    fn replace_cells(&self, cells: Vec<CellData>, note: NoteMetadata) -> Vec<CellRef> {
        let mut state = self.state.lock();
        state.order.clear();
        let refs: Vec<CellRef> = cells.into_iter().map(|data| state.alloc(data)).collect();
        state.order = refs.clone();
        state.note = note;
        refs
    }

    fn create_execution(&self, cell: CellRef) -> Box<dyn ExecutionSurface> {
        let token = CancellationToken::new();
        let run = {
            let mut state = self.state.lock();
            match state.slots.get_mut(&cell) {
                Some(slot) => {
                    slot.runs.push(RunRecord::default());
                    slot.cancel = Some(token.clone());
                    Some(slot.runs.len() - 1)
                }
                None => None,
            }
        };
        Box::new(MemorySurface {
            state: Arc::clone(&self.state),
            cell,
            run,
            token,
        })
    }
}

#[derive(Debug)]
struct MemorySurface {
    state: Arc<Mutex<State>>,
    cell: CellRef,
    run: Option<usize>,
    token: CancellationToken,
}

impl MemorySurface {
    fn with_slot(&self, f: impl FnOnce(&mut Slot, Option<usize>)) {
        if let Some(slot) = self.state.lock().slots.get_mut(&self.cell) {
            f(slot, self.run);
        }
    }
}

impl ExecutionSurface for MemorySurface {
    fn start(&self, at: Option<Timestamp>) {
        trace!(cell = %self.cell, "surface start");
        self.with_slot(|slot, run| {
            if let Some(record) = run.and_then(|i| slot.runs.get_mut(i)) {
                record.started = true;
                record.started_at = at;
            }
        });
    }

    fn end(&self, success: Option<bool>, at: Option<Timestamp>) {
        trace!(cell = %self.cell, ?success, "surface end");
        self.with_slot(|slot, run| {
            if let Some(record) = run.and_then(|i| slot.runs.get_mut(i)) {
                record.ended = true;
                record.success = success;
                record.ended_at = at;
            }
        });
    }

    fn replace_output(&self, outputs: Vec<OutputFragment>) {
        self.with_slot(|slot, _| slot.data.outputs = outputs);
    }

    fn clear_output(&self) {
        self.with_slot(|slot, _| slot.data.outputs.clear());
    }

    fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deleted_cells_keep_their_content() {
        let doc = MemoryNotebook::new("n");
        let a = doc.push_cell(CellData::code("python", "a"));
        let b = doc.push_cell(CellData::code("python", "b"));

        assert!(doc.delete_cell(a));
        assert_eq!(doc.index_of(a), None);
        assert_eq!(doc.index_of(b), Some(0));
        assert_eq!(doc.cell(a).map(|c| c.text), Some("a".to_string()));
    }

    #[test]
    fn handles_survive_moves() {
        let doc = MemoryNotebook::new("n");
        let a = doc.push_cell(CellData::code("python", "a"));
        let b = doc.push_cell(CellData::code("python", "b"));
        let c = doc.insert_cell(0, CellData::markup("c"));

        assert_eq!(doc.cells(), vec![c, a, b]);
        assert!(doc.move_cell(c, 5));
        assert_eq!(doc.cells(), vec![a, b, c]);
    }

    #[test]
    fn surface_records_lifecycle_and_outputs() {
        let doc = MemoryNotebook::new("n");
        let a = doc.push_cell(CellData::code("python", "a"));
        let surface = doc.create_execution(a);

        surface.start(None);
        surface.replace_output(vec![OutputFragment::Text("2".into())]);
        surface.end(Some(true), None);

        let record = doc.run_record(a).unwrap();
        assert!(record.started && record.ended);
        assert_eq!(record.success, Some(true));
        assert_eq!(doc.outputs(a), vec![OutputFragment::Text("2".into())]);

        assert!(doc.cancel(a));
        assert!(surface.cancellation().is_cancelled());
    }

    #[test]
    fn replace_cells_tombstones_old_handles() {
        let doc = MemoryNotebook::new("n");
        let old = doc.push_cell(CellData::code("python", "old"));
        let new = doc.replace_cells(
            vec![CellData::markup("x"), CellData::markup("y")],
            NoteMetadata {
                id: "n".into(),
                name: "Note".into(),
            },
        );
        assert_eq!(new.len(), 2);
        assert_eq!(doc.index_of(old), None);
        assert_eq!(doc.note().name, "Note");
    }
}
