// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::Result;

use super::{EngineEvent, SyncEngine};

/// Drives a [`SyncEngine`] in response to [`EngineEvent`]s.
///
/// Quick events (edits, saves, interrupts) are handled inline. Runs and
/// syncs can take as long as the remote paragraphs do, so they are spawned
/// and the loop keeps consuming events meanwhile.
pub struct Runtime {
    engine: Arc<SyncEngine>,
    event_rx: mpsc::Receiver<EngineEvent>,
    background: JoinSet<()>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("engine", &self.engine)
            .field("background", &self.background.len())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(engine: Arc<SyncEngine>, event_rx: mpsc::Receiver<EngineEvent>) -> Self {
        Self {
            engine,
            event_rx,
            background: JoinSet::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Activates the engine timers.
    /// - Consumes `EngineEvent`s from `event_rx` until `Shutdown` or until
    ///   the channel closes.
    /// - Deactivates the engine, which writes every pending edit.
    pub async fn run(mut self) -> Result<()> {
        info!("zeppelin-sync runtime started");
        self.engine.activate();

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            if !self.handle_event(event).await {
                info!("shutdown requested; stopping runtime");
                break;
            }

            // Reap finished background work.
            while let Some(res) = self.background.try_join_next() {
                if let Err(e) = res {
                    warn!(error = %e, "background task failed");
                }
            }
        }

        self.background.shutdown().await;
        self.engine.deactivate().await;
        info!("runtime exiting");
        Ok(())
    }

    /// Handle one event. Returns `false` when the loop should stop.
    async fn handle_event(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::CellEdited(cell) => {
                self.engine.cell_edited(cell);
            }
            EngineEvent::CellDeleted(cell) => {
                self.engine.cell_deleted(cell);
            }
            EngineEvent::DocumentSaved => {
                self.engine.document_saved().await;
            }
            EngineEvent::RunCells(cells) => {
                let engine = Arc::clone(&self.engine);
                self.background
                    .spawn(async move { engine.run_cells(cells).await });
            }
            EngineEvent::SyncNote => {
                let engine = Arc::clone(&self.engine);
                self.background.spawn(async move {
                    if let Err(e) = engine.sync_note().await {
                        warn!(error = %e, "note sync failed");
                    }
                });
            }
            EngineEvent::Interrupt => {
                self.engine.interrupt().await;
            }
            EngineEvent::Shutdown => return false,
        }
        true
    }
}
