// src/sync/mod.rs

//! Keeping the local note and the server in step.
//!
//! - [`mutex`] is the FIFO exclusive section every queue here is built on.
//! - [`pending`] debounces local edits into remote paragraph writes.
//! - [`reconcile`] replaces the local cells with the remote note.
//! - [`timer`] drives the periodic flush and poll.

pub mod mutex;
pub mod pending;
pub mod reconcile;
pub mod timer;

pub use mutex::{AsyncMutex, ReleaseHandle};
pub use pending::PendingUpdateQueue;
pub use reconcile::{NoteReconciler, ReconcileReport};
pub use timer::PeriodicTimer;
