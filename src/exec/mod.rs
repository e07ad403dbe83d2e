// src/exec/mod.rs

//! Remote execution layer.
//!
//! This module runs cells on the notebook server and follows each run until
//! the server reports a terminal status.
//!
//! - [`execution`] holds the local state machine of one run.
//! - [`tracker`] owns the tracked runs, polls them and implements the
//!   parallel / sequential / by-interpreter run modes.
//! - [`dispatcher`] serialises runs per interpreter.
//! - [`output`] converts paragraph results into cell outputs.
//! - [`progress`] renders the progress line of a running cell.

pub mod dispatcher;
pub mod execution;
pub mod output;
pub mod progress;
pub mod tracker;

pub use dispatcher::{InterpreterDispatcher, extract_key};
pub use execution::{Execution, ExecutionState};
pub use output::{OutputFragment, convert_results};
pub use progress::{ProgressRenderer, TextProgressBar};
pub use tracker::ExecutionTracker;
