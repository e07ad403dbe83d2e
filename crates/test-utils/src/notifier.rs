// src/notifier.rs

use std::sync::{Arc, Mutex};

use zeppelin_sync::document::{CellRef, Notifier, PromptFuture};

/// Notifier that records every message and answers recreate prompts with a
/// fixed choice.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    accept_recreate: bool,
    errors: Arc<Mutex<Vec<String>>>,
    warnings: Arc<Mutex<Vec<String>>>,
    prompts: Arc<Mutex<Vec<CellRef>>>,
}

impl RecordingNotifier {
    pub fn accepting() -> Self {
        Self {
            accept_recreate: true,
            ..Default::default()
        }
    }

    pub fn declining() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> Vec<CellRef> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn show_warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn confirm_recreate<'a>(&'a self, cell: CellRef) -> PromptFuture<'a> {
        self.prompts.lock().unwrap().push(cell);
        let accept = self.accept_recreate;
        Box::pin(async move { accept })
    }
}
