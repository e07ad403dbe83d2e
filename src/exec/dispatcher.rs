// src/exec/dispatcher.rs

//! Routes runs to per-interpreter exclusive sections.
//!
//! The server runs paragraphs of one interpreter sequentially, so runs that
//! target the same interpreter are queued behind each other locally as
//! well. Runs for different interpreters proceed concurrently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::document::CellRef;
use crate::sync::mutex::AsyncMutex;

/// Key of the queue used by cells without an interpreter directive.
pub const DEFAULT_INTERPRETER: &str = "";

static DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*%([\w-]+)(?:\.[\w.-]+)?").expect("interpreter directive regex")
});

/// Interpreter named by a leading `%name` or `%name.sub` directive, or
/// [`DEFAULT_INTERPRETER`].
pub fn extract_key(text: &str) -> &str {
    DIRECTIVE
        .captures(text)
        .and_then(|c| c.get(1))
        .map_or(DEFAULT_INTERPRETER, |m| m.as_str())
}

#[derive(Debug)]
pub struct InterpreterDispatcher {
    queues: Mutex<HashMap<String, Arc<AsyncMutex>>>,
}

impl Default for InterpreterDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterDispatcher {
    pub fn new() -> Self {
        let mut queues = HashMap::new();
        queues.insert(
            DEFAULT_INTERPRETER.to_string(),
            Arc::new(AsyncMutex::new("interpreter default")),
        );
        Self {
            queues: Mutex::new(queues),
        }
    }

    /// Queue for `key`, created on first use and kept for the lifetime of
    /// the dispatcher.
    pub fn queue(&self, key: &str) -> Arc<AsyncMutex> {
        let mut queues = self.queues.lock();
        let queue = queues
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(format!("interpreter {key}"))));
        Arc::clone(queue)
    }

    pub fn queue_count(&self) -> usize {
        self.queues.lock().len()
    }

    /// Run `run` inside the exclusive section of the interpreter named by
    /// `text`.
    pub async fn dispatch<F, Fut, T>(&self, cell: CellRef, text: &str, run: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let key = extract_key(text);
        let queue = self.queue(key);
        debug!(%cell, key, queued = queue.is_locked(), "dispatching run");
        queue.run_exclusive(run).await
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn extracts_interpreter_directive() {
        assert_eq!(extract_key("%python\nprint(1)"), "python");
        assert_eq!(extract_key("  %spark.pyspark df.show()"), "spark");
        assert_eq!(extract_key("%md # title"), "md");
        assert_eq!(extract_key("%jdbc-hive.sub select 1"), "jdbc-hive");
        assert_eq!(extract_key("print(1)"), DEFAULT_INTERPRETER);
        assert_eq!(extract_key("x = 1 % 2"), DEFAULT_INTERPRETER);
        assert_eq!(extract_key(""), DEFAULT_INTERPRETER);
    }

    #[test]
    fn default_queue_exists_and_queues_are_reused() {
        let d = InterpreterDispatcher::new();
        assert_eq!(d.queue_count(), 1);
        let a = d.queue("python");
        let b = d.queue("python");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(d.queue_count(), 2);
    }

    proptest! {
        #[test]
        fn key_is_a_prefix_word_of_the_text(name in "[a-z][a-z0-9_-]{0,12}", rest in "[ .a-z0-9]{0,20}") {
            let text = format!("%{name}{rest}");
            let key = extract_key(&text);
            prop_assert!(key.starts_with(name.as_str()));
        }

        #[test]
        fn text_without_percent_uses_default(text in "[^%]*") {
            prop_assert_eq!(extract_key(&text), DEFAULT_INTERPRETER);
        }
    }
}
