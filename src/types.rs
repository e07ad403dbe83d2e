// src/types.rs

use std::str::FromStr;

use serde::Deserialize;

/// How a batch of cells handed to "run" is dispatched.
///
/// - `Parallel`: every cell is submitted as an asynchronous job at once; the
///   poll timer observes completion. No ordering between cells.
/// - `Sequential`: cells run one after another through a single shared
///   exclusive section, each waiting for the previous synchronous run call.
/// - `ByInterpreter`: cells are grouped by the interpreter directive in
///   their text; same interpreter runs in order, different interpreters run
///   concurrently. This mirrors how the server actually executes paragraphs
///   and is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Concurrency {
    Parallel,
    Sequential,
    ByInterpreter,
}

impl Default for Concurrency {
    fn default() -> Self {
        Concurrency::ByInterpreter
    }
}

impl FromStr for Concurrency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parallel" => Ok(Concurrency::Parallel),
            "sequential" => Ok(Concurrency::Sequential),
            "by-interpreter" | "by interpreter" | "by_interpreter" => {
                Ok(Concurrency::ByInterpreter)
            }
            other => Err(format!(
                "invalid concurrency: {other} (expected \"parallel\", \"sequential\" or \"by-interpreter\")"
            )),
        }
    }
}

impl TryFrom<String> for Concurrency {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Kind of a local cell. Markup cells are rendered by the server but never
/// explicitly run by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Markup,
    Code,
}

impl CellKind {
    /// Map an editor language to a cell kind. Unknown languages are treated
    /// as markup.
    pub fn from_language(language: &str) -> Self {
        match language.trim().to_lowercase().as_str() {
            "python" | "scala" | "r" | "sql" | "sh" | "java" | "javascript" | "json"
            | "text" | "plaintext" => CellKind::Code,
            _ => CellKind::Markup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrency_accepts_spaced_spelling() {
        assert_eq!(
            "by interpreter".parse::<Concurrency>(),
            Ok(Concurrency::ByInterpreter)
        );
        assert_eq!(" Parallel".parse::<Concurrency>(), Ok(Concurrency::Parallel));
        assert!("round-robin".parse::<Concurrency>().is_err());
    }

    #[test]
    fn markdown_and_unknown_languages_are_markup() {
        assert_eq!(CellKind::from_language("markdown"), CellKind::Markup);
        assert_eq!(CellKind::from_language("cobol"), CellKind::Markup);
        assert_eq!(CellKind::from_language("python"), CellKind::Code);
    }
}
