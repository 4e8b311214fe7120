//! The query pipeline: prefix parsing, FTS query escaping/expansion, fuzzy
//! fallback, and the picker orchestrator that composes them with the index
//! store.

pub mod escape;
pub mod fuzzy;
pub mod picker;
pub mod prefix;

pub use picker::{IndexOutcome, Picker, WalkBatch, WalkParams, Walker};

use pickme_store::{SearchResultRow, StoreError};
use thiserror::Error;

/// Options accepted by [`Picker::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub project_root: Option<String>,
    pub limit: u32,
}

impl SearchOptions {
    pub fn new(project_root: Option<String>, limit: Option<u32>) -> Self {
        Self {
            project_root,
            limit: limit.unwrap_or(50),
        }
    }
}

/// One result record: absolute `path`, basename `filename`, and
/// `relative_path` falling back to the absolute path when the store has
/// none on file.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PickResult {
    pub path: String,
    pub filename: String,
    pub relative_path: String,
    pub root: String,
    pub score: f64,
}

impl From<SearchResultRow> for PickResult {
    fn from(row: SearchResultRow) -> Self {
        let relative_path = row.relative_path.clone().unwrap_or_else(|| row.path.clone());
        Self {
            path: row.path,
            filename: row.filename,
            relative_path,
            root: row.root,
            score: row.score,
        }
    }
}

/// Errors surfaced by the query pipeline. The store's errors pass through
/// untranslated; the orchestrator adds none of its own today.
#[derive(Debug, Error)]
pub enum PickerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("walker failed: {0}")]
    Walker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_result_falls_back_to_absolute_path() {
        let row = SearchResultRow {
            path: "/p/a.rs".to_string(),
            filename: "a.rs".to_string(),
            relative_path: None,
            root: "/p".to_string(),
            score: 1.0,
        };
        let result: PickResult = row.into();
        assert_eq!(result.relative_path, "/p/a.rs");
    }

    #[test]
    fn test_pick_result_uses_relative_path_when_present() {
        let row = SearchResultRow {
            path: "/p/a.rs".to_string(),
            filename: "a.rs".to_string(),
            relative_path: Some("a.rs".to_string()),
            root: "/p".to_string(),
            score: 1.0,
        };
        let result: PickResult = row.into();
        assert_eq!(result.relative_path, "a.rs");
    }
}
