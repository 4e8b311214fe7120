//! Row types for the index store.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

/// A file as seen by the directory walker, ready to upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetaInput {
    pub path: String,
    pub filename: String,
    pub dir_components: String,
    pub root: String,
    pub mtime: i64,
    pub relative_path: Option<String>,
}

/// One frecency record ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct FrecencyInput {
    pub path: String,
    pub git_recency: f64,
    pub git_frequency: i64,
    pub git_status_boost: f64,
}

/// A watched root row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedRoot {
    pub root: String,
    pub max_depth: i64,
    pub last_indexed: Option<i64>,
    pub file_count: Option<i64>,
}

impl FromRow<'_, SqliteRow> for WatchedRoot {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            root: row.try_get("root")?,
            max_depth: row.try_get("max_depth")?,
            last_indexed: row.try_get("last_indexed")?,
            file_count: row.try_get("file_count")?,
        })
    }
}

/// One scored search result, common to the FTS and fuzzy paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResultRow {
    pub path: String,
    pub filename: String,
    pub relative_path: Option<String>,
    pub root: String,
    pub score: f64,
}

impl FromRow<'_, SqliteRow> for SearchResultRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            path: row.try_get("path")?,
            filename: row.try_get("filename")?,
            relative_path: row.try_get("relative_path")?,
            root: row.try_get("root")?,
            score: row.try_get("score")?,
        })
    }
}
