//! The index store: a SQLite/FTS5-backed table of files plus their
//! git-derived frecency, and the queries the picker runs against it.

pub mod frecency;
pub mod schema;
pub mod store;
pub mod types;

pub use frecency::{compute_frecency, FrecencySnapshot};
pub use store::Store;
pub use types::{FileMetaInput, FrecencyInput, SearchResultRow, WatchedRoot};

use pickme_core::DatabaseErrorKind;
use thiserror::Error;

/// Errors raised by the index store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database is locked")]
    DatabaseLocked,

    #[error("database is corrupt: {0}")]
    DatabaseCorrupt(String),

    #[error("malformed FTS5 query {query:?}: {source}")]
    FtsSyntax { query: String, source: sqlx::Error },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

impl StoreError {
    /// Reclassify a raw sqlx error using the shared locked/corrupt taxonomy,
    /// falling back to the generic `Database` variant.
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match DatabaseErrorKind::classify(&err.to_string()) {
            DatabaseErrorKind::Locked => StoreError::DatabaseLocked,
            DatabaseErrorKind::Corrupt => StoreError::DatabaseCorrupt(err.to_string()),
            DatabaseErrorKind::Generic => StoreError::Database(err),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
