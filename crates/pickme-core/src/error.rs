// crates/pickme-core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced while resolving configuration-derived values (namespaces,
/// roots, paths). Config *parsing* itself (TOML -> `Config`) is out of scope;
/// this crate only validates the already-parsed struct.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("home directory could not be determined")]
    HomeDirNotFound,

    #[error("namespace {name:?} is not configured")]
    UnknownNamespace { name: String },

    #[error("path does not exist: {path}")]
    PathNotFound { path: PathBuf },
}

/// Database-failure classification shared by crates that touch SQLite.
///
/// Kept here (rather than duplicated per crate) so the daemon's circuit
/// breaker and the store's error type agree on what counts as "locked" vs.
/// "corrupt" vs. a generic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorKind {
    /// Generic SQLite failure.
    Generic,
    /// SQLite reported the database busy/locked.
    Locked,
    /// SQLite reported "disk image is malformed".
    Corrupt,
}

impl DatabaseErrorKind {
    /// Classify a raw SQLite error message (as surfaced by the driver).
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("disk image is malformed") {
            DatabaseErrorKind::Corrupt
        } else if lower.contains("database is locked") || lower.contains("busy") {
            DatabaseErrorKind::Locked
        } else {
            DatabaseErrorKind::Generic
        }
    }
}
