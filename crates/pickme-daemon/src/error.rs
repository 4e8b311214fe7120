//! Error taxonomy for the daemon process, separate from the query/store
//! taxonomies: these are the fatal-vs-surfaced decisions the server loop
//! makes, not per-call error detail.

use pickme_query::PickerError;
use pickme_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("database error: {0}")]
    Database(#[from] StoreError),

    #[error(transparent)]
    Picker(#[from] PickerError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("request timeout")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// Whether this error counts as a "database error" for the consecutive
    /// failure circuit, as opposed to a transient/non-fatal condition.
    pub fn is_database_error(&self) -> bool {
        matches!(self, DaemonError::Database(_))
            || matches!(self, DaemonError::Picker(PickerError::Store(_)))
    }

    /// The text placed in a protocol error response.
    pub fn response_message(&self) -> String {
        match self {
            DaemonError::Timeout => "Request timeout".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_is_flagged() {
        let err = DaemonError::Database(StoreError::DatabaseLocked);
        assert!(err.is_database_error());
    }

    #[test]
    fn test_config_error_is_not_database() {
        let err = DaemonError::Config("missing socket_path".to_string());
        assert!(!err.is_database_error());
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(DaemonError::Timeout.response_message(), "Request timeout");
    }
}
