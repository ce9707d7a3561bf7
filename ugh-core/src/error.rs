//! Error types for ugh-core

use thiserror::Error;

/// Main error type for the ugh-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (invalid or unreadable config)
    #[error("configuration error: {0}")]
    Config(String),

    /// Rejected user input (empty title, malformed date)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Filter construction or compilation error
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Replication error
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Service manager error
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The operation was cancelled
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised while parsing, building or compiling filters.
///
/// None of these are retried; they are surfaced to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Malformed filter expression or predicate value
    #[error("invalid filter: {0}")]
    Parse(String),

    /// Predicate kind outside the supported set
    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    /// `id` predicate whose value is not a positive integer
    #[error("invalid task id: {0:?}")]
    InvalidId(String),

    /// Both done-only and todo-only were requested
    #[error("conflicting completion scope: done-only and todo-only are mutually exclusive")]
    ConflictingScope,
}

/// Errors raised by a single replication attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network failure, busy database, server overload; worth retrying
    #[error("transient sync failure: {0}")]
    Transient(String),

    /// Authentication, divergence or schema problems; retrying won't help
    #[error("sync failed: {0}")]
    Fatal(String),

    /// The attempt was abandoned at a cancellation checkpoint
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Whether the daemon should retry the attempt within the same tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                SyncError::Transient(format!("local database busy: {}", err))
            }
            _ => SyncError::Fatal(format!("local database error: {}", err)),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Transient(format!("IO error: {}", err))
    }
}

/// Errors raised by service-manager adapters.
///
/// The first three are sentinels callers match on.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service is already installed at {0}")]
    AlreadyInstalled(String),

    #[error("service is not installed")]
    NotInstalled,

    #[error("service is not running")]
    NotRunning,

    /// No adapter exists for this operating system
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// A service-manager command exited unsuccessfully
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ugh-core
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(SyncError::Transient("timeout".to_string()).is_retryable());
        assert!(!SyncError::Fatal("401 unauthorized".to_string()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn test_busy_database_is_transient() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(SyncError::from(busy).is_retryable());

        let corrupt = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CORRUPT),
            None,
        );
        assert!(!SyncError::from(corrupt).is_retryable());
    }

    #[test]
    fn test_nested_errors_display_transparently() {
        let err: Error = FilterError::InvalidId("abc".to_string()).into();
        assert_eq!(err.to_string(), "invalid task id: \"abc\"");
    }
}
