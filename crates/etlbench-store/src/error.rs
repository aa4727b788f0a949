//! Error types for etlbench-store

use thiserror::Error;

/// Errors that can occur in the dataset layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Any SQLite failure outside a numbered statement
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A statement inside a fragment failed (1-based index)
    #[error("statement {index} failed: {source}")]
    Statement {
        index: usize,
        #[source]
        source: rusqlite::Error,
    },

    /// Execution hit the wall-clock limit and was interrupted
    #[error("execution exceeded {limit_ms}ms and was interrupted")]
    Timeout { limit_ms: u64 },

    /// Schema alias that is not a plain SQL identifier
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Filesystem error while preparing a store
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True when SQLite reported the operation as interrupted.
    pub(crate) fn is_interrupt(&self) -> bool {
        let err = match self {
            StoreError::Sqlite(err) | StoreError::Statement { source: err, .. } => err,
            _ => return false,
        };
        matches!(
            err,
            rusqlite::Error::SqliteFailure(inner, _)
                if inner.code == rusqlite::ErrorCode::OperationInterrupted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_names_index() {
        let err = StoreError::Statement {
            index: 3,
            source: rusqlite::Error::InvalidQuery,
        };
        assert!(err.to_string().starts_with("statement 3 failed"));
        assert!(!err.is_interrupt());
    }

    #[test]
    fn test_timeout_display() {
        let err = StoreError::Timeout { limit_ms: 250 };
        assert_eq!(err.to_string(), "execution exceeded 250ms and was interrupted");
    }
}
