//! Leaderboard errors.

use tablesync_core::{BackendError, TableError};
use thiserror::Error;

/// Result type for leaderboard operations.
pub type LeaderboardResult<T> = Result<T, LeaderboardError>;

/// Errors raised by a leaderboard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LeaderboardError {
    /// One of the underlying tables failed.
    #[error(transparent)]
    Table(#[from] TableError),

    /// Replay storage failed.
    #[error("replay storage failed at '{path}': {source}")]
    Storage {
        /// Storage path involved.
        path: String,
        /// Backend error.
        source: BackendError,
    },

    /// The leaderboard was closed.
    #[error("leaderboard for map '{0}' has been closed")]
    Closed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_errors_convert() {
        let err: LeaderboardError = TableError::Disposed("ranks".into()).into();
        assert_eq!(err.to_string(), "table 'ranks' has been closed");
    }

    #[test]
    fn storage_error_names_path() {
        let err = LeaderboardError::Storage {
            path: "Replay/OfflineMaps/m/k".into(),
            source: BackendError::Unavailable("offline".into()),
        };
        assert!(err.to_string().contains("Replay/OfflineMaps/m/k"));
    }
}
