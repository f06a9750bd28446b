//! Error types for remote tables.

use thiserror::Error;

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Result type reported by backend collaborators.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors that can occur while operating on a remote table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// A local add used a key that is already present.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// A local edit referenced a key that is not present.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// The table was closed and no longer accepts operations.
    #[error("table '{0}' has been closed")]
    Disposed(String),

    /// The backend rejected or failed a write.
    #[error("backend write failed for '{key}': {message}")]
    BackendWrite {
        /// Key of the record being written.
        key: String,
        /// Error message.
        message: String,
    },

    /// The backend reported a failure on the read side.
    #[error("backend read failed: {0}")]
    BackendRead(String),

    /// A remote payload could not be decoded into a record.
    #[error("failed to decode record '{key}': {message}")]
    Deserialization {
        /// Key of the offending record.
        key: String,
        /// Error message.
        message: String,
    },

    /// A local record could not be encoded for the backend.
    #[error("failed to encode record '{key}': {message}")]
    Serialization {
        /// Key of the offending record.
        key: String,
        /// Error message.
        message: String,
    },

    /// Codec error not tied to a key.
    #[error("codec error: {0}")]
    Codec(String),
}

impl TableError {
    /// Returns true if the next scheduled push or apply may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TableError::BackendWrite { .. } | TableError::BackendRead(_)
        )
    }

    /// Returns true if this error signals a caller mistake.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            TableError::DuplicateKey(_) | TableError::KeyNotFound(_) | TableError::Disposed(_)
        )
    }

    /// Attaches a record key to a keyless codec error.
    pub(crate) fn decoding(key: &str, err: TableError) -> Self {
        match err {
            TableError::Codec(message) => TableError::Deserialization {
                key: key.to_string(),
                message,
            },
            other => other,
        }
    }

    /// Attaches a record key to a keyless codec error.
    pub(crate) fn encoding(key: &str, err: TableError) -> Self {
        match err {
            TableError::Codec(message) => TableError::Serialization {
                key: key.to_string(),
                message,
            },
            other => other,
        }
    }
}

/// Errors reported by a backend through a completion signal or listener.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The caller is not allowed to touch the path.
    #[error("permission denied for '{0}'")]
    PermissionDenied(String),
}
