use std::io::ErrorKind;

use cpk_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Bytes on disk no longer hash to their key.
    #[error("hash mismatch for {expected}: computed {computed}")]
    HashMismatch {
        expected: ObjectId,
        computed: ObjectId,
    },

    /// The backend could not be reached; the operation may succeed if retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                ErrorKind::Interrupted
                    | ErrorKind::TimedOut
                    | ErrorKind::WouldBlock
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
            ),
            Self::NotFound(_) | Self::HashMismatch { .. } => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
