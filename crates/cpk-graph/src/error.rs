use cpk_types::Oid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("object not found: {0}")]
    MissingObject(Oid),

    #[error("corrupt object {oid}: {reason}")]
    CorruptObject { oid: Oid, reason: String },

    #[error("expected {expected} object at {oid}, found {actual}")]
    UnexpectedKind {
        oid: Oid,
        expected: &'static str,
        actual: String,
    },

    #[error("invalid ref name: {0}")]
    InvalidRef(String),

    /// Failure inside the backing version-control library.
    #[error("repository backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GraphResult<T> = Result<T, GraphError>;
