use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Repo names cannot contain the {separator} character")]
    ReservedCharacter { name: String, separator: char },

    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("malformed reference {0:?}: expected <repo>:<ref>")]
    MalformedRepoRef(String),

    #[error("unknown object kind: {0}")]
    UnknownObjectKind(String),
}
