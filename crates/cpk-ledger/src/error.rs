use cpk_types::{Oid, RepoName};

use crate::records::Role;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("{0} is not registered")]
    NotRegistered(RepoName),

    #[error("Repo already exists")]
    AlreadyExists(RepoName),

    /// The caller lacks the role the operation needs.
    #[error("{0}")]
    Unauthorized(String),

    #[error("Cannot remove the last owner from a repo")]
    LastOwner,

    #[error("Repo is not a private repo")]
    NotPrivate,

    #[error("a wrapped key and public key are required to add {0} to a private repo")]
    MissingGrant(Role),

    /// `commit_push` named a previous head that is no longer current.
    #[error("stale head for {reference}: expected {expected:?}, ledger has {actual:?}")]
    StaleHead {
        reference: String,
        expected: Option<Oid>,
        actual: Option<Oid>,
    },

    /// The ledger could not be reached; the call may succeed if retried.
    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("ledger storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
