use std::path::PathBuf;

use cpk_crypto::CryptoError;
use cpk_graph::GraphError;
use cpk_ledger::LedgerError;
use cpk_pack::PackError;
use cpk_store::StoreError;
use cpk_types::{ObjectId, RepoName, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The caller lacks the role the operation needs.
    #[error("{0}")]
    Authorization(String),

    #[error("{0} is not registered")]
    NotRegistered(String),

    #[error("Repo already exists")]
    AlreadyExists(RepoName),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("{0}")]
    MissingKeyMaterial(String),

    #[error("decryption failed: {0}")]
    Decryption(#[from] CryptoError),

    /// A transient failure that outlasted every retry.
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },

    #[error("corrupt pack {pack}: {source}")]
    CorruptPack {
        pack: ObjectId,
        #[source]
        source: PackError,
    },

    #[error("corrupt push chain: {0}")]
    CorruptChain(String),

    /// The ledger accepted the push but the local tracking ref could not be
    /// moved.
    #[error("local apply failed; remote state has already advanced: {0}")]
    RemoteAdvanced(#[source] GraphError),

    #[error("local repository error: {0}")]
    Local(#[from] GraphError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A non-transient ledger backend failure.
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl SyncError {
    /// Whether the whole operation may be attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<LedgerError> for SyncError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotRegistered(repo) => Self::NotRegistered(repo.to_string()),
            LedgerError::AlreadyExists(repo) => Self::AlreadyExists(repo),
            LedgerError::Unauthorized(msg) => Self::Authorization(msg),
            LedgerError::LastOwner | LedgerError::NotPrivate | LedgerError::StaleHead { .. } => {
                Self::InvariantViolation(err.to_string())
            }
            LedgerError::MissingGrant(_) => Self::MissingKeyMaterial(err.to_string()),
            LedgerError::Transport(message) => Self::Transport {
                attempts: 1,
                message,
            },
            LedgerError::Storage(msg) => Self::Ledger(msg),
        }
    }
}

impl From<TypeError> for SyncError {
    fn from(err: TypeError) -> Self {
        Self::InvariantViolation(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Errors loading a [`SyncConfig`](crate::SyncConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
