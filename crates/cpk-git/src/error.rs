use std::path::PathBuf;

use cpk_graph::GraphError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a git repository: {}", .0.display())]
    NotARepo(PathBuf),

    #[error("Unsupported object type: {0}")]
    UnsupportedObject(String),

    #[error("Invalid object id: {0}")]
    InvalidOid(String),
}

impl From<GitError> for GraphError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::Io(e) => GraphError::Io(e),
            other => GraphError::Backend(other.to_string()),
        }
    }
}
