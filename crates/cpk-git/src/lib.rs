//! Git backend for chainpack.
//!
//! [`GitRepository`] implements [`cpk_graph::LocalRepository`] over a
//! libgit2 repository, bare or with a working tree. Objects move in and out
//! of the object database unchanged, so ids on both sides of a sync are
//! plain git SHA-1 ids.

mod error;
mod repo;

pub use error::GitError;
pub use repo::GitRepository;
