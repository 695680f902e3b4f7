//! Foundation types for chainpack.
//!
//! Every other `cpk-*` crate depends on `cpk-types`. It holds the two kinds of
//! identifier the system juggles (store digests and version-control object
//! ids), the raw object model exchanged with the local repository, and the
//! validated names used to address repositories and references.
//!
//! # Key Types
//!
//! - [`ObjectId`]: BLAKE3 digest addressing a blob in the object store
//! - [`Oid`]: identifier of a commit, tree, blob, or tag in the local graph
//! - [`RawObject`]: one version-control object with its kind and payload
//! - [`RepoName`], [`RefName`], [`RepoRef`]: validated `repo:ref` addressing
//! - [`Principal`], [`Visibility`]: who acts, and who may read

pub mod error;
pub mod names;
pub mod object;
pub mod oid;
pub mod principal;

pub use error::TypeError;
pub use names::{RefName, RepoName, RepoRef, REF_SEPARATOR};
pub use object::ObjectId;
pub use oid::{ObjectKind, Oid, RawObject};
pub use principal::{Principal, Visibility};
