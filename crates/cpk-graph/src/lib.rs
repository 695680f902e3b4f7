//! Local version-control graph for chainpack.
//!
//! The sync engine never parses commits or trees itself. It asks a
//! [`LocalRepository`] which objects are new since a given head, hands it
//! objects to store, and tells it where refs should point. This crate defines
//! that interface and [`MemoryRepository`], a self-contained implementation
//! with git-shaped commit and tree encodings used throughout the test suites.

pub mod error;
pub mod memory;
pub mod objects;
pub mod traits;

pub use error::{GraphError, GraphResult};
pub use memory::MemoryRepository;
pub use objects::{parse_commit, parse_tree, CommitInfo, TreeEntry, MODE_FILE, MODE_TREE};
pub use traits::{tracking_ref_name, LocalRepository};
