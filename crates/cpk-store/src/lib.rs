//! Content-addressed blob storage for chainpack.
//!
//! Packs (plaintext or sealed) are stored as opaque byte blobs keyed by the
//! domain-separated BLAKE3 digest of their exact bytes. Identical bytes map
//! to the same key regardless of which repository produced them.
//!
//! # Storage Backends
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- one file per blob, named by hex digest
//!
//! # Design Rules
//!
//! 1. Blobs are immutable; there is no update or delete.
//! 2. `put` is idempotent.
//! 3. Reads re-hash the bytes; a mismatch is reported, never returned.
//! 4. The store never interprets blob contents.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use traits::{digest, ObjectStore};
