//! Ledger adapter for chainpack.
//!
//! The ledger is the durable, access-controlled record of which repositories
//! exist, who may do what to them, where each reference points, and the
//! chain of pushes that got it there. It is consulted through two narrow
//! synchronous traits:
//!
//! - [`LedgerReader`] -- registry, role, head, push-record, and key queries
//! - [`LedgerWriter`] -- registration, membership changes, and `commit_push`
//!
//! Every mutation is a single all-or-nothing transition that re-checks the
//! caller's role; a rejected call leaves the ledger untouched.
//!
//! # Backends
//!
//! - [`InMemoryLedger`] -- lock-guarded state for tests and embedding
//! - [`FileLedger`] -- the same state machine persisted as a JSON document

pub mod error;
pub mod file;
pub mod memory;
pub mod records;
mod state;
pub mod traits;

pub use error::{LedgerError, LedgerResult};
pub use file::FileLedger;
pub use memory::InMemoryLedger;
pub use records::{KeyGrant, PushRecord, Role};
pub use traits::{Ledger, LedgerReader, LedgerWriter};
