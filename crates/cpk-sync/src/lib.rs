//! Sync orchestration for chainpack.
//!
//! [`SyncEngine`] ties the pieces together:
//!
//! - **push**: ask the local repository for objects reachable from its head
//!   and not from the ledger's recorded head, pack them, seal them for
//!   private repositories, store the blob, and commit a push record that
//!   links back to the previous head.
//! - **pull / clone**: follow push records backward from the remote head
//!   until reaching history the local repository already has, then apply
//!   the packs oldest first.
//! - **membership**: registration and role changes, including wrapping the
//!   repository's content key for new members of private repositories.
//!
//! Every step is synchronous. Transient ledger and store failures are retried
//! with capped exponential backoff per [`RetryConfig`].

mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod retry;
pub mod types;

pub use config::{RetryConfig, SyncConfig};
pub use engine::SyncEngine;
pub use error::{ConfigError, SyncError, SyncResult};
pub use retry::{retry, Attempted, Backoff};
pub use types::{PullResult, PushResult, SyncStatus};
