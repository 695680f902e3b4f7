//! Backward traversal of a reference's push chain.

use std::collections::HashSet;

use cpk_crypto::{decrypt_payload, ContentKey};
use cpk_graph::LocalRepository;
use cpk_ledger::{Ledger, PushRecord};
use cpk_store::ObjectStore;
use cpk_types::{Oid, RawObject, RepoName};
use tracing::debug;

use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};

/// One fetched and decoded push.
pub(crate) struct ChainLink {
    pub record: PushRecord,
    pub objects: Vec<RawObject>,
    pub bytes: u64,
}

impl<L: Ledger, S: ObjectStore> SyncEngine<L, S> {
    /// Fetch pushes from `head` backward until reaching one whose
    /// predecessor `local` already has, or the first push on the chain.
    ///
    /// Returns links newest first. Every pack is fetched, decrypted, and
    /// parsed before this returns, so a failure leaves `local` untouched.
    pub(crate) fn walk_chain<R: LocalRepository>(
        &self,
        local: &R,
        repo: &RepoName,
        head: &Oid,
        key: Option<&ContentKey>,
    ) -> SyncResult<Vec<ChainLink>> {
        let limit = self.config.max_chain_length;
        let mut visited = HashSet::new();
        let mut links = Vec::new();
        let mut cursor = head.clone();

        loop {
            if !visited.insert(cursor.clone()) {
                return Err(SyncError::CorruptChain(format!(
                    "push chain for {repo} revisits {cursor}"
                )));
            }
            if visited.len() > limit {
                return Err(SyncError::CorruptChain(format!(
                    "push chain for {repo} is longer than {limit} records"
                )));
            }

            let record = self
                .ledger_call("push_record", || self.ledger.push_record(repo, &cursor))?
                .ok_or_else(|| {
                    SyncError::CorruptChain(format!("no push record for {repo} at {cursor}"))
                })?;
            if record.head != cursor {
                return Err(SyncError::CorruptChain(format!(
                    "push record at {cursor} names head {}",
                    record.head
                )));
            }

            let stored = self.store_call("get", || self.store.get(&record.pack))?;
            let bytes = stored.len() as u64;
            let plain = match key {
                Some(key) => decrypt_payload(key, &stored)?,
                None => stored,
            };
            let objects = cpk_pack::parse(&plain).map_err(|source| SyncError::CorruptPack {
                pack: record.pack,
                source,
            })?;
            debug!(
                repo = %repo,
                head = %cursor.short_hex(),
                pack = %record.pack.short_hex(),
                objects = objects.len(),
                "fetched push record"
            );

            let next = match &record.previous {
                Some(prev) if !local.contains(prev)? => Some(prev.clone()),
                _ => None,
            };
            links.push(ChainLink {
                record,
                objects,
                bytes,
            });
            match next {
                Some(prev) => cursor = prev,
                None => break,
            }
        }
        Ok(links)
    }
}
