use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use cpk_types::{Oid, Principal, RefName, RepoName, Visibility};

use crate::error::{LedgerError, LedgerResult};
use crate::records::{KeyGrant, PushRecord, Role};
use crate::state::LedgerState;
use crate::traits::{LedgerReader, LedgerWriter};

/// In-memory ledger for tests, local demos, and embedding.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: RwLock<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.inner
            .read()
            .map_err(|_| LedgerError::Storage("ledger read lock poisoned".into()))
    }

    fn write(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.inner
            .write()
            .map_err(|_| LedgerError::Storage("ledger write lock poisoned".into()))
    }
}

impl LedgerReader for InMemoryLedger {
    fn is_registered(&self, repo: &RepoName) -> LedgerResult<bool> {
        Ok(self.read()?.is_registered(repo))
    }

    fn visibility(&self, repo: &RepoName) -> LedgerResult<Visibility> {
        self.read()?.visibility(repo)
    }

    fn has_role(&self, repo: &RepoName, role: Role, principal: &Principal) -> LedgerResult<bool> {
        self.read()?.has_role(repo, role, principal)
    }

    fn owner_count(&self, repo: &RepoName) -> LedgerResult<usize> {
        self.read()?.owner_count(repo)
    }

    fn head(&self, repo: &RepoName, reference: &RefName) -> LedgerResult<Option<Oid>> {
        self.read()?.head(repo, reference)
    }

    fn push_record(&self, repo: &RepoName, head: &Oid) -> LedgerResult<Option<PushRecord>> {
        self.read()?.push_record(repo, head)
    }

    fn key_grant(&self, repo: &RepoName, principal: &Principal) -> LedgerResult<Option<KeyGrant>> {
        self.read()?.key_grant(repo, principal)
    }
}

impl LedgerWriter for InMemoryLedger {
    fn register(
        &self,
        caller: &Principal,
        repo: &RepoName,
        visibility: Visibility,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.write()?.register(caller, repo, visibility, grant)
    }

    fn add_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.write()?.add_member(caller, repo, role, principal, grant)
    }

    fn remove_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
    ) -> LedgerResult<()> {
        self.write()?.remove_member(caller, repo, role, principal)
    }

    fn commit_push(
        &self,
        caller: &Principal,
        repo: &RepoName,
        reference: &RefName,
        record: PushRecord,
    ) -> LedgerResult<()> {
        self.write()?.commit_push(caller, repo, reference, record)
    }
}
