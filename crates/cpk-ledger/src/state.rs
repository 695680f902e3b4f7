//! The ledger state machine shared by every backend.
//!
//! Each transition validates fully before touching state, so a returned
//! error always means nothing changed.

use std::collections::{BTreeMap, BTreeSet};

use cpk_types::{Oid, Principal, RefName, RepoName, Visibility};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::records::{KeyGrant, PushRecord, Role};

const PUSH_DENIED: &str = "Cannot push to a repo that you are not a writer or owner of";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub(crate) struct LedgerState {
    repos: BTreeMap<RepoName, RepoState>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct RepoState {
    visibility: Visibility,
    owners: BTreeSet<Principal>,
    writers: BTreeSet<Principal>,
    readers: BTreeSet<Principal>,
    keys: BTreeMap<Principal, KeyGrant>,
    refs: BTreeMap<RefName, Oid>,
    pushes: BTreeMap<Oid, PushRecord>,
}

impl RepoState {
    fn members(&self, role: Role) -> &BTreeSet<Principal> {
        match role {
            Role::Owner => &self.owners,
            Role::Writer => &self.writers,
            Role::Reader => &self.readers,
        }
    }

    fn members_mut(&mut self, role: Role) -> &mut BTreeSet<Principal> {
        match role {
            Role::Owner => &mut self.owners,
            Role::Writer => &mut self.writers,
            Role::Reader => &mut self.readers,
        }
    }
}

impl LedgerState {
    pub(crate) fn repo(&self, repo: &RepoName) -> LedgerResult<&RepoState> {
        self.repos
            .get(repo)
            .ok_or_else(|| LedgerError::NotRegistered(repo.clone()))
    }

    fn repo_mut(&mut self, repo: &RepoName) -> LedgerResult<&mut RepoState> {
        self.repos
            .get_mut(repo)
            .ok_or_else(|| LedgerError::NotRegistered(repo.clone()))
    }

    // ---- queries ----

    pub(crate) fn is_registered(&self, repo: &RepoName) -> bool {
        self.repos.contains_key(repo)
    }

    pub(crate) fn visibility(&self, repo: &RepoName) -> LedgerResult<Visibility> {
        Ok(self.repo(repo)?.visibility)
    }

    pub(crate) fn has_role(
        &self,
        repo: &RepoName,
        role: Role,
        who: &Principal,
    ) -> LedgerResult<bool> {
        Ok(self.repo(repo)?.members(role).contains(who))
    }

    pub(crate) fn owner_count(&self, repo: &RepoName) -> LedgerResult<usize> {
        Ok(self.repo(repo)?.owners.len())
    }

    pub(crate) fn head(&self, repo: &RepoName, reference: &RefName) -> LedgerResult<Option<Oid>> {
        Ok(self.repo(repo)?.refs.get(reference).cloned())
    }

    pub(crate) fn push_record(
        &self,
        repo: &RepoName,
        head: &Oid,
    ) -> LedgerResult<Option<PushRecord>> {
        Ok(self.repo(repo)?.pushes.get(head).cloned())
    }

    pub(crate) fn key_grant(
        &self,
        repo: &RepoName,
        who: &Principal,
    ) -> LedgerResult<Option<KeyGrant>> {
        Ok(self.repo(repo)?.keys.get(who).copied())
    }

    // ---- transitions ----

    pub(crate) fn register(
        &mut self,
        caller: &Principal,
        repo: &RepoName,
        visibility: Visibility,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        if self.repos.contains_key(repo) {
            return Err(LedgerError::AlreadyExists(repo.clone()));
        }
        let mut keys = BTreeMap::new();
        match (visibility, grant) {
            (Visibility::Private, Some(grant)) => {
                keys.insert(caller.clone(), grant);
            }
            (Visibility::Private, None) => return Err(LedgerError::MissingGrant(Role::Owner)),
            (Visibility::Public, Some(_)) => return Err(LedgerError::NotPrivate),
            (Visibility::Public, None) => {}
        }

        self.repos.insert(
            repo.clone(),
            RepoState {
                visibility,
                owners: BTreeSet::from([caller.clone()]),
                writers: BTreeSet::new(),
                readers: BTreeSet::new(),
                keys,
                refs: BTreeMap::new(),
                pushes: BTreeMap::new(),
            },
        );
        debug!(repo = %repo, owner = %caller, %visibility, "registered repository");
        Ok(())
    }

    pub(crate) fn add_member(
        &mut self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        let state = self.repo_mut(repo)?;
        if !state.owners.contains(caller) {
            return Err(LedgerError::Unauthorized(role.add_denied()));
        }
        match (state.visibility, grant) {
            (Visibility::Private, Some(grant)) => {
                state.keys.insert(principal.clone(), grant);
            }
            (Visibility::Private, None) => return Err(LedgerError::MissingGrant(role)),
            (Visibility::Public, _) if role == Role::Reader => return Err(LedgerError::NotPrivate),
            (Visibility::Public, Some(_)) => return Err(LedgerError::NotPrivate),
            (Visibility::Public, None) => {}
        }
        state.members_mut(role).insert(principal.clone());
        debug!(repo = %repo, %role, member = %principal, by = %caller, "added member");
        Ok(())
    }

    pub(crate) fn remove_member(
        &mut self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
    ) -> LedgerResult<()> {
        let state = self.repo_mut(repo)?;
        if !state.owners.contains(caller) {
            return Err(LedgerError::Unauthorized(role.remove_denied()));
        }
        if role == Role::Owner && state.owners.len() == 1 && state.owners.contains(principal) {
            return Err(LedgerError::LastOwner);
        }
        let removed = state.members_mut(role).remove(principal);
        debug!(repo = %repo, %role, member = %principal, by = %caller, removed, "removed member");
        Ok(())
    }

    pub(crate) fn commit_push(
        &mut self,
        caller: &Principal,
        repo: &RepoName,
        reference: &RefName,
        record: PushRecord,
    ) -> LedgerResult<()> {
        let state = self.repo_mut(repo)?;
        if !state.owners.contains(caller) && !state.writers.contains(caller) {
            return Err(LedgerError::Unauthorized(PUSH_DENIED.into()));
        }
        let current = state.refs.get(reference).cloned();
        if current != record.previous {
            return Err(LedgerError::StaleHead {
                reference: format!("{repo}:{reference}"),
                expected: record.previous,
                actual: current,
            });
        }

        let head = record.head.clone();
        // Records are immutable: the same head reached again keeps its
        // original pack and back-link.
        if !state.pushes.contains_key(&head) {
            debug!(
                repo = %repo,
                head = %head.short_hex(),
                pack = %record.pack.short_hex(),
                "new push record"
            );
            state.pushes.insert(head.clone(), record);
        }
        state.refs.insert(reference.clone(), head.clone());
        debug!(
            repo = %repo,
            reference = %reference,
            head = %head.short_hex(),
            by = %caller,
            "committed push"
        );
        Ok(())
    }
}
