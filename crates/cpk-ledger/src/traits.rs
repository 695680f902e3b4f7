use std::sync::Arc;

use cpk_crypto::{PublicKey, WrappedKey};
use cpk_types::{ObjectId, Oid, Principal, RefName, RepoName, Visibility};

use crate::error::LedgerResult;
use crate::records::{KeyGrant, PushRecord, Role};

/// Query boundary of the ledger.
pub trait LedgerReader: Send + Sync {
    fn is_registered(&self, repo: &RepoName) -> LedgerResult<bool>;

    /// Fails with `NotRegistered` for unknown repositories.
    fn visibility(&self, repo: &RepoName) -> LedgerResult<Visibility>;

    fn has_role(&self, repo: &RepoName, role: Role, principal: &Principal) -> LedgerResult<bool>;

    fn owner_count(&self, repo: &RepoName) -> LedgerResult<usize>;

    /// Current head of `repo:reference`, or `None` before the first push.
    fn head(&self, repo: &RepoName, reference: &RefName) -> LedgerResult<Option<Oid>>;

    fn push_record(&self, repo: &RepoName, head: &Oid) -> LedgerResult<Option<PushRecord>>;

    fn key_grant(&self, repo: &RepoName, principal: &Principal) -> LedgerResult<Option<KeyGrant>>;

    fn is_owner(&self, repo: &RepoName, principal: &Principal) -> LedgerResult<bool> {
        self.has_role(repo, Role::Owner, principal)
    }

    fn is_writer(&self, repo: &RepoName, principal: &Principal) -> LedgerResult<bool> {
        self.has_role(repo, Role::Writer, principal)
    }

    fn is_reader(&self, repo: &RepoName, principal: &Principal) -> LedgerResult<bool> {
        self.has_role(repo, Role::Reader, principal)
    }

    fn is_public(&self, repo: &RepoName) -> LedgerResult<bool> {
        Ok(self.visibility(repo)? == Visibility::Public)
    }

    fn is_private(&self, repo: &RepoName) -> LedgerResult<bool> {
        Ok(self.visibility(repo)?.is_private())
    }

    /// Pack digest recorded for the push that produced `head`.
    fn pack(&self, repo: &RepoName, head: &Oid) -> LedgerResult<Option<ObjectId>> {
        Ok(self.push_record(repo, head)?.map(|r| r.pack))
    }

    /// Head of the push preceding the one that produced `head`.
    fn previous_push_head(&self, repo: &RepoName, head: &Oid) -> LedgerResult<Option<Oid>> {
        Ok(self.push_record(repo, head)?.and_then(|r| r.previous))
    }

    fn public_key(
        &self,
        repo: &RepoName,
        principal: &Principal,
    ) -> LedgerResult<Option<PublicKey>> {
        Ok(self.key_grant(repo, principal)?.map(|g| g.public_key))
    }

    fn encrypted_key(
        &self,
        repo: &RepoName,
        principal: &Principal,
    ) -> LedgerResult<Option<WrappedKey>> {
        Ok(self.key_grant(repo, principal)?.map(|g| g.wrapped))
    }
}

/// Mutation boundary of the ledger. Every call names the acting principal
/// and is checked against that principal's roles.
pub trait LedgerWriter: Send + Sync {
    /// Create a repository owned by `caller`. Private repositories need the
    /// caller's key grant.
    fn register(
        &self,
        caller: &Principal,
        repo: &RepoName,
        visibility: Visibility,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()>;

    fn add_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()>;

    /// Revoke a role. Key grants are left in place.
    fn remove_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
    ) -> LedgerResult<()>;

    /// Record a push and move `reference` to `record.head`, provided the
    /// reference still points at `record.previous`.
    fn commit_push(
        &self,
        caller: &Principal,
        repo: &RepoName,
        reference: &RefName,
        record: PushRecord,
    ) -> LedgerResult<()>;

    fn add_owner(
        &self,
        caller: &Principal,
        repo: &RepoName,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.add_member(caller, repo, Role::Owner, principal, grant)
    }

    fn add_writer(
        &self,
        caller: &Principal,
        repo: &RepoName,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.add_member(caller, repo, Role::Writer, principal, grant)
    }

    fn add_reader(
        &self,
        caller: &Principal,
        repo: &RepoName,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.add_member(caller, repo, Role::Reader, principal, grant)
    }

    fn remove_owner(
        &self,
        caller: &Principal,
        repo: &RepoName,
        principal: &Principal,
    ) -> LedgerResult<()> {
        self.remove_member(caller, repo, Role::Owner, principal)
    }

    fn remove_writer(
        &self,
        caller: &Principal,
        repo: &RepoName,
        principal: &Principal,
    ) -> LedgerResult<()> {
        self.remove_member(caller, repo, Role::Writer, principal)
    }

    fn remove_reader(
        &self,
        caller: &Principal,
        repo: &RepoName,
        principal: &Principal,
    ) -> LedgerResult<()> {
        self.remove_member(caller, repo, Role::Reader, principal)
    }
}

impl<T: LedgerReader + ?Sized> LedgerReader for Arc<T> {
    fn is_registered(&self, repo: &RepoName) -> LedgerResult<bool> {
        (**self).is_registered(repo)
    }

    fn visibility(&self, repo: &RepoName) -> LedgerResult<Visibility> {
        (**self).visibility(repo)
    }

    fn has_role(&self, repo: &RepoName, role: Role, principal: &Principal) -> LedgerResult<bool> {
        (**self).has_role(repo, role, principal)
    }

    fn owner_count(&self, repo: &RepoName) -> LedgerResult<usize> {
        (**self).owner_count(repo)
    }

    fn head(&self, repo: &RepoName, reference: &RefName) -> LedgerResult<Option<Oid>> {
        (**self).head(repo, reference)
    }

    fn push_record(&self, repo: &RepoName, head: &Oid) -> LedgerResult<Option<PushRecord>> {
        (**self).push_record(repo, head)
    }

    fn key_grant(&self, repo: &RepoName, principal: &Principal) -> LedgerResult<Option<KeyGrant>> {
        (**self).key_grant(repo, principal)
    }
}

impl<T: LedgerWriter + ?Sized> LedgerWriter for Arc<T> {
    fn register(
        &self,
        caller: &Principal,
        repo: &RepoName,
        visibility: Visibility,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        (**self).register(caller, repo, visibility, grant)
    }

    fn add_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        (**self).add_member(caller, repo, role, principal, grant)
    }

    fn remove_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
    ) -> LedgerResult<()> {
        (**self).remove_member(caller, repo, role, principal)
    }

    fn commit_push(
        &self,
        caller: &Principal,
        repo: &RepoName,
        reference: &RefName,
        record: PushRecord,
    ) -> LedgerResult<()> {
        (**self).commit_push(caller, repo, reference, record)
    }
}

/// A complete ledger: both boundaries.
pub trait Ledger: LedgerReader + LedgerWriter {}

impl<T: LedgerReader + LedgerWriter> Ledger for T {}
