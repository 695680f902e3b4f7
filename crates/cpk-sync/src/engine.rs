use cpk_crypto::{
    encrypt_payload, generate_content_key, unwrap, wrap, ContentKey, CryptoError, PrivateKey,
    PublicKey, WrappedKey,
};
use cpk_graph::{GraphError, LocalRepository};
use cpk_ledger::{KeyGrant, Ledger, LedgerError, LedgerResult, PushRecord, Role};
use cpk_pack::PackWriter;
use cpk_store::{ObjectStore, StoreError, StoreResult};
use cpk_types::{Oid, Principal, RepoName, RepoRef, Visibility};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::retry::{retry, Attempted};
use crate::types::{PullResult, PushResult, SyncStatus};

const PUSH_DENIED: &str = "Cannot push to a repo that you are not a writer or owner of";
const PULL_DENIED: &str = "Cannot pull from a private repo that you are not a member of";

/// Coordinates a ledger and an object store to move history between local
/// repositories.
///
/// The engine holds no per-repository state; every call names the acting
/// principal and the local repository it works on.
pub struct SyncEngine<L, S> {
    pub(crate) ledger: L,
    pub(crate) store: S,
    pub(crate) config: SyncConfig,
}

impl<L: Ledger, S: ObjectStore> SyncEngine<L, S> {
    pub fn new(ledger: L, store: S) -> Self {
        Self::with_config(ledger, store, SyncConfig::default())
    }

    pub fn with_config(ledger: L, store: S, config: SyncConfig) -> Self {
        Self {
            ledger,
            store,
            config,
        }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ---------------------------------------------------------------
    // Registry and membership
    // ---------------------------------------------------------------

    /// Register `repo` with `caller` as its sole owner.
    ///
    /// Supplying the caller's public key makes the repository private: a
    /// fresh content key is generated and wrapped for that key.
    pub fn register(
        &self,
        caller: &Principal,
        repo: &str,
        public_key: Option<&PublicKey>,
    ) -> SyncResult<RepoName> {
        let name = RepoName::new(repo)?;
        if self.ledger_call("is_registered", || self.ledger.is_registered(&name))? {
            return Err(SyncError::AlreadyExists(name));
        }

        let grant = match public_key {
            Some(pk) => {
                let key = generate_content_key();
                Some(KeyGrant {
                    wrapped: wrap(&key, pk)?,
                    public_key: *pk,
                })
            }
            None => None,
        };
        let visibility = if grant.is_some() {
            Visibility::Private
        } else {
            Visibility::Public
        };

        self.ledger_call("register", || {
            self.ledger.register(caller, &name, visibility, grant)
        })?;
        info!(repo = %name, owner = %caller, %visibility, "registered repository");
        Ok(name)
    }

    /// Grant `role` on `repo` to `principal`.
    ///
    /// For private repositories the caller's private key and the new
    /// member's public key are both required: the caller's copy of the
    /// content key is unwrapped and rewrapped for the new member.
    pub fn add_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
        caller_key: Option<&PrivateKey>,
        member_key: Option<&PublicKey>,
    ) -> SyncResult<()> {
        self.ensure_registered(repo)?;
        if !self.ledger_call("is_owner", || self.ledger.is_owner(repo, caller))? {
            return Err(SyncError::Authorization(role.add_denied()));
        }

        let private = self.ledger_call("is_private", || self.ledger.is_private(repo))?;
        let grant = if private {
            let (Some(caller_key), Some(member_key)) = (caller_key, member_key) else {
                return Err(SyncError::MissingKeyMaterial(format!(
                    "Public and private key is required to add {role} to private repo"
                )));
            };
            let key = self.content_key(caller, repo, Some(caller_key))?;
            Some(KeyGrant {
                wrapped: wrap(&key, member_key)?,
                public_key: *member_key,
            })
        } else {
            if role == Role::Reader {
                return Err(LedgerError::NotPrivate.into());
            }
            if caller_key.is_some() || member_key.is_some() {
                warn!(repo = %repo, "ignoring key material for public repository");
            }
            None
        };

        self.ledger_call("add_member", || {
            self.ledger.add_member(caller, repo, role, principal, grant)
        })?;
        info!(repo = %repo, %role, member = %principal, by = %caller, "added member");
        Ok(())
    }

    /// Revoke `role` on `repo` from `principal`.
    ///
    /// The principal's wrapped copy of a private repository's content key
    /// stays on record and the content key is not rotated.
    pub fn remove_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
    ) -> SyncResult<()> {
        self.ensure_registered(repo)?;
        if !self.ledger_call("is_owner", || self.ledger.is_owner(repo, caller))? {
            return Err(SyncError::Authorization(role.remove_denied()));
        }
        if role == Role::Owner
            && self.ledger_call("is_owner", || self.ledger.is_owner(repo, principal))?
            && self.ledger_call("owner_count", || self.ledger.owner_count(repo))? <= 1
        {
            return Err(LedgerError::LastOwner.into());
        }

        self.ledger_call("remove_member", || {
            self.ledger.remove_member(caller, repo, role, principal)
        })?;
        info!(repo = %repo, %role, member = %principal, by = %caller, "removed member");
        Ok(())
    }

    /// Current head of `repo:ref` on the ledger.
    pub fn head(&self, target: &RepoRef) -> SyncResult<Option<Oid>> {
        self.ensure_registered(&target.repo)?;
        self.ledger_call("head", || self.ledger.head(&target.repo, &target.name))
    }

    // ---------------------------------------------------------------
    // Push
    // ---------------------------------------------------------------

    /// Publish the local head to `target`.
    pub fn push<R: LocalRepository>(
        &self,
        caller: &Principal,
        local: &mut R,
        target: &RepoRef,
        private_key: Option<&PrivateKey>,
    ) -> SyncResult<PushResult> {
        let repo = &target.repo;
        self.ensure_registered(repo)?;
        let allowed = self.ledger_call("is_owner", || self.ledger.is_owner(repo, caller))?
            || self.ledger_call("is_writer", || self.ledger.is_writer(repo, caller))?;
        if !allowed {
            return Err(SyncError::Authorization(PUSH_DENIED.to_string()));
        }

        let key = if self.ledger_call("is_private", || self.ledger.is_private(repo))? {
            Some(self.content_key(caller, repo, private_key)?)
        } else {
            None
        };

        let head = local.head()?.ok_or_else(|| {
            SyncError::InvariantViolation("local repository has no commits to push".into())
        })?;
        let previous = self.ledger_call("head", || self.ledger.head(repo, &target.name))?;
        if previous.as_ref() == Some(&head) {
            debug!(remote = %target, head = %head.short_hex(), "remote already at local head");
            local.set_tracking_ref(target, &head)?;
            return Ok(PushResult::up_to_date(head));
        }

        // A recorded head we have never seen excludes nothing.
        let base = match &previous {
            Some(prev) if local.contains(prev)? => Some(prev),
            _ => None,
        };
        let sources = local.missing_objects(&head, base)?;
        let objects_sent = sources.len();
        let mut writer = PackWriter::new();
        for source in sources {
            writer.add_source(source);
        }
        let pack = writer
            .finish_with_bases(|oid| local.read_object(oid).ok().flatten())
            .map_err(|e| GraphError::Backend(format!("could not pack local objects: {e}")))?;

        let payload = match &key {
            Some(key) => encrypt_payload(key, &pack)?,
            None => pack,
        };
        let bytes_transferred = payload.len() as u64;
        let digest = self.store_call("put", || self.store.put(&payload))?;
        debug!(
            remote = %target,
            pack = %digest.short_hex(),
            objects = objects_sent,
            bytes = bytes_transferred,
            "stored pack"
        );

        let record = PushRecord {
            head: head.clone(),
            pack: digest,
            previous: previous.clone(),
        };
        self.commit_push(caller, target, record)?;

        local
            .set_tracking_ref(target, &head)
            .map_err(SyncError::RemoteAdvanced)?;
        info!(
            remote = %target,
            head = %head.short_hex(),
            previous = ?previous.as_ref().map(|p| p.short_hex()),
            objects = objects_sent,
            "pushed"
        );

        Ok(PushResult {
            status: SyncStatus::Updated,
            head,
            previous,
            pack: Some(digest),
            objects_sent,
            bytes_transferred,
            encrypted: key.is_some(),
        })
    }

    /// Commit a push record, retrying transport failures.
    ///
    /// A retry rejected as stale while the ledger already shows our head
    /// means an earlier attempt landed.
    fn commit_push(
        &self,
        caller: &Principal,
        target: &RepoRef,
        record: PushRecord,
    ) -> SyncResult<()> {
        let head = record.head.clone();
        let result = retry(
            &self.config.retry,
            "commit_push",
            || {
                self.ledger
                    .commit_push(caller, &target.repo, &target.name, record.clone())
            },
            LedgerError::is_transient,
        );
        match result {
            Ok(()) => Ok(()),
            Err(Attempted {
                error: LedgerError::StaleHead { actual, .. },
                attempts,
            }) if attempts > 1 && actual.as_ref() == Some(&head) => {
                debug!(remote = %target, attempts, "push landed on an earlier attempt");
                Ok(())
            }
            Err(failed) => Err(ledger_failure(failed)),
        }
    }

    // ---------------------------------------------------------------
    // Pull and clone
    // ---------------------------------------------------------------

    /// Bring `local` up to the head of `source`.
    ///
    /// Private repositories need the caller and the caller's private key.
    pub fn pull<R: LocalRepository>(
        &self,
        caller: Option<&Principal>,
        local: &mut R,
        source: &RepoRef,
        private_key: Option<&PrivateKey>,
    ) -> SyncResult<PullResult> {
        let repo = &source.repo;
        self.ensure_registered(repo)?;
        let head = self
            .ledger_call("head", || self.ledger.head(repo, &source.name))?
            .ok_or_else(|| SyncError::NotRegistered(source.to_string()))?;

        let key = if self.ledger_call("is_private", || self.ledger.is_private(repo))? {
            let caller = caller.ok_or_else(|| {
                SyncError::MissingKeyMaterial(format!(
                    "a principal is required to pull private repo {repo}"
                ))
            })?;
            let (wrapped, private_key) = self.wrapped_key(caller, repo, private_key)?;
            if !self.is_member(repo, caller)? {
                return Err(SyncError::Authorization(PULL_DENIED.to_string()));
            }
            Some(unwrap(&wrapped, private_key)?)
        } else {
            None
        };

        if local.head()?.as_ref() == Some(&head) {
            debug!(source = %source, head = %head.short_hex(), "local already at remote head");
            local.set_tracking_ref(source, &head)?;
            return Ok(PullResult::up_to_date(head));
        }
        if local.contains(&head)? {
            // Local history is ahead of or beside the remote; leave the
            // branch where it is.
            debug!(
                source = %source,
                head = %head.short_hex(),
                "remote head already present locally"
            );
            local.set_tracking_ref(source, &head)?;
            return Ok(PullResult::up_to_date(head));
        }

        let links = self.walk_chain(local, repo, &head, key.as_ref())?;
        let mut objects_received = 0;
        let mut bytes_transferred = 0;
        for link in links.iter().rev() {
            local.apply(&link.objects)?;
            objects_received += link.objects.len();
            bytes_transferred += link.bytes;
        }
        local.set_head(&self.config.local_branch, &head)?;
        local.set_tracking_ref(source, &head)?;
        info!(
            source = %source,
            head = %head.short_hex(),
            records = links.len(),
            objects = objects_received,
            "pulled"
        );

        Ok(PullResult {
            status: SyncStatus::Updated,
            head,
            records: links.into_iter().map(|l| l.record.head).collect(),
            objects_received,
            bytes_transferred,
        })
    }

    /// Pull `source` into an empty local repository.
    pub fn clone_into<R: LocalRepository>(
        &self,
        caller: Option<&Principal>,
        local: &mut R,
        source: &RepoRef,
        private_key: Option<&PrivateKey>,
    ) -> SyncResult<PullResult> {
        if local.head()?.is_some() {
            return Err(SyncError::InvariantViolation(
                "clone target already has commits".into(),
            ));
        }
        self.pull(caller, local, source, private_key)
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    fn ensure_registered(&self, repo: &RepoName) -> SyncResult<()> {
        if self.ledger_call("is_registered", || self.ledger.is_registered(repo))? {
            Ok(())
        } else {
            Err(SyncError::NotRegistered(repo.to_string()))
        }
    }

    fn is_member(&self, repo: &RepoName, principal: &Principal) -> SyncResult<bool> {
        Ok(self.ledger_call("is_owner", || self.ledger.is_owner(repo, principal))?
            || self.ledger_call("is_writer", || self.ledger.is_writer(repo, principal))?
            || self.ledger_call("is_reader", || self.ledger.is_reader(repo, principal))?)
    }

    /// Unwrap `caller`'s copy of the content key of private `repo`.
    fn content_key(
        &self,
        caller: &Principal,
        repo: &RepoName,
        private_key: Option<&PrivateKey>,
    ) -> SyncResult<ContentKey> {
        let (wrapped, private_key) = self.wrapped_key(caller, repo, private_key)?;
        Ok(unwrap(&wrapped, private_key)?)
    }

    /// `caller`'s wrapped copy of the content key, paired with the private
    /// key that should open it.
    fn wrapped_key<'k>(
        &self,
        caller: &Principal,
        repo: &RepoName,
        private_key: Option<&'k PrivateKey>,
    ) -> SyncResult<(WrappedKey, &'k PrivateKey)> {
        let private_key = private_key.ok_or_else(|| {
            SyncError::MissingKeyMaterial(format!(
                "a private key is required for private repo {repo}"
            ))
        })?;
        let wrapped = self
            .ledger_call("encrypted_key", || self.ledger.encrypted_key(repo, caller))?
            .ok_or_else(|| CryptoError::NoWrappedKey(format!("{caller} in {repo}")))?;
        Ok((wrapped, private_key))
    }

    pub(crate) fn ledger_call<T>(
        &self,
        op: &str,
        call: impl FnMut() -> LedgerResult<T>,
    ) -> SyncResult<T> {
        retry(&self.config.retry, op, call, LedgerError::is_transient).map_err(ledger_failure)
    }

    pub(crate) fn store_call<T>(
        &self,
        op: &str,
        call: impl FnMut() -> StoreResult<T>,
    ) -> SyncResult<T> {
        retry(&self.config.retry, op, call, StoreError::is_transient).map_err(
            |Attempted { error, attempts }| {
                if error.is_transient() {
                    SyncError::Transport {
                        attempts,
                        message: error.to_string(),
                    }
                } else {
                    SyncError::Store(error)
                }
            },
        )
    }
}

fn ledger_failure(failed: Attempted<LedgerError>) -> SyncError {
    match failed.error {
        LedgerError::Transport(message) => SyncError::Transport {
            attempts: failed.attempts,
            message,
        },
        other => other.into(),
    }
}
