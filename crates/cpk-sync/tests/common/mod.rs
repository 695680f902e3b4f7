//! Shared fixtures for sync integration tests: fault-injecting ledger and
//! store wrappers and a local repository whose tracking refs cannot move.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cpk_graph::{GraphError, GraphResult, LocalRepository, MemoryRepository};
use cpk_ledger::{
    InMemoryLedger, KeyGrant, LedgerError, LedgerReader, LedgerResult, LedgerWriter, PushRecord,
    Role,
};
use cpk_pack::SourceObject;
use cpk_store::{InMemoryObjectStore, ObjectStore, StoreError, StoreResult};
use cpk_sync::{RetryConfig, SyncConfig, SyncEngine};
use cpk_types::{ObjectId, Oid, Principal, RawObject, RefName, RepoName, RepoRef, Visibility};

pub type TestEngine = SyncEngine<Arc<FlakyLedger>, Arc<FlakyStore>>;

pub struct Harness {
    pub engine: TestEngine,
    pub ledger: Arc<FlakyLedger>,
    pub store: Arc<FlakyStore>,
}

pub fn harness() -> Harness {
    harness_with(SyncConfig {
        retry: RetryConfig::immediate(3),
        ..SyncConfig::default()
    })
}

pub fn harness_with(config: SyncConfig) -> Harness {
    let ledger = Arc::new(FlakyLedger::default());
    let store = Arc::new(FlakyStore::default());
    let engine = SyncEngine::with_config(Arc::clone(&ledger), Arc::clone(&store), config);
    Harness {
        engine,
        ledger,
        store,
    }
}

pub fn alice() -> Principal {
    Principal::new("alice")
}

pub fn bob() -> Principal {
    Principal::new("bob")
}

pub fn carol() -> Principal {
    Principal::new("carol")
}

pub fn repo(name: &str) -> RepoName {
    RepoName::new(name).unwrap()
}

pub fn target(s: &str) -> RepoRef {
    RepoRef::parse(s).unwrap()
}

/// Commit one file per call on `master`.
pub fn commit(local: &mut MemoryRepository, label: &str) -> Oid {
    let body = format!("contents of {label}\n");
    local
        .commit_on("master", &[("file.txt", body.as_bytes())], label)
        .unwrap()
}

// ---------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------

/// In-memory ledger that can fail, misreport, or race on demand.
#[derive(Default)]
pub struct FlakyLedger {
    pub inner: InMemoryLedger,
    /// `commit_push` calls that fail with a transport error.
    pub failing_commits: AtomicU32,
    /// Apply the push before reporting the injected failure.
    pub land_before_failing: std::sync::atomic::AtomicBool,
    pub commit_calls: AtomicU32,
    /// Push record responses that replace the real ones.
    pub record_overrides: Mutex<HashMap<Oid, PushRecord>>,
    /// A push another client lands just before our next `commit_push`.
    pub interloper: Mutex<Option<(Principal, RepoRef, PushRecord)>>,
}

impl FlakyLedger {
    pub fn fail_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    pub fn override_record(&self, record: PushRecord) {
        self.record_overrides
            .lock()
            .unwrap()
            .insert(record.head.clone(), record);
    }
}

impl LedgerReader for FlakyLedger {
    fn is_registered(&self, repo: &RepoName) -> LedgerResult<bool> {
        self.inner.is_registered(repo)
    }

    fn visibility(&self, repo: &RepoName) -> LedgerResult<Visibility> {
        self.inner.visibility(repo)
    }

    fn has_role(&self, repo: &RepoName, role: Role, principal: &Principal) -> LedgerResult<bool> {
        self.inner.has_role(repo, role, principal)
    }

    fn owner_count(&self, repo: &RepoName) -> LedgerResult<usize> {
        self.inner.owner_count(repo)
    }

    fn head(&self, repo: &RepoName, reference: &RefName) -> LedgerResult<Option<Oid>> {
        self.inner.head(repo, reference)
    }

    fn push_record(&self, repo: &RepoName, head: &Oid) -> LedgerResult<Option<PushRecord>> {
        if let Some(record) = self.record_overrides.lock().unwrap().get(head) {
            return Ok(Some(record.clone()));
        }
        self.inner.push_record(repo, head)
    }

    fn key_grant(&self, repo: &RepoName, principal: &Principal) -> LedgerResult<Option<KeyGrant>> {
        self.inner.key_grant(repo, principal)
    }
}

impl LedgerWriter for FlakyLedger {
    fn register(
        &self,
        caller: &Principal,
        repo: &RepoName,
        visibility: Visibility,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.inner.register(caller, repo, visibility, grant)
    }

    fn add_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.inner.add_member(caller, repo, role, principal, grant)
    }

    fn remove_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
    ) -> LedgerResult<()> {
        self.inner.remove_member(caller, repo, role, principal)
    }

    fn commit_push(
        &self,
        caller: &Principal,
        repo: &RepoName,
        reference: &RefName,
        record: PushRecord,
    ) -> LedgerResult<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some((who, at, theirs)) = self.interloper.lock().unwrap().take() {
            self.inner.commit_push(&who, &at.repo, &at.name, theirs)?;
        }
        let remaining = self.failing_commits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_commits.store(remaining - 1, Ordering::SeqCst);
            if self.land_before_failing.load(Ordering::SeqCst) {
                self.inner.commit_push(caller, repo, reference, record)?;
            }
            return Err(LedgerError::Transport("connection reset".into()));
        }
        self.inner.commit_push(caller, repo, reference, record)
    }
}

// ---------------------------------------------------------------
// Store
// ---------------------------------------------------------------

#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryObjectStore,
    pub failing_puts: AtomicU32,
    pub puts: AtomicUsize,
    pub gets: AtomicUsize,
}

impl FlakyStore {
    pub fn accesses(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.gets.load(Ordering::SeqCst)
    }
}

impl ObjectStore for FlakyStore {
    fn put(&self, data: &[u8]) -> StoreResult<ObjectId> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failing_puts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_puts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("bucket throttled".into()));
        }
        self.inner.put(data)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id)
    }

    fn contains(&self, id: &ObjectId) -> StoreResult<bool> {
        self.inner.contains(id)
    }
}

// ---------------------------------------------------------------
// Local repository
// ---------------------------------------------------------------

/// A repository whose tracking refs can never be written.
pub struct ReadOnlyRefs(pub MemoryRepository);

impl LocalRepository for ReadOnlyRefs {
    fn head(&self) -> GraphResult<Option<Oid>> {
        self.0.head()
    }

    fn contains(&self, oid: &Oid) -> GraphResult<bool> {
        self.0.contains(oid)
    }

    fn read_object(&self, oid: &Oid) -> GraphResult<Option<RawObject>> {
        self.0.read_object(oid)
    }

    fn missing_objects(&self, new: &Oid, old: Option<&Oid>) -> GraphResult<Vec<SourceObject>> {
        self.0.missing_objects(new, old)
    }

    fn apply(&mut self, objects: &[RawObject]) -> GraphResult<()> {
        self.0.apply(objects)
    }

    fn set_head(&mut self, branch: &RefName, oid: &Oid) -> GraphResult<()> {
        self.0.set_head(branch, oid)
    }

    fn set_tracking_ref(&mut self, _remote: &RepoRef, _oid: &Oid) -> GraphResult<()> {
        Err(GraphError::Backend("refs are read-only".into()))
    }

    fn tracking_ref(&self, remote: &RepoRef) -> GraphResult<Option<Oid>> {
        self.0.tracking_ref(remote)
    }

    fn history(&self, head: &Oid) -> GraphResult<Vec<Oid>> {
        self.0.history(head)
    }
}
