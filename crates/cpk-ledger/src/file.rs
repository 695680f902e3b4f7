use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use cpk_types::{Oid, Principal, RefName, RepoName, Visibility};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::records::{KeyGrant, PushRecord, Role};
use crate::state::LedgerState;
use crate::traits::{LedgerReader, LedgerWriter};

/// Ledger persisted as a single JSON document.
///
/// Every mutation reads the document, applies one transition, and atomically
/// replaces the file. A rejected transition never touches disk. Assumes one
/// writer at a time.
#[derive(Debug, Clone)]
pub struct FileLedger {
    path: PathBuf,
}

impl FileLedger {
    /// Open the ledger at `path`; the file is created on the first mutation.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(storage)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> LedgerResult<LedgerState> {
        match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| LedgerError::Storage(format!("{}: {e}", self.path.display()))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(LedgerState::default()),
            Err(e) => Err(storage(e)),
        }
    }

    fn save(&self, state: &LedgerState) -> LedgerResult<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(storage)?;
        serde_json::to_writer_pretty(&mut tmp, state)
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        tmp.write_all(b"\n").map_err(storage)?;
        tmp.persist(&self.path).map_err(|e| storage(e.error))?;
        debug!(path = %self.path.display(), "ledger saved");
        Ok(())
    }

    fn mutate<F>(&self, apply: F) -> LedgerResult<()>
    where
        F: FnOnce(&mut LedgerState) -> LedgerResult<()>,
    {
        let mut state = self.load()?;
        apply(&mut state)?;
        self.save(&state)
    }
}

fn storage(e: std::io::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

impl LedgerReader for FileLedger {
    fn is_registered(&self, repo: &RepoName) -> LedgerResult<bool> {
        Ok(self.load()?.is_registered(repo))
    }

    fn visibility(&self, repo: &RepoName) -> LedgerResult<Visibility> {
        self.load()?.visibility(repo)
    }

    fn has_role(&self, repo: &RepoName, role: Role, principal: &Principal) -> LedgerResult<bool> {
        self.load()?.has_role(repo, role, principal)
    }

    fn owner_count(&self, repo: &RepoName) -> LedgerResult<usize> {
        self.load()?.owner_count(repo)
    }

    fn head(&self, repo: &RepoName, reference: &RefName) -> LedgerResult<Option<Oid>> {
        self.load()?.head(repo, reference)
    }

    fn push_record(&self, repo: &RepoName, head: &Oid) -> LedgerResult<Option<PushRecord>> {
        self.load()?.push_record(repo, head)
    }

    fn key_grant(&self, repo: &RepoName, principal: &Principal) -> LedgerResult<Option<KeyGrant>> {
        self.load()?.key_grant(repo, principal)
    }
}

impl LedgerWriter for FileLedger {
    fn register(
        &self,
        caller: &Principal,
        repo: &RepoName,
        visibility: Visibility,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.mutate(|s| s.register(caller, repo, visibility, grant))
    }

    fn add_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
        grant: Option<KeyGrant>,
    ) -> LedgerResult<()> {
        self.mutate(|s| s.add_member(caller, repo, role, principal, grant))
    }

    fn remove_member(
        &self,
        caller: &Principal,
        repo: &RepoName,
        role: Role,
        principal: &Principal,
    ) -> LedgerResult<()> {
        self.mutate(|s| s.remove_member(caller, repo, role, principal))
    }

    fn commit_push(
        &self,
        caller: &Principal,
        repo: &RepoName,
        reference: &RefName,
        record: PushRecord,
    ) -> LedgerResult<()> {
        self.mutate(|s| s.commit_push(caller, repo, reference, record))
    }
}
