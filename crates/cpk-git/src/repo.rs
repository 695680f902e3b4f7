use std::collections::HashSet;
use std::path::Path;

use cpk_graph::{tracking_ref_name, GraphError, GraphResult, LocalRepository};
use cpk_pack::SourceObject;
use cpk_types::{ObjectKind, Oid, RawObject, RefName, RepoRef};
use git2::build::CheckoutBuilder;
use git2::{ErrorCode, ObjectType, Repository, Sort};
use tracing::{debug, info};

use crate::error::GitError;

const REFLOG_MESSAGE: &str = "cpk: sync";

/// A git repository on disk.
pub struct GitRepository {
    repo: Repository,
}

impl GitRepository {
    /// Open an existing repository at `path`.
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = Repository::open(path).map_err(|e| match e.code() {
            ErrorCode::NotFound => GitError::NotARepo(path.to_path_buf()),
            _ => GitError::Git(e),
        })?;
        Ok(Self { repo })
    }

    /// Create a repository with a working tree at `path`.
    pub fn init(path: &Path) -> Result<Self, GitError> {
        let repo = Repository::init(path)?;
        info!(path = %path.display(), "initialized repository");
        Ok(Self { repo })
    }

    pub fn init_bare(path: &Path) -> Result<Self, GitError> {
        let repo = Repository::init_bare(path)?;
        info!(path = %path.display(), "initialized bare repository");
        Ok(Self { repo })
    }

    pub fn from_repository(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn inner(&self) -> &Repository {
        &self.repo
    }

    pub fn is_bare(&self) -> bool {
        self.repo.is_bare()
    }

    fn read(&self, oid: git2::Oid) -> Result<Option<RawObject>, GitError> {
        let odb = self.repo.odb()?;
        let obj = match odb.read(oid) {
            Ok(obj) => obj,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let kind = from_git_kind(obj.kind())?;
        Ok(Some(RawObject::new(from_git(oid)?, kind, obj.data().to_vec())))
    }

    fn exists(&self, oid: git2::Oid) -> Result<bool, GitError> {
        Ok(self.repo.odb()?.exists(oid))
    }

    /// Record every tree and blob under `tree` in `seen`.
    fn mark_tree(&self, tree: git2::Oid, seen: &mut HashSet<git2::Oid>) -> Result<(), GitError> {
        let mut stack = vec![tree];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            for entry in self.repo.find_tree(id)?.iter() {
                match entry.kind() {
                    Some(ObjectType::Tree) => stack.push(entry.id()),
                    Some(ObjectType::Blob) => {
                        seen.insert(entry.id());
                    }
                    // Submodule links point outside this repository.
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Append trees and blobs under `tree` that are not in `seen`.
    fn collect_tree(
        &self,
        tree: git2::Oid,
        seen: &mut HashSet<git2::Oid>,
        out: &mut Vec<git2::Oid>,
    ) -> Result<(), GitError> {
        let mut stack = vec![tree];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            for entry in self.repo.find_tree(id)?.iter() {
                match entry.kind() {
                    Some(ObjectType::Tree) => stack.push(entry.id()),
                    Some(ObjectType::Blob) => {
                        if seen.insert(entry.id()) {
                            out.push(entry.id());
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn missing(&self, new: &Oid, old: Option<&Oid>) -> Result<Vec<SourceObject>, GitError> {
        let new = to_git(new)?;
        let old = match old {
            Some(old) => {
                let old = to_git(old)?;
                self.exists(old)?.then_some(old)
            }
            None => None,
        };

        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        walk.push(new)?;
        if let Some(old) = old {
            walk.hide(old)?;
        }
        let commits: Vec<git2::Oid> = walk.collect::<Result<_, _>>()?;
        let wanted: HashSet<git2::Oid> = commits.iter().copied().collect();

        // Trees of the boundary commits are already on the other side.
        let mut seen = HashSet::new();
        if let Some(old) = old {
            self.mark_tree(self.repo.find_commit(old)?.tree_id(), &mut seen)?;
        }
        for id in &commits {
            for parent in self.repo.find_commit(*id)?.parent_ids() {
                if !wanted.contains(&parent) && self.exists(parent)? {
                    self.mark_tree(self.repo.find_commit(parent)?.tree_id(), &mut seen)?;
                }
            }
        }

        let mut ids = Vec::new();
        for id in &commits {
            ids.push(*id);
            self.collect_tree(self.repo.find_commit(*id)?.tree_id(), &mut seen, &mut ids)?;
        }
        debug!(
            head = %new,
            commits = commits.len(),
            objects = ids.len(),
            "computed missing objects"
        );

        ids.into_iter()
            .map(|id| {
                self.read(id)?
                    .map(SourceObject::from)
                    .ok_or_else(|| {
                        GitError::Git(git2::Error::from_str(&format!("object {id} vanished")))
                    })
            })
            .collect()
    }

    fn write_objects(&mut self, objects: &[RawObject]) -> Result<(), GraphError> {
        for obj in objects {
            let computed = git2::Oid::hash_object(to_git_kind(obj.kind), &obj.data)
                .map_err(GitError::from)?;
            if computed.as_bytes() != obj.oid.as_bytes() {
                return Err(GraphError::CorruptObject {
                    oid: obj.oid.clone(),
                    reason: format!("content hashes to {computed}"),
                });
            }
        }
        let odb = self.repo.odb().map_err(GitError::from)?;
        let mut written = 0usize;
        for obj in objects {
            let id = to_git(&obj.oid)?;
            if odb.exists(id) {
                continue;
            }
            odb.write(to_git_kind(obj.kind), &obj.data).map_err(GitError::from)?;
            written += 1;
        }
        debug!(received = objects.len(), written, "applied objects");
        Ok(())
    }

    fn lookup_ref(&self, name: &str) -> Result<Option<Oid>, GitError> {
        match self.repo.find_reference(name) {
            Ok(reference) => reference.target().map(from_git).transpose(),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl LocalRepository for GitRepository {
    fn head(&self) -> GraphResult<Option<Oid>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(None)
            }
            Err(e) => return Err(GitError::from(e).into()),
        };
        let commit = head.peel_to_commit().map_err(GitError::from)?;
        Ok(Some(from_git(commit.id())?))
    }

    fn contains(&self, oid: &Oid) -> GraphResult<bool> {
        Ok(self.exists(to_git(oid)?)?)
    }

    fn read_object(&self, oid: &Oid) -> GraphResult<Option<RawObject>> {
        Ok(self.read(to_git(oid)?)?)
    }

    fn missing_objects(&self, new: &Oid, old: Option<&Oid>) -> GraphResult<Vec<SourceObject>> {
        if !self.contains(new)? {
            return Err(GraphError::MissingObject(new.clone()));
        }
        Ok(self.missing(new, old)?)
    }

    fn apply(&mut self, objects: &[RawObject]) -> GraphResult<()> {
        self.write_objects(objects)
    }

    fn set_head(&mut self, branch: &RefName, oid: &Oid) -> GraphResult<()> {
        let id = to_git(oid)?;
        if let Err(e) = self.repo.find_commit(id) {
            return Err(match e.code() {
                ErrorCode::NotFound => GraphError::MissingObject(oid.clone()),
                _ => GitError::from(e).into(),
            });
        }
        let name = format!("refs/heads/{branch}");
        self.repo
            .reference(&name, id, true, REFLOG_MESSAGE)
            .map_err(GitError::from)?;
        self.repo.set_head(&name).map_err(GitError::from)?;
        if !self.repo.is_bare() {
            self.repo
                .checkout_head(Some(CheckoutBuilder::new().force()))
                .map_err(GitError::from)?;
        }
        info!(branch = %branch, head = %oid.short_hex(), "moved head");
        Ok(())
    }

    fn set_tracking_ref(&mut self, remote: &RepoRef, oid: &Oid) -> GraphResult<()> {
        self.repo
            .reference(&tracking_ref_name(remote), to_git(oid)?, true, REFLOG_MESSAGE)
            .map_err(GitError::from)?;
        Ok(())
    }

    fn tracking_ref(&self, remote: &RepoRef) -> GraphResult<Option<Oid>> {
        Ok(self.lookup_ref(&tracking_ref_name(remote))?)
    }

    fn history(&self, head: &Oid) -> GraphResult<Vec<Oid>> {
        let mut walk = self.repo.revwalk().map_err(GitError::from)?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
            .map_err(GitError::from)?;
        walk.push(to_git(head)?).map_err(GitError::from)?;
        walk.map(|id| -> GraphResult<Oid> { Ok(from_git(id.map_err(GitError::from)?)?) })
            .collect()
    }
}

fn to_git(oid: &Oid) -> Result<git2::Oid, GitError> {
    git2::Oid::from_bytes(oid.as_bytes()).map_err(|_| GitError::InvalidOid(oid.to_hex()))
}

fn from_git(oid: git2::Oid) -> Result<Oid, GitError> {
    Oid::from_slice(oid.as_bytes()).map_err(|e| GitError::InvalidOid(e.to_string()))
}

fn from_git_kind(kind: ObjectType) -> Result<ObjectKind, GitError> {
    match kind {
        ObjectType::Commit => Ok(ObjectKind::Commit),
        ObjectType::Tree => Ok(ObjectKind::Tree),
        ObjectType::Blob => Ok(ObjectKind::Blob),
        ObjectType::Tag => Ok(ObjectKind::Tag),
        other => Err(GitError::UnsupportedObject(other.to_string())),
    }
}

fn to_git_kind(kind: ObjectKind) -> ObjectType {
    match kind {
        ObjectKind::Commit => ObjectType::Commit,
        ObjectKind::Tree => ObjectType::Tree,
        ObjectKind::Blob => ObjectType::Blob,
        ObjectKind::Tag => ObjectType::Tag,
    }
}
