//! In-memory object graph.
//!
//! [`MemoryRepository`] stores git-shaped commits, trees, blobs, and tags
//! under 20-byte ids (truncated domain-separated BLAKE3 of a git-style
//! header plus payload). Constructed with [`MemoryRepository::packed`], it
//! hands out changed blobs as deltas against their previous version, the way
//! a repository with packfiles would.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use cpk_crypto::ContentHasher;
use cpk_pack::{encode_delta, SourceObject};
use cpk_types::{ObjectKind, Oid, RawObject, RefName, RepoRef};
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::objects::{encode_commit, encode_tree, parse_commit, parse_tree, CommitInfo, TreeEntry};
use crate::traits::{tracking_ref_name, LocalRepository};

/// Width of object ids in a memory repository.
pub const OID_LEN: usize = 20;

#[derive(Clone, Debug, Default)]
pub struct MemoryRepository {
    objects: HashMap<Oid, RawObject>,
    refs: BTreeMap<String, Oid>,
    /// Ref that HEAD points at, e.g. `refs/heads/master`.
    head_ref: Option<String>,
    packed: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository that serves changed blobs as deltas.
    pub fn packed() -> Self {
        Self {
            packed: true,
            ..Self::default()
        }
    }

    pub fn is_packed(&self) -> bool {
        self.packed
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn object_ids(&self) -> HashSet<Oid> {
        self.objects.keys().cloned().collect()
    }

    pub fn reference(&self, name: &str) -> Option<&Oid> {
        self.refs.get(name)
    }

    /// Ref HEAD points at, if any.
    pub fn head_ref(&self) -> Option<&str> {
        self.head_ref.as_deref()
    }

    pub fn object_id(kind: ObjectKind, data: &[u8]) -> Oid {
        let digest = ContentHasher::GRAPH.hash_object(kind.as_str(), data);
        // A 32-byte digest always truncates to a valid id.
        Oid::from_slice(&digest.as_bytes()[..OID_LEN]).unwrap_or_else(|_| unreachable!())
    }

    // ---------------------------------------------------------------
    // Object construction
    // ---------------------------------------------------------------

    pub fn write(&mut self, kind: ObjectKind, data: Vec<u8>) -> Oid {
        let oid = Self::object_id(kind, &data);
        self.objects
            .entry(oid.clone())
            .or_insert_with(|| RawObject::new(oid.clone(), kind, data));
        oid
    }

    pub fn blob(&mut self, data: &[u8]) -> Oid {
        self.write(ObjectKind::Blob, data.to_vec())
    }

    pub fn tree(&mut self, entries: &[TreeEntry]) -> Oid {
        self.write(ObjectKind::Tree, encode_tree(entries))
    }

    pub fn commit(&mut self, tree: &Oid, parents: &[Oid], message: &str) -> Oid {
        self.write(ObjectKind::Commit, encode_commit(tree, parents, message))
    }

    pub fn tag(&mut self, target: &Oid, name: &str) -> Oid {
        let body = format!("object {target}\ntype commit\ntag {name}\n");
        self.write(ObjectKind::Tag, body.into_bytes())
    }

    /// Build a tree from `path -> contents` (paths may contain `/`) and
    /// commit it on top of `parents`.
    pub fn commit_files(&mut self, parents: &[Oid], files: &[(&str, &[u8])], message: &str) -> Oid {
        let owned: Vec<(String, Vec<u8>)> = files
            .iter()
            .map(|(path, data)| (path.to_string(), data.to_vec()))
            .collect();
        let tree = self.build_tree(&owned);
        self.commit(&tree, parents, message)
    }

    fn build_tree(&mut self, files: &[(String, Vec<u8>)]) -> Oid {
        let mut dirs: BTreeMap<String, Vec<(String, Vec<u8>)>> = BTreeMap::new();
        let mut entries = Vec::new();
        for (path, data) in files {
            match path.split_once('/') {
                Some((dir, rest)) => dirs
                    .entry(dir.to_string())
                    .or_default()
                    .push((rest.to_string(), data.clone())),
                None => entries.push(TreeEntry::file(path.clone(), self.blob(data))),
            }
        }
        for (dir, children) in dirs {
            let sub = self.build_tree(&children);
            entries.push(TreeEntry::dir(dir, sub));
        }
        self.tree(&entries)
    }

    /// Commit `files` on top of `refs/heads/<branch>`, advance the branch,
    /// and check it out.
    pub fn commit_on(
        &mut self,
        branch: &str,
        files: &[(&str, &[u8])],
        message: &str,
    ) -> GraphResult<Oid> {
        let name = branch_ref(branch)?;
        let parents: Vec<Oid> = self.refs.get(&name).cloned().into_iter().collect();
        let oid = self.commit_files(&parents, files, message);
        self.refs.insert(name.clone(), oid.clone());
        self.head_ref = Some(name);
        Ok(oid)
    }

    /// Record a merge of `other` into `branch`.
    pub fn merge_on(
        &mut self,
        branch: &str,
        other: &Oid,
        files: &[(&str, &[u8])],
        message: &str,
    ) -> GraphResult<Oid> {
        let name = branch_ref(branch)?;
        let mut parents: Vec<Oid> = self.refs.get(&name).cloned().into_iter().collect();
        parents.push(other.clone());
        let oid = self.commit_files(&parents, files, message);
        self.refs.insert(name.clone(), oid.clone());
        self.head_ref = Some(name);
        Ok(oid)
    }

    /// Point a branch at a commit without checking it out.
    pub fn set_branch(&mut self, branch: &str, oid: &Oid) -> GraphResult<()> {
        let name = branch_ref(branch)?;
        self.refs.insert(name, oid.clone());
        Ok(())
    }

    // ---------------------------------------------------------------
    // Traversal
    // ---------------------------------------------------------------

    fn get(&self, oid: &Oid) -> GraphResult<&RawObject> {
        self.objects
            .get(oid)
            .ok_or_else(|| GraphError::MissingObject(oid.clone()))
    }

    fn commit_info(&self, oid: &Oid) -> GraphResult<CommitInfo> {
        let obj = self.get(oid)?;
        if obj.kind != ObjectKind::Commit {
            return Err(GraphError::UnexpectedKind {
                oid: oid.clone(),
                expected: "commit",
                actual: obj.kind.to_string(),
            });
        }
        parse_commit(oid, &obj.data)
    }

    /// Objects directly referenced by `obj`.
    fn references(&self, obj: &RawObject) -> GraphResult<Vec<Oid>> {
        Ok(match obj.kind {
            ObjectKind::Commit => {
                let info = parse_commit(&obj.oid, &obj.data)?;
                let mut out = vec![info.tree];
                out.extend(info.parents);
                out
            }
            ObjectKind::Tree => parse_tree(&obj.oid, &obj.data, OID_LEN)?
                .into_iter()
                .map(|e| e.oid)
                .collect(),
            ObjectKind::Tag => {
                let text = String::from_utf8_lossy(&obj.data);
                text.lines()
                    .find_map(|l| l.strip_prefix("object "))
                    .and_then(|hex| Oid::from_hex(hex).ok())
                    .into_iter()
                    .collect()
            }
            ObjectKind::Blob => Vec::new(),
        })
    }

    /// Breadth-first closure from `start`, skipping anything in `stop`.
    fn walk(&self, start: &Oid, stop: &HashSet<Oid>) -> GraphResult<Vec<RawObject>> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        let mut out = Vec::new();

        while let Some(oid) = queue.pop_front() {
            if stop.contains(&oid) || !visited.insert(oid.clone()) {
                continue;
            }
            let obj = self.get(&oid)?;
            for next in self.references(obj)? {
                if !visited.contains(&next) && !stop.contains(&next) {
                    queue.push_back(next);
                }
            }
            out.push(obj.clone());
        }
        Ok(out)
    }

    /// `path -> blob` for every file under `tree`.
    fn flatten_tree(&self, tree: &Oid) -> GraphResult<BTreeMap<String, Oid>> {
        let mut files = BTreeMap::new();
        let mut stack = vec![(String::new(), tree.clone())];
        while let Some((prefix, oid)) = stack.pop() {
            let obj = self.get(&oid)?;
            for entry in parse_tree(&oid, &obj.data, OID_LEN)? {
                let path = format!("{prefix}{}", entry.name);
                if entry.is_tree() {
                    stack.push((format!("{path}/"), entry.oid));
                } else {
                    files.insert(path, entry.oid);
                }
            }
        }
        Ok(files)
    }

    /// Pick delta bases for changed blobs: the blob at the same path in the
    /// first parent. Bases are never themselves deltas, so chains stay one
    /// deep and cannot cycle.
    fn delta_bases(&self, objects: &[RawObject]) -> GraphResult<HashMap<Oid, Oid>> {
        let blobs: HashSet<&Oid> = objects
            .iter()
            .filter(|o| o.kind == ObjectKind::Blob)
            .map(|o| &o.oid)
            .collect();
        let mut bases: HashMap<Oid, Oid> = HashMap::new();
        let mut used_as_base: HashSet<Oid> = HashSet::new();

        for commit in objects.iter().filter(|o| o.kind == ObjectKind::Commit) {
            let info = parse_commit(&commit.oid, &commit.data)?;
            let Some(parent) = info.parents.first() else {
                continue;
            };
            let Ok(parent_info) = self.commit_info(parent) else {
                continue;
            };
            let before = self.flatten_tree(&parent_info.tree)?;
            let after = self.flatten_tree(&info.tree)?;

            for (path, new_blob) in &after {
                let Some(old_blob) = before.get(path) else {
                    continue;
                };
                if old_blob == new_blob
                    || !blobs.contains(new_blob)
                    || bases.contains_key(new_blob)
                    || bases.contains_key(old_blob)
                    || used_as_base.contains(new_blob)
                {
                    continue;
                }
                bases.insert(new_blob.clone(), old_blob.clone());
                used_as_base.insert(old_blob.clone());
            }
        }
        Ok(bases)
    }
}

fn branch_ref(branch: &str) -> GraphResult<String> {
    let name = RefName::new(branch).map_err(|e| GraphError::InvalidRef(e.to_string()))?;
    Ok(format!("refs/heads/{name}"))
}

impl LocalRepository for MemoryRepository {
    fn head(&self) -> GraphResult<Option<Oid>> {
        Ok(self
            .head_ref
            .as_ref()
            .and_then(|name| self.refs.get(name))
            .cloned())
    }

    fn contains(&self, oid: &Oid) -> GraphResult<bool> {
        Ok(self.objects.contains_key(oid))
    }

    fn read_object(&self, oid: &Oid) -> GraphResult<Option<RawObject>> {
        Ok(self.objects.get(oid).cloned())
    }

    fn missing_objects(&self, new: &Oid, old: Option<&Oid>) -> GraphResult<Vec<SourceObject>> {
        let exclude = match old {
            Some(old) if self.objects.contains_key(old) => {
                self.walk(old, &HashSet::new())?
                    .into_iter()
                    .map(|o| o.oid)
                    .collect()
            }
            _ => HashSet::new(),
        };
        let objects = self.walk(new, &exclude)?;
        debug!(
            head = %new.short_hex(),
            excluded = exclude.len(),
            objects = objects.len(),
            "computed missing objects"
        );

        if !self.packed {
            return Ok(objects.into_iter().map(SourceObject::from).collect());
        }

        let bases = self.delta_bases(&objects)?;
        objects
            .into_iter()
            .map(|obj| match bases.get(&obj.oid) {
                Some(base_oid) => {
                    let base = self.get(base_oid)?;
                    let delta = encode_delta(&base.data, &obj.data);
                    Ok(SourceObject::delta(obj.oid, base_oid.clone(), delta))
                }
                None => Ok(SourceObject::from(obj)),
            })
            .collect()
    }

    fn apply(&mut self, objects: &[RawObject]) -> GraphResult<()> {
        for obj in objects {
            let computed = Self::object_id(obj.kind, &obj.data);
            if computed != obj.oid {
                return Err(GraphError::CorruptObject {
                    oid: obj.oid.clone(),
                    reason: format!("content hashes to {computed}"),
                });
            }
        }
        for obj in objects {
            self.objects
                .entry(obj.oid.clone())
                .or_insert_with(|| obj.clone());
        }
        Ok(())
    }

    fn set_head(&mut self, branch: &RefName, oid: &Oid) -> GraphResult<()> {
        self.commit_info(oid)?;
        let name = format!("refs/heads/{branch}");
        self.refs.insert(name.clone(), oid.clone());
        self.head_ref = Some(name);
        Ok(())
    }

    fn set_tracking_ref(&mut self, remote: &RepoRef, oid: &Oid) -> GraphResult<()> {
        self.refs.insert(tracking_ref_name(remote), oid.clone());
        Ok(())
    }

    fn tracking_ref(&self, remote: &RepoRef) -> GraphResult<Option<Oid>> {
        Ok(self.refs.get(&tracking_ref_name(remote)).cloned())
    }

    fn history(&self, head: &Oid) -> GraphResult<Vec<Oid>> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(head.clone(), false)];

        while let Some((oid, expanded)) = stack.pop() {
            if expanded {
                order.push(oid);
                continue;
            }
            if !visited.insert(oid.clone()) {
                continue;
            }
            let info = self.commit_info(&oid)?;
            stack.push((oid, true));
            for parent in info.parents.iter().rev() {
                if !visited.contains(parent) {
                    stack.push((parent.clone(), false));
                }
            }
        }
        Ok(order)
    }
}
