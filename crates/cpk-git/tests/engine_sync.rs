//! Push, clone, and pull through the sync engine between real git
//! repositories, with a file ledger and a directory object store.

use std::fs;
use std::io::Write;
use std::path::Path;

use cpk_crypto::PrivateKey;
use cpk_git::GitRepository;
use cpk_graph::LocalRepository;
use cpk_ledger::{FileLedger, LedgerReader};
use cpk_store::{FsObjectStore, ObjectStore};
use cpk_sync::{SyncEngine, SyncStatus};
use cpk_types::{Oid, Principal, RepoRef};
use git2::{Repository, Signature};
use tempfile::tempdir;

type Engine = SyncEngine<FileLedger, FsObjectStore>;

fn engine(state: &Path) -> Engine {
    SyncEngine::new(
        FileLedger::open(state.join("ledger.json")).unwrap(),
        FsObjectStore::open(state.join("blobs")).unwrap(),
    )
}

fn alice() -> Principal {
    Principal::new("alice")
}

fn target(s: &str) -> RepoRef {
    s.parse().unwrap()
}

fn init(path: &Path, bare: bool) -> Repository {
    let repo = if bare {
        Repository::init_bare(path).unwrap()
    } else {
        Repository::init(path).unwrap()
    };
    repo.set_head("refs/heads/master").unwrap();
    repo
}

fn commit(repo: &Repository, parents: &[git2::Oid], body: &str) -> git2::Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    let blob = repo.blob(body.as_bytes()).unwrap();
    builder.insert("notes.txt", blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let sig = Signature::now("Test", "test@example.com").unwrap();
    let parents: Vec<git2::Commit> =
        parents.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    let id = repo.commit(None, &sig, &sig, body, &tree, &parent_refs).unwrap();
    repo.reference("refs/heads/master", id, true, "test").unwrap();
    id
}

fn linear(repo: &Repository, bodies: &[&str]) -> Vec<git2::Oid> {
    let mut ids: Vec<git2::Oid> = Vec::new();
    for body in bodies {
        let parents: Vec<git2::Oid> = ids.last().copied().into_iter().collect();
        ids.push(commit(repo, &parents, body));
    }
    ids
}

/// Move every object reachable from HEAD into a packfile and delete the
/// loose copies, leaving the repository the way `git gc` would.
fn repack(repo: &Repository) {
    let mut walk = repo.revwalk().unwrap();
    walk.push_head().unwrap();
    let mut builder = repo.packbuilder().unwrap();
    builder.insert_walk(&mut walk).unwrap();
    let mut buf = git2::Buf::new();
    builder.write_buf(&mut buf).unwrap();

    let odb = repo.odb().unwrap();
    let mut writer = odb.packwriter().unwrap();
    writer.write_all(&buf).unwrap();
    writer.commit().unwrap();

    for entry in fs::read_dir(repo.path().join("objects")).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.len() == 2 && name.chars().all(|c| c.is_ascii_hexdigit()) {
            fs::remove_dir_all(entry.path()).unwrap();
        }
    }
}

fn loose_object_dirs(repo: &Repository) -> usize {
    fs::read_dir(repo.path().join("objects"))
        .unwrap()
        .filter(|e| e.as_ref().unwrap().file_name().len() == 2)
        .count()
}

fn oid(id: git2::Oid) -> Oid {
    Oid::from_slice(id.as_bytes()).unwrap()
}

fn notes_at(repo: &Repository, id: git2::Oid) -> String {
    let tree = repo.find_commit(id).unwrap().tree().unwrap();
    let entry = tree.get_name("notes.txt").unwrap();
    let blob = repo.find_blob(entry.id()).unwrap();
    String::from_utf8(blob.content().to_vec()).unwrap()
}

#[test]
fn bare_source_clones_and_pulls() {
    let state = tempdir().unwrap();
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    let engine = engine(state.path());
    let name = engine.register(&alice(), "proj", None).unwrap();
    let master = target("proj:tag");

    let git = init(src_dir.path(), true);
    let ids = linear(&git, &["A", "B", "C", "D"]);
    let mut source = GitRepository::open(src_dir.path()).unwrap();
    assert!(source.is_bare());
    let pushed = engine.push(&alice(), &mut source, &master, None).unwrap();
    assert_eq!(pushed.objects_sent, 12);

    let mut clone = GitRepository::init(dst_dir.path()).unwrap();
    let pulled = engine.clone_into(None, &mut clone, &master, None).unwrap();
    assert_eq!(pulled.head, oid(ids[3]));
    let expected: Vec<Oid> = ids.iter().copied().map(oid).collect();
    assert_eq!(clone.history(&pulled.head).unwrap(), expected);
    assert_eq!(
        fs::read_to_string(dst_dir.path().join("notes.txt")).unwrap(),
        "D"
    );

    let e = commit(&git, &[ids[3]], "E");
    let pushed = engine.push(&alice(), &mut source, &master, None).unwrap();
    assert_eq!(pushed.objects_sent, 3);
    assert_eq!(pushed.previous, Some(oid(ids[3])));

    let pulled = engine.pull(None, &mut clone, &master, None).unwrap();
    assert_eq!(pulled.status, SyncStatus::Updated);
    assert_eq!(pulled.head, oid(e));
    assert_eq!(clone.history(&oid(e)).unwrap().len(), 5);
    assert_eq!(
        engine.ledger().previous_push_head(&name, &oid(e)).unwrap(),
        Some(oid(ids[3]))
    );
    assert_eq!(engine.store().ids().unwrap().len(), 2);
}

#[test]
fn packed_source_pushes_after_repack() {
    let state = tempdir().unwrap();
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    let engine = engine(state.path());
    engine.register(&alice(), "proj", None).unwrap();
    let master = target("proj:master");

    let git = init(src_dir.path(), false);
    let ids = linear(&git, &["one", "two", "three"]);
    repack(&git);
    assert_eq!(loose_object_dirs(&git), 0);

    let mut source = GitRepository::open(src_dir.path()).unwrap();
    engine.push(&alice(), &mut source, &master, None).unwrap();

    let mut clone = GitRepository::init_bare(dst_dir.path()).unwrap();
    engine.clone_into(None, &mut clone, &master, None).unwrap();
    assert_eq!(clone.head().unwrap(), Some(oid(ids[2])));
    assert_eq!(notes_at(clone.inner(), ids[0]), "one");
    assert_eq!(notes_at(clone.inner(), ids[2]), "three");

    // A second round against a repacked source only ships the new commit.
    let four = commit(&git, &[ids[2]], "four");
    repack(&git);
    let mut source = GitRepository::open(src_dir.path()).unwrap();
    let pushed = engine.push(&alice(), &mut source, &master, None).unwrap();
    assert_eq!(pushed.objects_sent, 3);
    let pulled = engine.pull(None, &mut clone, &master, None).unwrap();
    assert_eq!(pulled.head, oid(four));
    assert_eq!(notes_at(clone.inner(), four), "four");
}

#[test]
fn merge_commits_survive_push_and_clone() {
    let state = tempdir().unwrap();
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    let engine = engine(state.path());
    engine.register(&alice(), "proj", None).unwrap();
    let master = target("proj:master");

    let git = init(src_dir.path(), false);
    let base = commit(&git, &[], "base");
    let left = commit(&git, &[base], "left");
    let right = commit(&git, &[base], "right");
    let merge = commit(&git, &[left, right], "merged");

    let mut source = GitRepository::open(src_dir.path()).unwrap();
    engine.push(&alice(), &mut source, &master, None).unwrap();

    let mut clone = GitRepository::init(dst_dir.path()).unwrap();
    let pulled = engine.clone_into(None, &mut clone, &master, None).unwrap();
    assert_eq!(pulled.head, oid(merge));

    let history = clone.history(&oid(merge)).unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history.first(), Some(&oid(base)));
    assert_eq!(history.last(), Some(&oid(merge)));
    let merged = clone.inner().find_commit(merge).unwrap();
    assert_eq!(merged.parent_ids().collect::<Vec<_>>(), vec![left, right]);
    assert_eq!(
        fs::read_to_string(dst_dir.path().join("notes.txt")).unwrap(),
        "merged"
    );
}

#[test]
fn private_repo_is_sealed_at_rest() {
    let state = tempdir().unwrap();
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    let engine = engine(state.path());
    let key = PrivateKey::generate();
    engine
        .register(&alice(), "vault", Some(&key.public()))
        .unwrap();
    let master = target("vault:master");

    let git = init(src_dir.path(), false);
    let ids = linear(&git, &["secret"]);
    let mut source = GitRepository::open(src_dir.path()).unwrap();
    let pushed = engine.push(&alice(), &mut source, &master, Some(&key)).unwrap();
    assert!(pushed.encrypted);

    let stored = engine.store().get(&pushed.pack.unwrap()).unwrap();
    assert!(cpk_pack::parse(&stored).is_err());

    let mut clone = GitRepository::init(dst_dir.path()).unwrap();
    engine
        .clone_into(Some(&alice()), &mut clone, &master, Some(&key))
        .unwrap();
    assert_eq!(notes_at(clone.inner(), ids[0]), "secret");
}
