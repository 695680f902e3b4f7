//! GitRepository against real libgit2 repositories in temp directories.

use std::path::Path;

use cpk_git::GitRepository;
use cpk_graph::{GraphError, LocalRepository};
use cpk_pack::PackWriter;
use cpk_types::{ObjectKind, Oid, RawObject, RefName, RepoRef};
use git2::{Repository, Signature};
use tempfile::tempdir;

fn init(path: &Path) -> Repository {
    let repo = Repository::init(path).expect("Failed to init git repo");
    repo.set_head("refs/heads/master").unwrap();
    repo
}

/// Commit `files` with explicit parents and point master at the result.
fn commit(
    repo: &Repository,
    parents: &[git2::Oid],
    files: &[(&str, &str)],
    msg: &str,
) -> git2::Oid {
    let mut builder = repo.treebuilder(None).unwrap();
    for (name, body) in files {
        let blob = repo.blob(body.as_bytes()).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
    }
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();
    let sig = Signature::now("Test", "test@example.com").unwrap();
    let parents: Vec<git2::Commit> =
        parents.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
    let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
    let id = repo.commit(None, &sig, &sig, msg, &tree, &parent_refs).unwrap();
    repo.reference("refs/heads/master", id, true, "test").unwrap();
    id
}

fn oid(id: git2::Oid) -> Oid {
    Oid::from_slice(id.as_bytes()).unwrap()
}

fn transfer(from: &GitRepository, to: &mut GitRepository, new: &Oid, old: Option<&Oid>) {
    let mut writer = PackWriter::new();
    for src in from.missing_objects(new, old).unwrap() {
        writer.add_source(src);
    }
    let bytes = writer.finish().unwrap();
    to.apply(&cpk_pack::parse(&bytes).unwrap()).unwrap();
}

#[test]
fn empty_repository_has_no_head() {
    let dir = tempdir().unwrap();
    init(dir.path());
    let repo = GitRepository::open(dir.path()).unwrap();
    assert_eq!(repo.head().unwrap(), None);
}

#[test]
fn open_rejects_plain_directory() {
    let dir = tempdir().unwrap();
    assert!(GitRepository::open(&dir.path().join("nope")).is_err());
}

#[test]
fn head_follows_master() {
    let dir = tempdir().unwrap();
    let git = init(dir.path());
    let first = commit(&git, &[], &[("a.txt", "one")], "first");
    let repo = GitRepository::open(dir.path()).unwrap();
    assert_eq!(repo.head().unwrap(), Some(oid(first)));
}

#[test]
fn full_history_is_commit_tree_blob() {
    let dir = tempdir().unwrap();
    let git = init(dir.path());
    let first = commit(&git, &[], &[("a.txt", "one")], "first");
    let repo = GitRepository::open(dir.path()).unwrap();

    let objects = repo.missing_objects(&oid(first), None).unwrap();
    assert_eq!(objects.len(), 3);
}

#[test]
fn incremental_skips_unchanged_blobs() {
    let dir = tempdir().unwrap();
    let git = init(dir.path());
    let first = commit(&git, &[], &[("a.txt", "A"), ("b.txt", "B")], "first");
    let second = commit(&git, &[first], &[("a.txt", "A"), ("b.txt", "B2")], "second");
    let repo = GitRepository::open(dir.path()).unwrap();

    let objects = repo
        .missing_objects(&oid(second), Some(&oid(first)))
        .unwrap();
    // commit, root tree, changed blob
    assert_eq!(objects.len(), 3);
    assert!(objects.iter().all(|o| o.oid != oid(first)));
}

#[test]
fn unknown_head_is_missing_object() {
    let dir = tempdir().unwrap();
    init(dir.path());
    let repo = GitRepository::open(dir.path()).unwrap();
    let stranger = Oid::from_slice(&[7; 20]).unwrap();
    assert!(matches!(
        repo.missing_objects(&stranger, None),
        Err(GraphError::MissingObject(_))
    ));
}

#[test]
fn transfer_into_bare_repository() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    let git = init(src_dir.path());
    let first = commit(&git, &[], &[("a.txt", "one")], "first");
    let second = commit(&git, &[first], &[("a.txt", "two")], "second");
    let src = GitRepository::open(src_dir.path()).unwrap();

    let mut dst = GitRepository::init_bare(dst_dir.path()).unwrap();
    assert!(dst.is_bare());
    transfer(&src, &mut dst, &oid(second), None);

    let master = RefName::new("master").unwrap();
    dst.set_head(&master, &oid(second)).unwrap();
    assert_eq!(dst.head().unwrap(), Some(oid(second)));
    assert_eq!(
        dst.history(&oid(second)).unwrap(),
        vec![oid(first), oid(second)]
    );
}

#[test]
fn set_head_checks_out_working_tree() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    let git = init(src_dir.path());
    let first = commit(&git, &[], &[("hello.txt", "hello world\n")], "first");
    let src = GitRepository::open(src_dir.path()).unwrap();

    let mut dst = GitRepository::init(dst_dir.path()).unwrap();
    transfer(&src, &mut dst, &oid(first), None);
    dst.set_head(&RefName::new("master").unwrap(), &oid(first))
        .unwrap();

    let contents = std::fs::read_to_string(dst_dir.path().join("hello.txt")).unwrap();
    assert_eq!(contents, "hello world\n");
}

#[test]
fn incremental_transfer_applies_on_top() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    let git = init(src_dir.path());
    let first = commit(&git, &[], &[("a.txt", "one")], "first");
    let src = GitRepository::open(src_dir.path()).unwrap();
    let mut dst = GitRepository::init_bare(dst_dir.path()).unwrap();
    transfer(&src, &mut dst, &oid(first), None);

    let second = commit(&git, &[first], &[("a.txt", "two")], "second");
    transfer(&src, &mut dst, &oid(second), Some(&oid(first)));
    assert!(dst.contains(&oid(second)).unwrap());
    assert_eq!(dst.history(&oid(second)).unwrap().len(), 2);
}

#[test]
fn merge_history_lists_parents_first() {
    let dir = tempdir().unwrap();
    let git = init(dir.path());
    let base = commit(&git, &[], &[("f", "base")], "base");
    let left = commit(&git, &[base], &[("f", "left")], "left");
    let right = commit(&git, &[base], &[("f", "right")], "right");
    let merge = commit(&git, &[left, right], &[("f", "merged")], "merge");
    let repo = GitRepository::open(dir.path()).unwrap();

    let history = repo.history(&oid(merge)).unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history.first(), Some(&oid(base)));
    assert_eq!(history.last(), Some(&oid(merge)));

    let objects = repo.missing_objects(&oid(merge), Some(&oid(base))).unwrap();
    let ids: Vec<Oid> = objects.iter().map(|o| o.oid.clone()).collect();
    assert!(ids.contains(&oid(left)) && ids.contains(&oid(right)));
    assert!(!ids.contains(&oid(base)));
}

#[test]
fn apply_rejects_mislabelled_object() {
    let dir = tempdir().unwrap();
    let mut repo = GitRepository::init_bare(dir.path()).unwrap();
    let bogus =
        RawObject::new(Oid::from_slice(&[3; 20]).unwrap(), ObjectKind::Blob, b"data".to_vec());
    assert!(matches!(
        repo.apply(&[bogus]),
        Err(GraphError::CorruptObject { .. })
    ));
}

#[test]
fn tracking_refs_roundtrip() {
    let dir = tempdir().unwrap();
    let git = init(dir.path());
    let first = commit(&git, &[], &[("a", "a")], "first");
    let mut repo = GitRepository::open(dir.path()).unwrap();
    let remote = RepoRef::parse("proj:master").unwrap();

    assert_eq!(repo.tracking_ref(&remote).unwrap(), None);
    repo.set_tracking_ref(&remote, &oid(first)).unwrap();
    assert_eq!(repo.tracking_ref(&remote).unwrap(), Some(oid(first)));
    assert!(git.find_reference("refs/remotes/proj/master").is_ok());
}
