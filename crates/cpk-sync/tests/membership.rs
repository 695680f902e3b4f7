//! Registration and role management through the engine.

mod common;

use common::*;
use cpk_graph::MemoryRepository;
use cpk_ledger::{LedgerReader, Role};
use cpk_sync::SyncError;

#[test]
fn register_makes_caller_sole_owner() {
    let h = harness();
    let name = h.engine.register(&alice(), "proj", None).unwrap();
    assert!(h.ledger.is_owner(&name, &alice()).unwrap());
    assert_eq!(h.ledger.owner_count(&name).unwrap(), 1);
    assert!(h.ledger.is_public(&name).unwrap());
}

#[test]
fn register_twice_keeps_original_owner() {
    let h = harness();
    h.engine.register(&alice(), "proj", None).unwrap();
    let err = h.engine.register(&bob(), "proj", None).unwrap_err();
    assert!(matches!(err, SyncError::AlreadyExists(_)));
    assert_eq!(err.to_string(), "Repo already exists");
    assert!(h.ledger.is_owner(&repo("proj"), &alice()).unwrap());
    assert!(!h.ledger.is_owner(&repo("proj"), &bob()).unwrap());
}

#[test]
fn reserved_character_rejected_before_ledger() {
    let h = harness();
    let err = h.engine.register(&alice(), "bad:name", None).unwrap_err();
    assert!(matches!(err, SyncError::InvariantViolation(_)));
    assert_eq!(err.to_string(), "Repo names cannot contain the : character");
    assert_eq!(h.ledger.commit_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[test]
fn only_owners_manage_members() {
    let h = harness();
    let name = h.engine.register(&alice(), "proj", None).unwrap();

    for role in [Role::Owner, Role::Writer] {
        let err = h
            .engine
            .add_member(&bob(), &name, role, &carol(), None, None)
            .unwrap_err();
        assert!(matches!(err, SyncError::Authorization(_)));
        assert_eq!(err.to_string(), role.add_denied());
    }
    assert!(!h.ledger.is_writer(&name, &carol()).unwrap());

    h.engine
        .add_member(&alice(), &name, Role::Writer, &bob(), None, None)
        .unwrap();
    let err = h
        .engine
        .remove_member(&bob(), &name, Role::Owner, &alice())
        .unwrap_err();
    assert_eq!(err.to_string(), "Only repo owners can remove owners");
    assert!(h.ledger.is_owner(&name, &alice()).unwrap());
}

#[test]
fn last_owner_cannot_be_removed() {
    let h = harness();
    let name = h.engine.register(&alice(), "proj", None).unwrap();
    let err = h
        .engine
        .remove_member(&alice(), &name, Role::Owner, &alice())
        .unwrap_err();
    assert!(matches!(err, SyncError::InvariantViolation(_)));
    assert_eq!(err.to_string(), "Cannot remove the last owner from a repo");
    assert_eq!(h.ledger.owner_count(&name).unwrap(), 1);

    h.engine
        .add_member(&alice(), &name, Role::Owner, &bob(), None, None)
        .unwrap();
    h.engine
        .remove_member(&alice(), &name, Role::Owner, &alice())
        .unwrap();
    assert!(!h.ledger.is_owner(&name, &alice()).unwrap());
    assert_eq!(h.ledger.owner_count(&name).unwrap(), 1);
}

#[test]
fn readers_need_a_private_repo() {
    let h = harness();
    let name = h.engine.register(&alice(), "proj", None).unwrap();
    let err = h
        .engine
        .add_member(&alice(), &name, Role::Reader, &bob(), None, None)
        .unwrap_err();
    assert!(matches!(err, SyncError::InvariantViolation(_)));
    assert_eq!(err.to_string(), "Repo is not a private repo");
}

#[test]
fn membership_on_unregistered_repo() {
    let h = harness();
    let err = h
        .engine
        .add_member(&alice(), &repo("ghost"), Role::Writer, &bob(), None, None)
        .unwrap_err();
    assert_eq!(err.to_string(), "ghost is not registered");
}

#[test]
fn writers_push_and_lose_access_when_removed() {
    let h = harness();
    let name = h.engine.register(&alice(), "proj", None).unwrap();
    let master = target("proj:master");
    let mut local = MemoryRepository::new();
    commit(&mut local, "one");

    let err = h.engine.push(&bob(), &mut local, &master, None).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Cannot push to a repo that you are not a writer or owner of"
    );

    h.engine
        .add_member(&alice(), &name, Role::Writer, &bob(), None, None)
        .unwrap();
    h.engine.push(&bob(), &mut local, &master, None).unwrap();

    h.engine
        .remove_member(&alice(), &name, Role::Writer, &bob())
        .unwrap();
    commit(&mut local, "two");
    assert!(matches!(
        h.engine.push(&bob(), &mut local, &master, None),
        Err(SyncError::Authorization(_))
    ));
}

#[test]
fn unauthorized_push_touches_nothing() {
    let h = harness();
    h.engine.register(&alice(), "proj", None).unwrap();
    let mut local = MemoryRepository::new();
    commit(&mut local, "one");

    assert!(h
        .engine
        .push(&carol(), &mut local, &target("proj:master"), None)
        .is_err());
    assert_eq!(h.store.accesses(), 0);
    assert_eq!(h.ledger.commit_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(h.engine.head(&target("proj:master")).unwrap(), None);
}

#[test]
fn unregistered_repo_fails_before_store() {
    let h = harness();
    let mut local = MemoryRepository::new();
    commit(&mut local, "one");

    let err = h
        .engine
        .push(&alice(), &mut local, &target("ghost:master"), None)
        .unwrap_err();
    assert!(matches!(err, SyncError::NotRegistered(_)));
    let mut clone = MemoryRepository::new();
    assert!(matches!(
        h.engine.clone_into(None, &mut clone, &target("ghost:master"), None),
        Err(SyncError::NotRegistered(_))
    ));
    assert_eq!(h.store.accesses(), 0);
}
