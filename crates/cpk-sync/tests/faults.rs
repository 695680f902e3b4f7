//! Retry behaviour and corrupt remote state.

mod common;

use std::sync::atomic::Ordering;

use common::*;
use cpk_graph::{LocalRepository, MemoryRepository};
use cpk_ledger::{LedgerReader, PushRecord};
use cpk_store::ObjectStore;
use cpk_sync::{RetryConfig, SyncConfig, SyncError, SyncStatus};

fn pushed_repo(h: &Harness, pushes: usize) -> (MemoryRepository, Vec<cpk_types::Oid>) {
    h.engine.register(&alice(), "proj", None).unwrap();
    let mut origin = MemoryRepository::new();
    let mut heads = Vec::new();
    for i in 0..pushes {
        heads.push(commit(&mut origin, &format!("c{i}")));
        h.engine
            .push(&alice(), &mut origin, &target("proj:master"), None)
            .unwrap();
    }
    (origin, heads)
}

// ---------------------------------------------------------------
// Retries
// ---------------------------------------------------------------

#[test]
fn transient_commit_failures_are_retried() {
    let h = harness();
    h.engine.register(&alice(), "proj", None).unwrap();
    let mut local = MemoryRepository::new();
    let head = commit(&mut local, "one");

    h.ledger.fail_commits(2);
    let pushed = h
        .engine
        .push(&alice(), &mut local, &target("proj:master"), None)
        .unwrap();
    assert_eq!(pushed.status, SyncStatus::Updated);
    assert_eq!(h.ledger.commit_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.engine.head(&target("proj:master")).unwrap(), Some(head));
}

#[test]
fn landed_commit_counts_as_success_on_retry() {
    let h = harness();
    h.engine.register(&alice(), "proj", None).unwrap();
    let mut local = MemoryRepository::new();
    let head = commit(&mut local, "one");

    h.ledger.land_before_failing.store(true, Ordering::SeqCst);
    h.ledger.fail_commits(1);
    h.engine
        .push(&alice(), &mut local, &target("proj:master"), None)
        .unwrap();
    assert_eq!(h.ledger.commit_calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.engine.head(&target("proj:master")).unwrap(), Some(head));
}

#[test]
fn exhausted_retries_surface_transport_error() {
    let h = harness();
    h.engine.register(&alice(), "proj", None).unwrap();
    let mut local = MemoryRepository::new();
    commit(&mut local, "one");

    h.ledger.fail_commits(10);
    let err = h
        .engine
        .push(&alice(), &mut local, &target("proj:master"), None)
        .unwrap_err();
    assert!(matches!(err, SyncError::Transport { attempts: 3, .. }));
    assert!(err.is_retryable());
    assert_eq!(h.ledger.commit_calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.engine.head(&target("proj:master")).unwrap(), None);
    assert_eq!(local.tracking_ref(&target("proj:master")).unwrap(), None);
}

#[test]
fn transient_store_failures_are_retried() {
    let h = harness();
    h.engine.register(&alice(), "proj", None).unwrap();
    let mut local = MemoryRepository::new();
    commit(&mut local, "one");

    h.store.failing_puts.store(2, Ordering::SeqCst);
    h.engine
        .push(&alice(), &mut local, &target("proj:master"), None)
        .unwrap();
    assert_eq!(h.store.puts.load(Ordering::SeqCst), 3);
    assert_eq!(h.store.inner.len(), 1);
}

#[test]
fn store_outage_is_reported_after_bound() {
    let h = harness_with(SyncConfig {
        retry: RetryConfig::immediate(2),
        ..SyncConfig::default()
    });
    h.engine.register(&alice(), "proj", None).unwrap();
    let mut local = MemoryRepository::new();
    commit(&mut local, "one");

    h.store.failing_puts.store(5, Ordering::SeqCst);
    let err = h
        .engine
        .push(&alice(), &mut local, &target("proj:master"), None)
        .unwrap_err();
    assert!(matches!(err, SyncError::Transport { attempts: 2, .. }));
    assert_eq!(h.ledger.commit_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_push_is_stale() {
    let h = harness();
    h.engine.register(&alice(), "proj", None).unwrap();
    let master = target("proj:master");

    let mut theirs = MemoryRepository::new();
    let their_head = commit(&mut theirs, "theirs");
    let their_pack = h.store.put(b"their pack").unwrap();
    *h.ledger.interloper.lock().unwrap() = Some((
        alice(),
        master.clone(),
        PushRecord {
            head: their_head.clone(),
            pack: their_pack,
            previous: None,
        },
    ));

    let mut ours = MemoryRepository::new();
    commit(&mut ours, "ours");
    let err = h.engine.push(&alice(), &mut ours, &master, None).unwrap_err();
    assert!(matches!(err, SyncError::InvariantViolation(_)));
    assert!(!err.is_retryable());
    assert_eq!(h.ledger.commit_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.engine.head(&master).unwrap(), Some(their_head));
}

#[test]
fn tracking_ref_failure_after_commit_is_remote_advanced() {
    let h = harness();
    h.engine.register(&alice(), "proj", None).unwrap();
    let master = target("proj:master");
    let mut inner = MemoryRepository::new();
    let head = commit(&mut inner, "one");
    let mut local = ReadOnlyRefs(inner);

    let err = h.engine.push(&alice(), &mut local, &master, None).unwrap_err();
    assert!(matches!(err, SyncError::RemoteAdvanced(_)));
    assert!(err
        .to_string()
        .starts_with("local apply failed; remote state has already advanced"));
    assert_eq!(h.engine.head(&master).unwrap(), Some(head));
}

// ---------------------------------------------------------------
// Corrupt chains and packs
// ---------------------------------------------------------------

#[test]
fn cyclic_chain_is_rejected() {
    let h = harness();
    let (_, heads) = pushed_repo(&h, 2);
    let first = h
        .ledger
        .push_record(&repo("proj"), &heads[0])
        .unwrap()
        .unwrap();
    h.ledger.override_record(PushRecord {
        previous: Some(heads[1].clone()),
        ..first
    });

    let mut clone = MemoryRepository::new();
    let err = h
        .engine
        .clone_into(None, &mut clone, &target("proj:master"), None)
        .unwrap_err();
    assert!(matches!(err, SyncError::CorruptChain(_)));
    assert_eq!(clone.object_count(), 0);
}

#[test]
fn chain_longer_than_limit_is_rejected() {
    let h = harness_with(SyncConfig {
        retry: RetryConfig::immediate(1),
        max_chain_length: 2,
        ..SyncConfig::default()
    });
    pushed_repo(&h, 3);

    let mut clone = MemoryRepository::new();
    assert!(matches!(
        h.engine
            .clone_into(None, &mut clone, &target("proj:master"), None),
        Err(SyncError::CorruptChain(_))
    ));
    assert_eq!(clone.object_count(), 0);
}

#[test]
fn missing_record_is_corrupt_chain() {
    let h = harness();
    let (_, heads) = pushed_repo(&h, 1);
    let record = h
        .ledger
        .push_record(&repo("proj"), &heads[0])
        .unwrap()
        .unwrap();
    let dangling = cpk_types::Oid::from_slice(&[9; 20]).unwrap();
    h.ledger.override_record(PushRecord {
        previous: Some(dangling),
        ..record
    });

    let mut clone = MemoryRepository::new();
    assert!(matches!(
        h.engine
            .clone_into(None, &mut clone, &target("proj:master"), None),
        Err(SyncError::CorruptChain(_))
    ));
}

#[test]
fn garbage_pack_is_corrupt_and_nothing_applies() {
    let h = harness();
    let (_, heads) = pushed_repo(&h, 2);
    let garbage = h.store.put(b"definitely not a pack").unwrap();
    let oldest = h
        .ledger
        .push_record(&repo("proj"), &heads[0])
        .unwrap()
        .unwrap();
    h.ledger.override_record(PushRecord {
        pack: garbage,
        ..oldest
    });

    let mut clone = MemoryRepository::new();
    let err = h
        .engine
        .clone_into(None, &mut clone, &target("proj:master"), None)
        .unwrap_err();
    assert!(matches!(err, SyncError::CorruptPack { pack, .. } if pack == garbage));
    // The newer, valid pack was fetched but not applied.
    assert_eq!(clone.object_count(), 0);
    assert_eq!(clone.head().unwrap(), None);
}
