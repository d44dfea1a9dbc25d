//! Integration tests for executor snapshot and restore.

use provena_engine::prelude::*;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn msg(json: &str) -> Message {
    Message::from_json(json).unwrap()
}

/// An executor holding a parent asset, a child, a pending owner proposal and
/// a reporter grant.
fn populated() -> Executor {
    let mut executor = Executor::new(EngineConfig::default());
    let report = executor.apply_batch(vec![
        Envelope::new(
            "farm",
            10,
            msg(r#"{"type":"create_asset","id":"beans","name":"Beans","quantity":"500","unit":"kg"}"#),
        ),
        Envelope::new(
            "farm",
            10,
            msg(r#"{"type":"create_asset","id":"lot-1","name":"Lot","quantity":"50","unit":"kg","parent_id":"beans"}"#),
        ),
        Envelope::new(
            "farm",
            11,
            msg(r#"{"type":"create_proposal","asset_id":"lot-1","recipient":"mill","role":"owner"}"#),
        ),
        Envelope::new(
            "farm",
            11,
            msg(r#"{"type":"create_reporter","asset_id":"beans","reporter":"lab","property_names":["grade"]}"#),
        ),
    ]);
    assert_eq!(report.failed_count, 0);
    executor
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn restore_rewinds_state() {
    let mut executor = populated();
    let snapshot = executor.capture_snapshot();
    let hash = executor.state_hash();

    executor.apply_batch(vec![Envelope::new(
        "mill",
        12,
        msg(r#"{"type":"answer_proposal","asset_id":"lot-1","recipient":"mill","response":"accept"}"#),
    )]);
    assert_ne!(executor.state_hash(), hash);

    executor.restore_from_snapshot(&snapshot).unwrap();
    assert_eq!(executor.state_hash(), hash);
    assert_eq!(executor.batches_applied(), 1);
    assert!(executor.journal().is_empty());

    let lot = executor.queries().asset(&"lot-1".into()).unwrap().unwrap();
    assert_eq!(lot.owner, AccountId::from("farm"));
    assert_eq!(
        executor
            .queries()
            .proposals_for_recipient(&"mill".into())
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn snapshot_survives_json() {
    let executor = populated();
    let snapshot = executor.capture_snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    let decoded: StateSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, snapshot);

    let mut fresh = Executor::new(EngineConfig::default());
    fresh.restore_from_snapshot(&decoded).unwrap();
    assert_eq!(fresh.state_hash(), executor.state_hash());
    assert_eq!(fresh.store(), executor.store());
}

#[test]
fn tampered_value_is_rejected() {
    let executor = populated();
    let mut snapshot = executor.capture_snapshot();
    let (_, value) = snapshot
        .entries
        .iter_mut()
        .find(|(k, _)| k.starts_with(provena_core::keys::ASSET_NAMESPACE))
        .unwrap();
    value.push(b' ');

    let mut target = populated();
    let before = target.state_hash();
    let err = target.restore_from_snapshot(&snapshot).unwrap_err();
    assert!(matches!(err, EngineError::SnapshotHashMismatch { .. }));
    assert_eq!(target.state_hash(), before);
}

#[test]
fn tampered_counter_is_rejected() {
    let executor = populated();
    let mut snapshot = executor.capture_snapshot();
    snapshot.batches_applied += 1;

    let mut target = Executor::new(EngineConfig::default());
    assert!(matches!(
        target.restore_from_snapshot(&snapshot),
        Err(EngineError::SnapshotHashMismatch { .. })
    ));
}

#[test]
fn fork_explores_divergent_branches() {
    let mut executor = populated();
    let fork = executor.capture_snapshot();

    let accept = Envelope::new(
        "mill",
        12,
        msg(r#"{"type":"answer_proposal","asset_id":"lot-1","recipient":"mill","response":"accept"}"#),
    );
    let reject = Envelope::new(
        "mill",
        12,
        msg(r#"{"type":"answer_proposal","asset_id":"lot-1","recipient":"mill","response":"reject"}"#),
    );

    executor.apply_batch(vec![accept.clone()]);
    let accepted = executor.state_hash();

    executor.restore_from_snapshot(&fork).unwrap();
    executor.apply_batch(vec![reject]);
    let rejected = executor.state_hash();
    assert_ne!(accepted, rejected);

    // Same state + same batch = same hash.
    executor.restore_from_snapshot(&fork).unwrap();
    executor.apply_batch(vec![accept]);
    assert_eq!(executor.state_hash(), accepted);
}
