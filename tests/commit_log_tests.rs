mod common;

use std::sync::Arc;

use selene::{
    CommitLog, CommittedTransaction, DataContainer, SeleneError, TransactionIsolation,
    VersionGenerator, VersionRelation, VersionVector, NON_EXISTING,
};

fn vector(counters: &[i64]) -> VersionVector {
    VersionVector::new(1, counters.to_vec())
}

fn committed(tx_id: u64, counters: &[i64], sub_version: u64) -> CommittedTransaction {
    CommittedTransaction::new(
        tx_id,
        vector(counters),
        sub_version,
        Some(vec![format!("key{tx_id}")]),
        tx_id,
    )
}

fn single_node_log() -> (Arc<VersionGenerator>, CommitLog) {
    common::init_logging();
    let generator = Arc::new(VersionGenerator::new(0, vec![0]));
    let log = CommitLog::new(generator.clone(), TransactionIsolation::Serializable);
    (generator, log)
}

fn two_node_log() -> (Arc<VersionGenerator>, CommitLog) {
    common::init_logging();
    let generator = Arc::new(VersionGenerator::new(0, vec![0, 1]));
    let log = CommitLog::new(generator.clone(), TransactionIsolation::Serializable);
    (generator, log)
}

#[test]
fn test_disabled_log_reports_illegal_state() {
    let generator = Arc::new(VersionGenerator::new(0, vec![0]));
    let log = CommitLog::new(generator, TransactionIsolation::ReadCommitted);
    assert!(!log.is_enabled());
    match log.get_current_version() {
        Err(SeleneError::IllegalState(_)) => {}
        other => panic!("expected an illegal-state error, got {other:?}"),
    }
}

#[test]
fn test_single_node_commit_chain() {
    // Insert three transactions with versions [1], [2], [3]; the head must
    // be [3] and a walk must return the entries newest first, ending at the
    // genesis entry.
    let (_generator, log) = single_node_log();
    for counter in 1..=3 {
        log.insert_new_committed_versions(&[committed(counter as u64, &[counter], 0)])
            .unwrap();
    }

    assert_eq!(log.get_current_version().unwrap(), vector(&[3]));

    let head = log.snapshot_head();
    assert_eq!(head.version(), &vector(&[3]));
    let second = head.previous().unwrap();
    assert_eq!(second.version(), &vector(&[2]));
    let third = second.previous().unwrap();
    assert_eq!(third.version(), &vector(&[1]));
    let genesis = third.previous().unwrap();
    assert_eq!(genesis.version(), &vector(&[0]));
    assert!(genesis.previous().is_none());

    assert_eq!(
        log.get_available_version_less_than(Some(&vector(&[2]))).unwrap(),
        vector(&[2])
    );
}

#[test]
fn test_available_version_boundaries() {
    let (_generator, log) = single_node_log();
    log.insert_new_committed_versions(&[committed(1, &[1], 0)]).unwrap();

    // No bound: equals the current version.
    let current = log.get_current_version().unwrap();
    assert_eq!(log.get_available_version_less_than(None).unwrap(), current);

    // Law: the available version below the current version never exceeds it.
    let available = log.get_available_version_less_than(Some(&current)).unwrap();
    assert!(matches!(
        available.compare(&current).unwrap(),
        VersionRelation::Before | VersionRelation::BeforeOrEqual | VersionRelation::Equal
    ));
}

#[test]
fn test_available_version_with_undefined_local_coordinate() {
    // A remote snapshot that knows nothing about this node constrains only
    // the coordinates it defines; the result picks up the best local
    // counter and stays within the bound.
    let (_generator, log) = two_node_log();
    log.insert_new_committed_versions(&[committed(1, &[1, 1], 0)]).unwrap();
    log.insert_new_committed_versions(&[committed(2, &[2, 2], 0)]).unwrap();

    let bound = VersionVector::new(1, vec![NON_EXISTING, 1]);
    let available = log.get_available_version_less_than(Some(&bound)).unwrap();
    assert_eq!(available, vector(&[1, 1]));
    assert_ne!(available.get(0), NON_EXISTING);
}

#[test]
fn test_most_recent_version_is_merge_max_of_inserts() {
    // The head tracks insertion order while the current version merges every
    // coordinate ever observed.
    let (_generator, log) = two_node_log();
    log.insert_new_committed_versions(&[committed(1, &[1, 4], 0)]).unwrap();
    log.insert_new_committed_versions(&[committed(2, &[3, 1], 0)]).unwrap();

    assert_eq!(log.snapshot_head().version(), &vector(&[3, 1]));
    assert_eq!(log.get_current_version().unwrap(), vector(&[3, 4]));
}

#[test]
fn test_read_version_strictly_after_head_has_empty_not_visible_set() {
    let (_generator, log) = single_node_log();
    log.insert_new_committed_versions(&[committed(1, &[1], 0)]).unwrap();
    log.insert_new_committed_versions(&[committed(2, &[2], 0)]).unwrap();

    let read_version = log.get_read_version(&vector(&[5])).unwrap();
    assert_eq!(read_version.not_visible_len(), 0);
}

#[test]
fn test_coincident_sub_versions_hidden_at_exact_snapshot() {
    // Two transactions share the vector [5, 3] with sub-versions 0 and 1. A
    // reader at snapshot [5, 3] must observe the base commit and skip the
    // coincident one.
    let (generator, log) = two_node_log();
    let container = DataContainer::new(generator.clone());

    let first = generator.convert_to_write(&vector(&[5, 3]), 0);
    let second = generator.convert_to_write(&vector(&[5, 3]), 1);
    container
        .commit(&"key".to_string(), Some(Arc::new(common::value("t1"))), &first)
        .unwrap();
    container
        .commit(&"key".to_string(), Some(Arc::new(common::value("t2"))), &second)
        .unwrap();
    log.insert_new_committed_versions(&[
        committed(1, &[5, 3], 0),
        committed(2, &[5, 3], 1),
    ])
    .unwrap();

    let read_version = log.get_read_version(&vector(&[5, 3])).unwrap();
    assert!(read_version.contains_not_visible(5, 1));
    assert!(!read_version.contains_not_visible(5, 0));

    let read = container.read(&"key".to_string(), Some(&read_version));
    assert_eq!(read.data().unwrap().as_slice(), b"t1");
    assert!(!read.is_most_recent());
}

#[test]
fn test_cross_node_invisibility() {
    // E1 = [3, 5] shares the reader's local counter but is ahead on the
    // remote coordinate; E2 = [3, 2] is fully below the snapshot [3, 4].
    let (generator, log) = two_node_log();
    let container = DataContainer::new(generator.clone());

    let e1 = CommittedTransaction::new(1, vector(&[3, 5]), 0, Some(vec!["a".into()]), 1);
    let e2 = CommittedTransaction::new(2, vector(&[3, 2]), 1, Some(vec!["b".into()]), 2);
    container
        .commit(
            &"a".to_string(),
            Some(Arc::new(common::value("from-e1"))),
            &generator.convert_to_write(&vector(&[3, 5]), 0),
        )
        .unwrap();
    log.insert_new_committed_versions(&[e1, e2]).unwrap();

    let read_version = log.get_read_version(&vector(&[3, 4])).unwrap();
    assert_eq!(read_version.not_visible_len(), 1);
    assert!(read_version.contains_not_visible(3, 0));

    // The key written by E1 must be invisible to this reader.
    let read = container.read(&"a".to_string(), Some(&read_version));
    assert!(read.data().is_none());
    assert!(!read.is_most_recent());
}

#[test]
fn test_sub_version_continuation_at_head() {
    let (_generator, log) = two_node_log();
    log.insert_new_committed_versions(&[committed(1, &[5, 3], 0)]).unwrap();

    // Same vector as the head: the next batch continues the numbering.
    assert_eq!(log.next_sub_version_for(&vector(&[5, 3])).unwrap(), 1);
    // A different vector restarts at zero.
    assert_eq!(log.next_sub_version_for(&vector(&[6, 3])).unwrap(), 0);
}

#[test]
fn test_wait_for_version_zero_timeout_reports_current_truth() {
    let (_generator, log) = single_node_log();
    assert!(log.wait_for_version(&vector(&[0]), 0).unwrap());
    assert!(!log.wait_for_version(&vector(&[1]), 0).unwrap());

    log.insert_new_committed_versions(&[committed(1, &[1], 0)]).unwrap();
    assert!(log.wait_for_version(&vector(&[1]), 0).unwrap());
}

#[test]
fn test_stop_interrupts_waiters() {
    let (_generator, log) = single_node_log();
    let log = Arc::new(log);
    let waiter = {
        let log = log.clone();
        std::thread::spawn(move || log.wait_for_version(&vector(&[9]), -1))
    };
    std::thread::sleep(std::time::Duration::from_millis(50));
    log.stop();
    match waiter.join().unwrap() {
        Err(SeleneError::Interrupted(_)) => {}
        other => panic!("expected the waiter to be interrupted, got {other:?}"),
    }
}

#[test]
fn test_dump_writes_one_line_per_entry() {
    let (_generator, log) = single_node_log();
    log.insert_new_committed_versions(&[committed(1, &[1], 0)]).unwrap();
    log.insert_new_committed_versions(&[CommittedTransaction::new(
        2,
        vector(&[2]),
        0,
        None,
        2,
    )])
    .unwrap();

    let path = std::env::temp_dir().join("selene_commit_log_dump.txt");
    log.dump_to(&path).unwrap();
    let dumped = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = dumped.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("= ALL"), "clear entry dumps ALL: {}", lines[0]);
    assert!(lines[1].contains("key1"));
    std::fs::remove_file(&path).ok();
}
