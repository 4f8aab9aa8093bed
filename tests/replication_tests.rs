mod common;

use common::{chain_len, setup_cluster, value};
use selene::{CommitRequest, SeleneError};

#[test]
fn test_replicated_write_visible_on_all_nodes() {
    let nodes = setup_cluster(&[1, 2]);

    let mut txn = nodes[0].begin_transaction().unwrap();
    txn.write("key1".to_string(), value("replicated")).unwrap();
    txn.commit().unwrap();

    for node in &nodes {
        assert_eq!(
            node.get(&"key1".to_string()).unwrap().as_slice(),
            b"replicated",
            "node {} did not apply the write",
            node.node_id()
        );
    }

    // Both nodes installed the same commit version.
    let head_a = nodes[0].commit_log().snapshot_head();
    let head_b = nodes[1].commit_log().snapshot_head();
    assert_eq!(head_a.version(), head_b.version());
}

#[test]
fn test_remote_origin_read_after_replicated_commit() {
    let nodes = setup_cluster(&[1, 2]);

    let mut writer = nodes[0].begin_transaction().unwrap();
    writer.write("key1".to_string(), value("from-node-1")).unwrap();
    writer.commit().unwrap();

    // A transaction on the other node reads under its own snapshot.
    let mut reader = nodes[1].begin_transaction().unwrap();
    let read = reader.read(&"key1".to_string()).unwrap().expect("replicated value");
    assert_eq!(read.as_slice(), b"from-node-1");
    reader.commit().unwrap();
}

#[test]
fn test_duplicate_commit_is_idempotent() {
    let nodes = setup_cluster(&[1, 2]);

    let mut txn = nodes[0].begin_transaction().unwrap();
    let tx_id = txn.id();
    txn.write("key1".to_string(), value("once")).unwrap();
    txn.commit().unwrap();

    let commit_version = nodes[0].commit_log().snapshot_head().version().clone();
    let before = chain_len(&nodes[0]);

    // A replayed commit finds no queue entry and must change nothing.
    nodes[0]
        .handle_commit(&CommitRequest {
            tx_id,
            commit_version,
        })
        .unwrap();
    assert_eq!(chain_len(&nodes[0]), before);
    assert_eq!(nodes[0].get(&"key1".to_string()).unwrap().as_slice(), b"once");
}

#[test]
fn test_failed_prepare_rolls_back_on_every_owner() {
    let nodes = setup_cluster(&[1, 2]);

    let mut setup = nodes[0].begin_transaction().unwrap();
    setup.write("key1".to_string(), value("v1")).unwrap();
    setup.commit().unwrap();

    // A stale transaction reads key1, then loses the race to an overwriter.
    let mut stale = nodes[0].begin_transaction().unwrap();
    stale.read(&"key1".to_string()).unwrap();
    stale.write("key2".to_string(), value("stale")).unwrap();

    let mut overwriter = nodes[1].begin_transaction().unwrap();
    overwriter.write("key1".to_string(), value("v2")).unwrap();
    overwriter.commit().unwrap();

    match stale.commit() {
        Err(SeleneError::ReadWriteConflict(key)) => assert_eq!(key, "key1"),
        other => panic!("expected a read-write conflict, got {other:?}"),
    }

    // The aborted transaction left no queue entry behind on either node.
    for node in &nodes {
        assert!(node.commit_manager().queue().is_empty());
        assert!(node.get(&"key2".to_string()).is_none());
    }
}
