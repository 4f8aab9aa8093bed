#![allow(unused)]
//! Common utilities and mock collaborators for Selene integration tests.
//!
//! Provides node-construction helpers, a loopback transport that wires a
//! multi-node cluster together inside one process, and small value helpers.

use std::sync::Arc;

use ahash::AHashMap as HashMap;
use parking_lot::RwLock;
use selene::{
    CommitRequest, HashDistribution, NodeId, PrepareRequest, ReplicationTransport, Result,
    RollbackRequest, Selene, SeleneConfig, SeleneError, TransactionIsolation, Value,
    VersionVector,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A single-node Selene instance with the given isolation level.
pub fn setup_node(isolation: TransactionIsolation) -> Selene {
    init_logging();
    let mut config = SeleneConfig::single_node(0);
    config.isolation = isolation;
    config.transaction_timeout_ms = 5_000;
    Selene::new(config)
}

/// In-process transport: every request is served by directly invoking the
/// target node's protocol handlers.
pub struct LoopbackTransport {
    nodes: RwLock<HashMap<NodeId, Arc<Selene>>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, node_id: NodeId, node: Arc<Selene>) {
        self.nodes.write().insert(node_id, node);
    }

    fn node(&self, target: NodeId) -> Result<Arc<Selene>> {
        self.nodes
            .read()
            .get(&target)
            .cloned()
            .ok_or_else(|| SeleneError::Transport(format!("unknown node {target}")))
    }
}

impl ReplicationTransport for LoopbackTransport {
    fn prepare(&self, target: NodeId, request: &PrepareRequest) -> Result<VersionVector> {
        self.node(target)?.handle_prepare(request)
    }

    fn commit(&self, target: NodeId, request: &CommitRequest) -> Result<()> {
        self.node(target)?.handle_commit(request)
    }

    fn rollback(&self, target: NodeId, request: &RollbackRequest) -> Result<()> {
        self.node(target)?.handle_rollback(request)
    }
}

/// A fully-replicated cluster (every member owns every key) wired over the
/// loopback transport. Returns the nodes in `members` order.
pub fn setup_cluster(members: &[NodeId]) -> Vec<Arc<Selene>> {
    init_logging();
    let transport = Arc::new(LoopbackTransport::new());
    let mut nodes = Vec::with_capacity(members.len());
    for &node_id in members {
        let config = SeleneConfig {
            node_id,
            members: members.to_vec(),
            isolation: TransactionIsolation::Serializable,
            replication_degree: members.len(),
            transaction_timeout_ms: 5_000,
        };
        let distribution = Arc::new(HashDistribution::new(
            node_id,
            members.to_vec(),
            members.len(),
        ));
        let node = Arc::new(Selene::with_collaborators(
            config,
            distribution,
            Some(transport.clone()),
        ));
        transport.register(node_id, node.clone());
        nodes.push(node);
    }
    nodes
}

/// Byte payload from a string literal.
pub fn value(text: &str) -> Value {
    text.as_bytes().to_vec()
}

/// Number of entries in a node's commit-log chain, genesis included.
pub fn chain_len(node: &Selene) -> usize {
    let mut count = 0;
    let mut iterator = Some(node.commit_log().snapshot_head());
    while let Some(entry) = iterator {
        count += 1;
        iterator = entry.previous().cloned();
    }
    count
}
