use crate::distribution::NodeId;
use crate::TransactionIsolation;

/// Configuration for a Selene node.
pub struct SeleneConfig {
    /// The identifier of the local node. Must be a member of `members`.
    pub node_id: NodeId,
    /// All cluster members, including the local node.
    pub members: Vec<NodeId>,
    /// The isolation level for transactions started on this node. The
    /// commit log and the versioned read path are only enabled under
    /// [`TransactionIsolation::Serializable`].
    pub isolation: TransactionIsolation,
    /// How many owners each key has (primary plus replicas).
    pub replication_degree: usize,
    /// Upper bound, in milliseconds, on waits for snapshot installation and
    /// for a transaction's turn at the head of the commit queue.
    pub transaction_timeout_ms: u64,
}

impl SeleneConfig {
    /// Configuration for a single-node deployment.
    pub fn single_node(node_id: NodeId) -> Self {
        Self {
            node_id,
            members: vec![node_id],
            isolation: TransactionIsolation::Serializable,
            replication_degree: 1,
            transaction_timeout_ms: 30_000,
        }
    }
}

impl Default for SeleneConfig {
    fn default() -> Self {
        Self::single_node(0)
    }
}
