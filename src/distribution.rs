use std::hash::{BuildHasher, Hash, Hasher};

use crate::data_store::DataKey;

/// The identifier of a cluster member.
pub type NodeId = u64;

/// Key-ownership seam consumed by the transactional core.
///
/// Implementations answer which cluster members own a key (and therefore
/// vote on transactions writing it). The core only consumes this interface;
/// rebalancing and topology management live with the implementation.
///
/// Implementations must be `Send` and `Sync` to be shared across
/// transactions.
pub trait Distribution: Send + Sync {
    /// The local node's identifier.
    fn local_node(&self) -> NodeId;

    /// All members of the current topology.
    fn all_members(&self) -> Vec<NodeId>;

    /// The owners of `key`, primary first.
    fn owners_of(&self, key: &DataKey) -> Vec<NodeId>;

    /// Whether the local node owns `key`.
    fn is_local_owner(&self, key: &DataKey) -> bool {
        self.owners_of(key).contains(&self.local_node())
    }

    /// The union of owners across `keys`, preserving first-seen order.
    fn write_owners(&self, keys: &[DataKey]) -> Vec<NodeId> {
        let mut owners = Vec::new();
        for key in keys {
            for owner in self.owners_of(key) {
                if !owners.contains(&owner) {
                    owners.push(owner);
                }
            }
        }
        owners
    }
}

/// Ownership by hashing the key onto the member ring.
///
/// The primary owner is `hash(key) mod members`, replicas are the following
/// members on the ring. The hasher is seeded with fixed constants so every
/// node computes identical owners for the same topology.
pub struct HashDistribution {
    local_node: NodeId,
    members: Vec<NodeId>,
    replication_degree: usize,
    hash_builder: ahash::RandomState,
}

impl HashDistribution {
    pub fn new(local_node: NodeId, members: Vec<NodeId>, replication_degree: usize) -> Self {
        Self {
            local_node,
            members,
            replication_degree: replication_degree.max(1),
            hash_builder: ahash::RandomState::with_seeds(7, 31, 127, 8191),
        }
    }

    fn primary_index(&self, key: &DataKey) -> usize {
        let mut hasher = self.hash_builder.build_hasher();
        key.hash(&mut hasher);
        (hasher.finish() % self.members.len() as u64) as usize
    }
}

impl Distribution for HashDistribution {
    fn local_node(&self) -> NodeId {
        self.local_node
    }

    fn all_members(&self) -> Vec<NodeId> {
        self.members.clone()
    }

    fn owners_of(&self, key: &DataKey) -> Vec<NodeId> {
        let degree = self.replication_degree.min(self.members.len());
        let primary = self.primary_index(key);
        (0..degree)
            .map(|offset| self.members[(primary + offset) % self.members.len()])
            .collect()
    }
}
