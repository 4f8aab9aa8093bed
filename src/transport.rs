use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data_store::{DataKey, Value};
use crate::distribution::NodeId;
use crate::errors::Result;
use crate::version::VersionVector;

/// The write-set a transaction ships to its write-owners.
///
/// `Some(value)` is an insert or update, `None` a deletion. A set with
/// `clear` raised wipes every key; its commit-log entry records "all keys"
/// instead of a key list. Wire-facing, so the maps are std `HashMap`s.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Modifications {
    pub clear: bool,
    pub writes: HashMap<DataKey, Option<Value>>,
}

impl Modifications {
    pub fn is_empty(&self) -> bool {
        !self.clear && self.writes.is_empty()
    }

    /// The keys this write-set touches, `None` meaning "all keys".
    pub fn affected_keys(&self) -> Option<Vec<DataKey>> {
        if self.clear {
            None
        } else {
            Some(self.writes.keys().cloned().collect())
        }
    }
}

/// Phase-one message: validate and order a transaction on a write-owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareRequest {
    pub tx_id: u64,
    pub origin: NodeId,
    pub prepare_version: VersionVector,
    /// Keys read by the transaction and the version each was read at
    /// (`None` when the key did not exist).
    pub read_set: Vec<(DataKey, Option<VersionVector>)>,
    pub modifications: Modifications,
    /// One-phase transactions commit immediately after a successful
    /// prepare instead of waiting for a second message.
    pub one_phase: bool,
}

/// Phase-two message: release the transaction to commit under its final
/// version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub tx_id: u64,
    pub commit_version: VersionVector,
}

/// Abort message; safe to deliver more than once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub tx_id: u64,
}

/// Replication seam between nodes.
///
/// The core drives the prepare/commit/rollback exchange through this trait
/// and stays agnostic of the wire; implementations bridge to whatever RPC
/// stack the deployment uses. At-most-once delivery is not assumed:
/// duplicated prepares and commits are absorbed by transaction-id
/// idempotency in the commit queue.
///
/// Implementations must be `Send` and `Sync`.
pub trait ReplicationTransport: Send + Sync {
    /// Sends a prepare to `target` and returns its vote: the prepare
    /// version stamped by that owner.
    fn prepare(&self, target: NodeId, request: &PrepareRequest) -> Result<VersionVector>;

    /// Sends a commit to `target`.
    fn commit(&self, target: NodeId, request: &CommitRequest) -> Result<()>;

    /// Sends a rollback to `target`.
    fn rollback(&self, target: NodeId, request: &RollbackRequest) -> Result<()>;
}
