use std::collections::HashMap;
use std::sync::Arc;

use ahash::AHashSet as HashSet;
use log::{debug, error};

use crate::data_store::{DataKey, Value};
use crate::distribution::NodeId;
use crate::errors::{Result, SeleneError};
use crate::selene::NodeComponents;
use crate::transport::{CommitRequest, Modifications, PrepareRequest, RollbackRequest};
use crate::version::{ReadVersion, VersionVector};

/// A transaction originated on the local node.
///
/// Reads are served under a snapshot vector that advances as the
/// transaction observes committed entries; writes and deletes are staged
/// in a write-set and only reach the data container through the
/// prepare/commit pipeline. Committing consumes the transaction: the
/// write-owners of the touched keys each validate and vote a prepare
/// version, the votes merge into the commit version, and every owner
/// applies the write-set in commit-queue order.
impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction").field("id", &self.id).finish()
    }
}

pub struct Transaction {
    id: u64,
    components: Arc<NodeComponents>,
    /// The snapshot all reads of this transaction are ordered against.
    snapshot_version: VersionVector,
    /// Cached read version; dropped whenever the snapshot advances.
    read_version: Option<ReadVersion>,
    first_read_done: bool,
    /// Keys read and the version each was read at (`None`: key absent).
    read_set: Vec<(DataKey, Option<VersionVector>)>,
    read_keys: HashSet<DataKey>,
    /// Staged changes; `Some` is an insert or update, `None` a deletion.
    write_set: HashMap<DataKey, Option<Value>>,
    cleared: bool,
    already_read_on_this_node: bool,
    read_from: HashSet<NodeId>,
}

impl Transaction {
    pub(crate) fn new(
        id: u64,
        components: Arc<NodeComponents>,
        snapshot_version: VersionVector,
    ) -> Self {
        Self {
            id,
            components,
            snapshot_version,
            read_version: None,
            first_read_done: false,
            read_set: Vec::new(),
            read_keys: HashSet::new(),
            write_set: HashMap::new(),
            cleared: false,
            already_read_on_this_node: false,
            read_from: HashSet::new(),
        }
    }

    /// Returns the unique identifier of the transaction.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The snapshot vector the transaction currently reads against.
    pub fn snapshot_version(&self) -> &VersionVector {
        &self.snapshot_version
    }

    fn has_modifications(&self) -> bool {
        self.cleared || !self.write_set.is_empty()
    }

    /// Computes (or re-validates) the read version to serve the next read.
    ///
    /// The first read on this node derives a locally-consistent read
    /// version from the commit log; every later read first waits until the
    /// (possibly advanced) snapshot has been installed locally.
    fn ensure_read_version(&mut self) -> Result<ReadVersion> {
        if self.first_read_done {
            let timeout = self.components.config.transaction_timeout_ms as i64;
            let installed = self
                .components
                .commit_log
                .wait_for_version(&self.snapshot_version, timeout)?;
            if !installed {
                return Err(SeleneError::Timeout(format!(
                    "installation of snapshot {}",
                    self.snapshot_version
                )));
            }
        } else {
            self.first_read_done = true;
        }
        if let Some(read_version) = &self.read_version {
            return Ok(read_version.clone());
        }
        let read_version = self
            .components
            .commit_log
            .get_read_version(&self.snapshot_version)?;
        self.read_version = Some(read_version.clone());
        Ok(read_version)
    }

    /// Reads the value of `key` as of the transaction's snapshot.
    ///
    /// A key staged in the write-set is served from there. Otherwise the
    /// data container is consulted under the transaction's read version;
    /// the creation version of whatever entry is served merges into the
    /// snapshot so later reads stay causally after it.
    ///
    /// # Errors
    ///
    /// Returns [`SeleneError::ReadOldValue`] when a transaction that has
    /// staged modifications observes an entry that is no longer the most
    /// recent committed version; such a transaction cannot serialize and
    /// must roll back.
    pub fn read(&mut self, key: &DataKey) -> Result<Option<Arc<Value>>> {
        if let Some(change) = self.write_set.get(key) {
            return Ok(change.clone().map(Arc::new));
        }
        if self.cleared {
            return Ok(None);
        }

        let read_version = self.ensure_read_version()?;
        let read = self.components.container.read(key, Some(&read_version));

        if self.has_modifications() && !read.is_most_recent() {
            return Err(SeleneError::ReadOldValue);
        }

        if let Some(entry_version) = read.version() {
            let merged = self
                .components
                .generator
                .merge_and_max(&[self.snapshot_version.clone(), entry_version.clone()])?;
            if merged != self.snapshot_version {
                self.snapshot_version = merged;
                self.read_version = None;
            }
        }

        if self.read_keys.insert(key.clone()) {
            self.read_set.push((key.clone(), read.version().cloned()));
        }
        if self.components.distribution.is_local_owner(key) {
            self.already_read_on_this_node = true;
            self.read_from
                .insert(self.components.distribution.local_node());
        }

        Ok(read.into_data())
    }

    /// Stages a write of `value` under `key`.
    pub fn write(&mut self, key: DataKey, value: Value) -> Result<()> {
        self.write_set.insert(key, Some(value));
        Ok(())
    }

    /// Stages a deletion of `key`.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        self.write_set.insert(key.to_string(), None);
        Ok(())
    }

    /// Stages a clear of every key. Earlier staged writes are discarded;
    /// the commit-log entry for this transaction will record "all keys".
    pub fn clear(&mut self) {
        self.cleared = true;
        self.write_set.clear();
    }

    /// Attempts to commit the transaction.
    ///
    /// A read-only transaction commits against its snapshot without
    /// entering the commit pipeline. A read-write transaction sends a
    /// prepare to every write-owner of its touched keys; each owner
    /// validates the read-set and votes a prepare version. With a single
    /// write-owner there is nothing to merge, so the prepare is flagged
    /// one-phase and the owner commits immediately; otherwise the votes
    /// merge into the commit version, which every owner then applies in
    /// commit queue order. A failed prepare rolls the transaction back on
    /// all owners and surfaces the error; failures past the commit
    /// decision are logged and swallowed so that owners which already
    /// applied the write-set do not diverge from the rest.
    pub fn commit(mut self) -> Result<()> {
        if !self.has_modifications() {
            debug!("read-only transaction {} committed against {}", self.id, self.snapshot_version);
            return Ok(());
        }

        let modifications = Modifications {
            clear: self.cleared,
            writes: std::mem::take(&mut self.write_set),
        };
        let owners = match modifications.affected_keys() {
            Some(keys) => self.components.distribution.write_owners(&keys),
            None => self.components.distribution.all_members(),
        };
        let one_phase = owners.len() == 1;
        let request = PrepareRequest {
            tx_id: self.id,
            origin: self.components.distribution.local_node(),
            prepare_version: self.snapshot_version.clone(),
            read_set: self.read_set.clone(),
            modifications,
            one_phase,
        };

        let mut votes = Vec::with_capacity(owners.len() + 1);
        for owner in &owners {
            match self.dispatch_prepare(*owner, &request) {
                Ok(vote) => {
                    debug!("transaction {} received vote {vote} from node {owner}", self.id);
                    votes.push(vote);
                }
                Err(err) => {
                    debug!("transaction {} failed to prepare on node {owner}: {err}", self.id);
                    self.send_rollbacks(&owners);
                    return Err(err);
                }
            }
        }
        if one_phase {
            debug!("transaction {} committed in one phase", self.id);
            return Ok(());
        }
        votes.push(self.snapshot_version.clone());

        let merged = self.components.generator.merge_and_max(&votes)?;
        let commit_version = self
            .components
            .generator
            .calculate_commit_version(&merged, &owners);
        debug!("transaction {} committing at {commit_version}", self.id);

        let commit_request = CommitRequest {
            tx_id: self.id,
            commit_version,
        };
        for owner in &owners {
            if let Err(err) = self.dispatch_commit(*owner, &commit_request) {
                // Point of no return: some owners may already have applied
                // the write-set, so the error cannot abort the transaction.
                error!(
                    "error while committing transaction {} on node {owner}: {err}",
                    self.id
                );
            }
        }
        Ok(())
    }

    /// Aborts the transaction, discarding staged changes and releasing its
    /// commit-queue slot if it ever took one.
    pub fn rollback(self) {
        debug!("transaction {} rolled back", self.id);
        self.components.commit_manager.rollback_transaction(self.id);
    }

    fn dispatch_prepare(&self, owner: NodeId, request: &PrepareRequest) -> Result<VersionVector> {
        if owner == self.components.distribution.local_node() {
            return self.components.handle_prepare(request);
        }
        self.transport_to(owner)?.prepare(owner, request)
    }

    fn dispatch_commit(&self, owner: NodeId, request: &CommitRequest) -> Result<()> {
        if owner == self.components.distribution.local_node() {
            return self.components.handle_commit(request);
        }
        self.transport_to(owner)?.commit(owner, request)
    }

    fn send_rollbacks(&self, owners: &[NodeId]) {
        let request = RollbackRequest { tx_id: self.id };
        for owner in owners {
            let outcome = if *owner == self.components.distribution.local_node() {
                self.components.handle_rollback(&request)
            } else {
                self.transport_to(*owner)
                    .and_then(|transport| transport.rollback(*owner, &request))
            };
            if let Err(err) = outcome {
                error!(
                    "failed to roll back transaction {} on node {owner}: {err}",
                    self.id
                );
            }
        }
    }

    fn transport_to(&self, owner: NodeId) -> Result<&dyn crate::transport::ReplicationTransport> {
        match &self.components.transport {
            Some(transport) => Ok(transport.as_ref()),
            None => Err(SeleneError::Transport(format!(
                "no transport configured to reach node {owner}"
            ))),
        }
    }
}
