use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error};

use crate::commit_log::CommitLog;
use crate::commit_manager::{CommittedTransaction, TransactionCommitManager};
use crate::config::SeleneConfig;
use crate::data_store::{DataContainer, DataKey, Value};
use crate::distribution::{Distribution, HashDistribution, NodeId};
use crate::errors::{Result, SeleneError};
use crate::queue::TransactionEntry;
use crate::transaction::Transaction;
use crate::transport::{
    CommitRequest, Modifications, PrepareRequest, ReplicationTransport, RollbackRequest,
};
use crate::version::{VersionGenerator, VersionVector, WriteVersion};

/// Shared state of one node, threaded through every transaction.
pub(crate) struct NodeComponents {
    pub(crate) config: SeleneConfig,
    pub(crate) generator: Arc<VersionGenerator>,
    pub(crate) commit_log: Arc<CommitLog>,
    pub(crate) container: Arc<DataContainer>,
    pub(crate) commit_manager: Arc<TransactionCommitManager>,
    pub(crate) distribution: Arc<dyn Distribution>,
    pub(crate) transport: Option<Arc<dyn ReplicationTransport>>,
    tx_counter: AtomicU64,
}

impl NodeComponents {
    fn next_tx_id(&self) -> u64 {
        let local = self.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        // Cluster-wide uniqueness: the node id occupies the high bits.
        (self.config.node_id << 48) | local
    }

    /// Phase one of the commit protocol, run on every write-owner.
    ///
    /// Validates the read-set for locally-owned keys, then either enters
    /// the transaction into the commit queue (stamping its prepare-version
    /// vote) or, for transactions with nothing to apply here, skips the
    /// queue and votes the highest version available below the prepare
    /// version.
    pub(crate) fn handle_prepare(&self, request: &PrepareRequest) -> Result<VersionVector> {
        debug!(
            "prepare for transaction {} from node {}",
            request.tx_id, request.origin
        );
        let read_only = request.modifications.is_empty();
        if !read_only {
            self.container
                .validate_read_set(&request.read_set, self.distribution.as_ref())?;
        }

        let has_local_writes = request.modifications.clear
            || request
                .modifications
                .writes
                .keys()
                .any(|key| self.distribution.is_local_owner(key));
        if read_only || !has_local_writes {
            self.commit_manager
                .prepare_read_only_transaction(request.tx_id);
            return self
                .commit_log
                .get_available_version_less_than(Some(&request.prepare_version));
        }

        let (vote, _entry) = self.commit_manager.prepare_transaction(
            request.tx_id,
            &request.prepare_version,
            request.modifications.clone(),
        )?;

        if request.one_phase {
            let owners = match request.modifications.affected_keys() {
                Some(keys) => self.distribution.write_owners(&keys),
                None => self.distribution.all_members(),
            };
            let commit_version = self.generator.calculate_commit_version(&vote, &owners);
            self.handle_commit(&CommitRequest {
                tx_id: request.tx_id,
                commit_version,
            })?;
        }
        Ok(vote)
    }

    /// Phase two of the commit protocol.
    ///
    /// Records the commit version with the commit manager, waits for the
    /// transaction's turn at the head of the queue and applies the whole
    /// contiguous ready prefix as one batch. A commit for a transaction
    /// that is no longer queued is treated as already committed. Failures
    /// past this point are logged and swallowed: owners that already
    /// applied the write-set must not diverge from owners that failed late.
    pub(crate) fn handle_commit(&self, request: &CommitRequest) -> Result<()> {
        let entry = match self
            .commit_manager
            .commit_transaction(request.tx_id, &request.commit_version)
        {
            Some(entry) => entry,
            None => {
                debug!(
                    "commit for transaction {} without a queue entry; treated as already committed",
                    request.tx_id
                );
                return Ok(());
            }
        };
        if let Err(err) = self.apply_ready_transactions(&entry) {
            error!(
                "error while committing transaction {}: {err}",
                request.tx_id
            );
        }
        Ok(())
    }

    fn apply_ready_transactions(&self, entry: &Arc<TransactionEntry>) -> Result<()> {
        let timeout = Duration::from_millis(self.config.transaction_timeout_ms);
        entry.await_until_ready_to_commit(timeout)?;
        if entry.is_committed() {
            // Another thread's batch carried this transaction.
            return Ok(());
        }

        let to_commit = self.commit_manager.get_transactions_to_commit();
        let Some(first) = to_commit.first() else {
            return Err(SeleneError::IllegalState(
                "released to commit but no transaction is ready".into(),
            ));
        };
        if first.tx_id() != entry.tx_id() {
            return Err(SeleneError::IllegalState(format!(
                "transaction {} released to commit behind transaction {}",
                entry.tx_id(),
                first.tx_id()
            )));
        }

        let mut batch = Vec::with_capacity(to_commit.len());
        let mut sub_version = self.commit_log.next_sub_version_for(&first.version())?;
        for ready in &to_commit {
            let write_version = self
                .generator
                .convert_to_write(&ready.version(), sub_version);
            if let Err(err) = self.apply_modifications(ready.modifications(), &write_version) {
                error!(
                    "failed to apply write-set of transaction {}: {err}",
                    ready.tx_id()
                );
            }
            batch.push(CommittedTransaction::new(
                ready.tx_id(),
                write_version.vector().clone(),
                sub_version,
                ready.modifications().affected_keys(),
                ready.concurrent_clock(),
            ));
            ready.committed();
            sub_version += 1;
        }
        self.commit_manager.transaction_committed(&batch)?;
        Ok(())
    }

    fn apply_modifications(
        &self,
        modifications: &Modifications,
        version: &WriteVersion,
    ) -> Result<()> {
        if modifications.clear {
            self.container.clear_all(version)?;
        }
        for (key, value) in &modifications.writes {
            if !self.distribution.is_local_owner(key) {
                continue;
            }
            let payload = value.as_ref().map(|bytes| Arc::new(bytes.clone()));
            self.container.commit(key, payload, version)?;
        }
        Ok(())
    }

    /// Abort path; releases the transaction's queue slot if it has one.
    /// Safe to deliver more than once.
    pub(crate) fn handle_rollback(&self, request: &RollbackRequest) -> Result<()> {
        self.commit_manager.rollback_transaction(request.tx_id);
        Ok(())
    }
}

/// One node of the replicated store.
///
/// Owns the version generator, the commit log, the data container and the
/// commit manager, and exposes the two faces of the commit protocol:
/// [`Selene::begin_transaction`] for transactions originated here, and the
/// `handle_*` methods that a transport implementation calls on behalf of
/// remote coordinators.
pub struct Selene {
    components: Arc<NodeComponents>,
}

impl Selene {
    /// Creates a node with the default hash-based key ownership and no
    /// transport (sufficient for a single-node deployment).
    pub fn new(config: SeleneConfig) -> Self {
        let distribution: Arc<dyn Distribution> = Arc::new(HashDistribution::new(
            config.node_id,
            config.members.clone(),
            config.replication_degree,
        ));
        Self::with_collaborators(config, distribution, None)
    }

    /// Creates a node with externally provided collaborators.
    pub fn with_collaborators(
        config: SeleneConfig,
        distribution: Arc<dyn Distribution>,
        transport: Option<Arc<dyn ReplicationTransport>>,
    ) -> Self {
        let generator = Arc::new(VersionGenerator::new(
            config.node_id,
            config.members.clone(),
        ));
        let commit_log = Arc::new(CommitLog::new(generator.clone(), config.isolation));
        let container = Arc::new(DataContainer::new(generator.clone()));
        let commit_manager = Arc::new(TransactionCommitManager::new(
            generator.clone(),
            commit_log.clone(),
        ));
        Self {
            components: Arc::new(NodeComponents {
                config,
                generator,
                commit_log,
                container,
                commit_manager,
                distribution,
                transport,
                tx_counter: AtomicU64::new(0),
            }),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.components.config.node_id
    }

    /// Starts a new transaction reading from the current version.
    pub fn begin_transaction(&self) -> Result<Transaction> {
        let snapshot = self.components.commit_log.get_current_version()?;
        let tx_id = self.components.next_tx_id();
        debug!("transaction {tx_id} started at {snapshot}");
        Ok(Transaction::new(tx_id, self.components.clone(), snapshot))
    }

    /// Non-transactional read of the newest committed value of `key`.
    pub fn get(&self, key: &DataKey) -> Option<Arc<Value>> {
        self.components.container.read(key, None).into_data()
    }

    /// Server side of the prepare phase; called by transports on behalf of
    /// remote coordinators.
    pub fn handle_prepare(&self, request: &PrepareRequest) -> Result<VersionVector> {
        self.components.handle_prepare(request)
    }

    /// Server side of the commit phase.
    pub fn handle_commit(&self, request: &CommitRequest) -> Result<()> {
        self.components.handle_commit(request)
    }

    /// Server side of the rollback path.
    pub fn handle_rollback(&self, request: &RollbackRequest) -> Result<()> {
        self.components.handle_rollback(request)
    }

    pub fn commit_log(&self) -> &Arc<CommitLog> {
        &self.components.commit_log
    }

    pub fn container(&self) -> &Arc<DataContainer> {
        &self.components.container
    }

    pub fn commit_manager(&self) -> &Arc<TransactionCommitManager> {
        &self.components.commit_manager
    }

    pub fn version_generator(&self) -> &Arc<VersionGenerator> {
        &self.components.generator
    }

    /// Writes the commit-log chain to `path` for diagnosis.
    pub fn dump_commit_log(&self, path: &Path) -> Result<()> {
        self.components.commit_log.dump_to(path)
    }

    /// Cancels every pending wait on the node; blocked transactions return
    /// [`SeleneError::Interrupted`].
    pub fn stop(&self) {
        self.components.commit_log.stop();
    }
}
