use std::sync::Arc;

use ahash::AHashSet as HashSet;
use log::{debug, trace};
use parking_lot::Mutex;

use crate::commit_log::CommitLog;
use crate::data_store::DataKey;
use crate::errors::Result;
use crate::queue::{SortedTransactionQueue, TransactionEntry};
use crate::transport::Modifications;
use crate::version::{VersionGenerator, VersionVector};

/// A transaction that finished the commit pipeline: the version and
/// sub-version it was installed under, the keys it modified (`None` for a
/// clear, meaning all keys) and the concurrent-clock number it held in the
/// queue.
#[derive(Debug, Clone)]
pub struct CommittedTransaction {
    tx_id: u64,
    version: VersionVector,
    sub_version: u64,
    keys_modified: Option<Vec<DataKey>>,
    concurrent_clock: u64,
}

impl CommittedTransaction {
    pub fn new(
        tx_id: u64,
        version: VersionVector,
        sub_version: u64,
        keys_modified: Option<Vec<DataKey>>,
        concurrent_clock: u64,
    ) -> Self {
        Self {
            tx_id,
            version,
            sub_version,
            keys_modified,
            concurrent_clock,
        }
    }

    pub fn tx_id(&self) -> u64 {
        self.tx_id
    }

    pub fn version(&self) -> &VersionVector {
        &self.version
    }

    pub fn sub_version(&self) -> u64 {
        self.sub_version
    }

    /// Keys modified by the transaction; `None` means all keys.
    pub fn keys_modified(&self) -> Option<&[DataKey]> {
        self.keys_modified.as_deref()
    }

    pub fn concurrent_clock(&self) -> u64 {
        self.concurrent_clock
    }
}

/// Bridges the prepare phase, the sorted queue and the commit log.
///
/// Prepares stamp a prepare version whose local counter is strictly
/// monotonic, so the sequence of vectors handed to the commit log is
/// strictly increasing in the local coordinate; that monotonicity is what
/// lets readers observe a consistent causal snapshot.
pub struct TransactionCommitManager {
    generator: Arc<VersionGenerator>,
    commit_log: Arc<CommitLog>,
    queue: SortedTransactionQueue,
    last_prepared: Mutex<i64>,
    committed_ids: Mutex<HashSet<u64>>,
}

impl TransactionCommitManager {
    pub fn new(generator: Arc<VersionGenerator>, commit_log: Arc<CommitLog>) -> Self {
        let queue = SortedTransactionQueue::new(generator.clone());
        Self {
            generator,
            commit_log,
            queue,
            last_prepared: Mutex::new(0),
            committed_ids: Mutex::new(HashSet::new()),
        }
    }

    /// Stamps the prepare version for a read-write transaction and inserts
    /// it into the queue. Returns the vote (the stamped prepare version)
    /// and the queue entry.
    ///
    /// The local counter advances past both its own previous value and the
    /// counter visible in the current version, so prepare versions are
    /// strictly increasing on this node even after commit versions overtake
    /// earlier prepares.
    pub fn prepare_transaction(
        &self,
        tx_id: u64,
        tx_version: &VersionVector,
        modifications: Modifications,
    ) -> Result<(VersionVector, Arc<TransactionEntry>)> {
        let current = self.commit_log.get_current_version()?;
        let base = self
            .generator
            .merge_and_max(&[current, tx_version.clone()])?;
        let prepare_version = {
            let mut last_prepared = self.last_prepared.lock();
            *last_prepared = (*last_prepared).max(self.generator.local_counter_of(&base)) + 1;
            self.generator.set_local_counter(&base, *last_prepared)
        };
        let entry = self
            .queue
            .enqueue(tx_id, prepare_version.clone(), modifications);
        debug!(
            "transaction {tx_id} prepared at {prepare_version}, clock {}",
            entry.concurrent_clock()
        );
        Ok((prepare_version, entry))
    }

    /// Read-only transactions skip the queue entirely; they commit against
    /// their snapshot without entering the serialization order.
    pub fn prepare_read_only_transaction(&self, tx_id: u64) {
        debug!("read-only transaction {tx_id} prepared without queueing");
    }

    /// Records the commit version for a queued transaction: re-orders its
    /// entry under the commit version and marks it ready to commit.
    ///
    /// Returns `None` for a transaction that is not queued, which treats a
    /// duplicate or late commit as already committed.
    pub fn commit_transaction(
        &self,
        tx_id: u64,
        commit_version: &VersionVector,
    ) -> Option<Arc<TransactionEntry>> {
        let entry = self.queue.update_version(tx_id, commit_version)?;
        self.queue.mark_ready_to_commit(&entry);
        trace!("transaction {tx_id} ready to commit at {commit_version}");
        Some(entry)
    }

    /// The contiguous ready-to-commit prefix of the queue.
    pub fn get_transactions_to_commit(&self) -> Vec<Arc<TransactionEntry>> {
        self.queue.ready_prefix()
    }

    /// Links a committed batch into the commit log and drains the entries
    /// from the queue, in order. Transactions already recorded are skipped,
    /// so replaying a batch leaves the log unchanged.
    pub fn transaction_committed(&self, batch: &[CommittedTransaction]) -> Result<()> {
        let fresh: Vec<CommittedTransaction> = {
            let mut committed_ids = self.committed_ids.lock();
            batch
                .iter()
                .filter(|transaction| committed_ids.insert(transaction.tx_id()))
                .cloned()
                .collect()
        };
        if fresh.is_empty() {
            return Ok(());
        }
        self.commit_log.insert_new_committed_versions(&fresh)?;
        for transaction in &fresh {
            self.queue.drain_committed(transaction.tx_id())?;
        }
        Ok(())
    }

    /// Removes the transaction from the queue, releasing its latch. Safe to
    /// call for transactions that never queued.
    pub fn rollback_transaction(&self, tx_id: u64) {
        if self.queue.rollback(tx_id).is_some() {
            debug!("transaction {tx_id} rolled back out of the commit queue");
        }
    }

    /// The queue, for diagnostics.
    pub fn queue(&self) -> &SortedTransactionQueue {
        &self.queue
    }
}
