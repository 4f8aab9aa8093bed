use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, trace};
use parking_lot::Mutex;

use crate::clock::CommitClock;
use crate::errors::{Result, SeleneError};
use crate::transport::Modifications;
use crate::version::{VersionGenerator, VersionRelation, VersionVector};

/// Lifecycle of a queued transaction.
///
/// Transitions are monotonic: `Pending` to `ReadyToCommit` to `Committed`.
/// A rollback is allowed from any state except `Committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    ReadyToCommit,
    Committed,
    RolledBack,
}

struct EntryInner {
    version: VersionVector,
    state: TransactionState,
}

/// A transaction's slot in the commit queue.
///
/// Carries the version it is ordered under (the prepare version, replaced
/// by the commit version once all owners have voted), the concurrent-clock
/// tiebreak, the write-set to apply at commit, and a one-shot latch that
/// releases the committing thread when the entry is ready *and* at the
/// head of the queue.
pub struct TransactionEntry {
    tx_id: u64,
    concurrent_clock: u64,
    modifications: Modifications,
    inner: Mutex<EntryInner>,
    ready_sender: Sender<()>,
    ready_receiver: Receiver<()>,
}

impl TransactionEntry {
    fn new(
        tx_id: u64,
        version: VersionVector,
        concurrent_clock: u64,
        modifications: Modifications,
    ) -> Self {
        let (ready_sender, ready_receiver) = bounded(1);
        Self {
            tx_id,
            concurrent_clock,
            modifications,
            inner: Mutex::new(EntryInner {
                version,
                state: TransactionState::Pending,
            }),
            ready_sender,
            ready_receiver,
        }
    }

    pub fn tx_id(&self) -> u64 {
        self.tx_id
    }

    pub fn concurrent_clock(&self) -> u64 {
        self.concurrent_clock
    }

    pub fn modifications(&self) -> &Modifications {
        &self.modifications
    }

    /// The version the entry is currently ordered under.
    pub fn version(&self) -> VersionVector {
        self.inner.lock().version.clone()
    }

    pub fn state(&self) -> TransactionState {
        self.inner.lock().state
    }

    pub fn is_committed(&self) -> bool {
        self.state() == TransactionState::Committed
    }

    /// Marks the entry committed and releases any waiter. Called by the
    /// thread that applied this entry's write-set as part of a batch.
    pub fn committed(&self) {
        self.inner.lock().state = TransactionState::Committed;
        self.signal();
    }

    fn set_state(&self, state: TransactionState) {
        self.inner.lock().state = state;
    }

    fn set_version(&self, version: VersionVector) {
        self.inner.lock().version = version;
    }

    fn signal(&self) {
        // One-shot; a pending signal already wakes the waiter.
        let _ = self.ready_sender.try_send(());
    }

    /// Blocks until this entry is released to commit: it has become
    /// `ReadyToCommit` and reached the head of the queue, or it was
    /// committed by another thread's batch, or it was rolled back.
    ///
    /// Returns [`SeleneError::Timeout`] on expiry and
    /// [`SeleneError::Interrupted`] when the entry was rolled back or the
    /// queue went away while waiting.
    pub fn await_until_ready_to_commit(&self, timeout: Duration) -> Result<()> {
        match self.ready_receiver.recv_timeout(timeout) {
            Ok(()) => {
                if self.state() == TransactionState::RolledBack {
                    Err(SeleneError::Interrupted(format!(
                        "commit slot of rolled-back transaction {}",
                        self.tx_id
                    )))
                } else {
                    Ok(())
                }
            }
            Err(RecvTimeoutError::Timeout) => Err(SeleneError::Timeout(format!(
                "commit slot of transaction {}",
                self.tx_id
            ))),
            Err(RecvTimeoutError::Disconnected) => Err(SeleneError::Interrupted(format!(
                "commit slot of transaction {}",
                self.tx_id
            ))),
        }
    }
}

/// Per-node ordering of prepared transactions.
///
/// Entries are kept sorted by `(version, concurrent_clock, tx_id)`: the
/// vector ordering decides where it can, and the concurrent clock plus the
/// transaction id break ties among incomparable or equal vectors. Only the
/// head of the queue, once `ReadyToCommit`, may apply writes; this is the
/// serialization point for the whole node.
///
/// One mutex guards ordering and state transitions. Waiting happens on the
/// per-entry latches, never on the queue lock.
pub struct SortedTransactionQueue {
    generator: Arc<VersionGenerator>,
    clock: CommitClock,
    entries: Mutex<Vec<Arc<TransactionEntry>>>,
}

impl SortedTransactionQueue {
    pub fn new(generator: Arc<VersionGenerator>) -> Self {
        Self {
            generator,
            clock: CommitClock::new(),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn compare(&self, left: &TransactionEntry, right: &TransactionEntry) -> Ordering {
        let left_version = self.generator.updated_version(&left.version());
        let right_version = self.generator.updated_version(&right.version());
        let by_version = match left_version.compare(&right_version) {
            Ok(VersionRelation::Before) | Ok(VersionRelation::BeforeOrEqual) => Ordering::Less,
            Ok(VersionRelation::After) | Ok(VersionRelation::AfterOrEqual) => Ordering::Greater,
            Ok(VersionRelation::Equal) | Ok(VersionRelation::Concurrent) | Err(_) => {
                Ordering::Equal
            }
        };
        by_version
            .then(left.concurrent_clock.cmp(&right.concurrent_clock))
            .then(left.tx_id.cmp(&right.tx_id))
    }

    fn insert_sorted(&self, entries: &mut Vec<Arc<TransactionEntry>>, entry: Arc<TransactionEntry>) {
        let mut position = entries.len();
        while position > 0 && self.compare(&entries[position - 1], &entry) == Ordering::Greater {
            position -= 1;
        }
        entries.insert(position, entry);
    }

    fn signal_head_if_ready(entries: &[Arc<TransactionEntry>]) {
        if let Some(head) = entries.first() {
            if head.state() == TransactionState::ReadyToCommit {
                head.signal();
            }
        }
    }

    /// Inserts a prepared transaction in `Pending` state, assigning it the
    /// next concurrent-clock number. Duplicate delivery of the same
    /// transaction id returns the existing entry.
    pub fn enqueue(
        &self,
        tx_id: u64,
        prepare_version: VersionVector,
        modifications: Modifications,
    ) -> Arc<TransactionEntry> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.iter().find(|entry| entry.tx_id == tx_id) {
            debug!("transaction {tx_id} is already queued");
            return existing.clone();
        }
        let concurrent_clock = self.clock.next();
        trace!("enqueue({tx_id}) at {prepare_version}, clock {concurrent_clock}");
        let entry = Arc::new(TransactionEntry::new(
            tx_id,
            prepare_version,
            concurrent_clock,
            modifications,
        ));
        self.insert_sorted(&mut entries, entry.clone());
        entry
    }

    /// Re-orders `tx_id` under its commit version. Returns the entry, or
    /// `None` when the transaction is not queued (already drained).
    pub fn update_version(
        &self,
        tx_id: u64,
        commit_version: &VersionVector,
    ) -> Option<Arc<TransactionEntry>> {
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|entry| entry.tx_id == tx_id)?;
        let entry = entries.remove(position);
        entry.set_version(commit_version.clone());
        trace!("update_version({tx_id}) to {commit_version}");
        self.insert_sorted(&mut entries, entry.clone());
        Self::signal_head_if_ready(&entries);
        Some(entry)
    }

    /// Transitions the entry to `ReadyToCommit`; if it sits at the head,
    /// its latch fires.
    pub fn mark_ready_to_commit(&self, entry: &Arc<TransactionEntry>) {
        let entries = self.entries.lock();
        entry.set_state(TransactionState::ReadyToCommit);
        trace!("mark_ready_to_commit({})", entry.tx_id);
        Self::signal_head_if_ready(&entries);
    }

    /// The head of the queue, when it is ready to commit.
    pub fn next_ready(&self) -> Option<Arc<TransactionEntry>> {
        let entries = self.entries.lock();
        entries
            .first()
            .filter(|head| head.state() == TransactionState::ReadyToCommit)
            .cloned()
    }

    /// The contiguous `ReadyToCommit` prefix from the head.
    pub fn ready_prefix(&self) -> Vec<Arc<TransactionEntry>> {
        let entries = self.entries.lock();
        entries
            .iter()
            .take_while(|entry| entry.state() == TransactionState::ReadyToCommit)
            .cloned()
            .collect()
    }

    /// Removes a committed transaction from the head. The new head's latch
    /// fires when it is already ready. Draining a transaction that is no
    /// longer queued is a no-op (duplicate delivery).
    pub fn drain_committed(&self, tx_id: u64) -> Result<()> {
        let mut entries = self.entries.lock();
        let Some(position) = entries.iter().position(|entry| entry.tx_id == tx_id) else {
            return Ok(());
        };
        if position != 0 {
            return Err(SeleneError::IllegalState(format!(
                "transaction {tx_id} drained from position {position}, not the head"
            )));
        }
        if entries[0].state() != TransactionState::Committed {
            return Err(SeleneError::IllegalState(format!(
                "transaction {tx_id} drained in state {:?}",
                entries[0].state()
            )));
        }
        entries.remove(0);
        trace!("drain_committed({tx_id})");
        Self::signal_head_if_ready(&entries);
        Ok(())
    }

    /// Removes a transaction from anywhere in the queue and releases its
    /// latch. Committed transactions cannot be rolled back.
    pub fn rollback(&self, tx_id: u64) -> Option<Arc<TransactionEntry>> {
        let mut entries = self.entries.lock();
        let position = entries.iter().position(|entry| entry.tx_id == tx_id)?;
        if entries[position].state() == TransactionState::Committed {
            return None;
        }
        let entry = entries.remove(position);
        entry.set_state(TransactionState::RolledBack);
        entry.signal();
        debug!("rollback({tx_id}) removed from queue position {position}");
        Self::signal_head_if_ready(&entries);
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Transaction ids in queue order, for diagnostics.
    pub fn order(&self) -> Vec<u64> {
        self.entries.lock().iter().map(|entry| entry.tx_id).collect()
    }
}
