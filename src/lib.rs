pub mod clock;
pub mod commit_log;
pub mod commit_manager;
pub mod config;
pub mod data_store;
pub mod distribution;
pub mod errors;
pub mod queue;
pub mod selene;
pub mod transaction;
pub mod transport;
pub mod version;

// Re-export key types and structs for easier access
pub use commit_log::{CommitLog, VersionEntry};
pub use commit_manager::{CommittedTransaction, TransactionCommitManager};
pub use config::SeleneConfig;
pub use data_store::{DataContainer, DataKey, Value, VersionedValue};
pub use distribution::{Distribution, HashDistribution, NodeId};
pub use errors::{Result, SeleneError};
pub use queue::{SortedTransactionQueue, TransactionEntry, TransactionState};
pub use selene::Selene;
pub use transaction::Transaction;
pub use transport::{
    CommitRequest, Modifications, PrepareRequest, ReplicationTransport, RollbackRequest,
};
pub use version::{
    ClusterSnapshot, ReadVersion, VersionGenerator, VersionRelation, VersionVector, WriteVersion,
    NON_EXISTING,
};

// Define the TransactionIsolation enum here as it's a core part of the public API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
///
/// Transaction isolation levels for the transactional core
pub enum TransactionIsolation {
    ///
    /// [TransactionIsolation::ReadCommitted] isolation level means that a committed value is
    /// provided for every read operation, with no further guarantee: if the
    /// same key is accessed more than once within the same transaction, it
    /// may have a different value every time since the store may be updated
    /// concurrently by other transactions.
    ReadCommitted,
    ///
    /// [TransactionIsolation::RepeatableRead] isolation level means that if a value was read once
    /// within a transaction, all consecutive reads provide the same
    /// in-transaction value.
    RepeatableRead,
    ///
    /// [TransactionIsolation::Serializable] isolation level means that all transactions occur as
    /// if they had executed serially, one after the other. This is the only
    /// level under which the multiversion machinery (commit log, sorted
    /// commit queue, vector-stamped snapshots) is enabled; a node
    /// configured with a weaker level keeps its commit log disabled and
    /// transactional operations report an illegal state.
    Serializable,
}
