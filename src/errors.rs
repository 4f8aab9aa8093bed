use thiserror::Error;

/// Represents the possible errors that can occur within the Selene
/// transactional core.
///
/// This enum provides a centralized way to handle and categorize errors,
/// making it easier to understand and debug issues that arise during
/// transaction processing, version arithmetic, or commit ordering.
#[derive(Error, Debug)]
pub enum SeleneError {
    /// An operation was invoked on a component that is not in a state to
    /// serve it. The main source is the commit log, which is only enabled
    /// when the node is configured for serializable isolation.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// A read-write transaction observed a value that is no longer the most
    /// recent committed version. Writers must read the latest committed
    /// state; the transaction has to roll back.
    #[error("read-write transaction read an old value and must roll back")]
    ReadOldValue,

    /// Read-set validation at prepare time found that a key read by the
    /// transaction has since been overwritten by a committed transaction.
    #[error("read-set validation failed for key {0}")]
    ReadWriteConflict(String),

    /// Two versions from different cluster snapshots were compared or merged
    /// without being projected onto a common snapshot first. This is a
    /// programmer bug, not a runtime condition.
    #[error("cannot relate versions from different cluster snapshots (view {0} vs view {1})")]
    CrossSnapshot(u64, u64),

    /// A bounded wait on a version install or a commit-queue slot expired.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// A suspension point was cancelled, typically because the node is
    /// shutting down.
    #[error("interrupted while waiting for {0}")]
    Interrupted(String),

    /// Applying a committed write-set to the data container failed. Callers
    /// on the commit path log this and continue; replicas that already
    /// applied the write-set must not diverge from ones that failed late.
    #[error("failed to apply committed write-set: {0}")]
    CommitApplyFailed(String),

    /// An error reported by the replication transport while sending a
    /// prepare, commit or rollback to a peer.
    #[error("transport error: {0}")]
    Transport(String),

    /// An I/O error from a diagnostic operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenient type alias for the standard `Result` with `SeleneError` as
/// the error type.
pub type Result<T> = std::result::Result<T, SeleneError>;
