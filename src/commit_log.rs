use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::commit_manager::CommittedTransaction;
use crate::data_store::DataKey;
use crate::errors::{Result, SeleneError};
use crate::version::{ReadVersion, VersionGenerator, VersionVector, NON_EXISTING};
use crate::TransactionIsolation;

/// One link of the commit-log chain: the version a transaction committed
/// under, its sub-version, and the keys it modified (`None` meaning "all
/// keys", i.e. a clear). Entries are immutable once linked; `previous`
/// points from newest to oldest.
pub struct VersionEntry {
    version: VersionVector,
    sub_version: u64,
    keys_modified: Option<Vec<DataKey>>,
    previous: Option<Arc<VersionEntry>>,
}

impl VersionEntry {
    pub fn version(&self) -> &VersionVector {
        &self.version
    }

    pub fn sub_version(&self) -> u64 {
        self.sub_version
    }

    /// Keys modified by the committing transaction; `None` means all keys.
    pub fn keys_modified(&self) -> Option<&[DataKey]> {
        self.keys_modified.as_deref()
    }

    pub fn previous(&self) -> Option<&Arc<VersionEntry>> {
        self.previous.as_ref()
    }

    fn dump_line(&self) -> String {
        match &self.keys_modified {
            Some(keys) => format!("{} = {:?}", self.version, keys),
            None => format!("{} = ALL", self.version),
        }
    }
}

struct CommitLogInner {
    current: Arc<VersionEntry>,
    most_recent: VersionVector,
    stopped: bool,
}

/// Append-only chain of committed vector versions.
///
/// The head (`current`) always carries the highest local counter; the
/// running merge-max of everything ever inserted is tracked separately as
/// the most recent version. One mutex guards the head, the merge-max and
/// the install condition; chain walks are lock-free over the immutable
/// `Arc` links after snapshotting the head under the mutex.
///
/// The log is only enabled under serializable isolation; every operation
/// on a disabled log fails with [`SeleneError::IllegalState`].
pub struct CommitLog {
    generator: Arc<VersionGenerator>,
    enabled: bool,
    inner: Mutex<CommitLogInner>,
    installed: Condvar,
}

impl CommitLog {
    pub fn new(generator: Arc<VersionGenerator>, isolation: TransactionIsolation) -> Self {
        let initial = Arc::new(VersionEntry {
            version: generator.generate_new(),
            sub_version: 0,
            keys_modified: Some(Vec::new()),
            previous: None,
        });
        let most_recent = generator.generate_new();
        Self {
            generator,
            enabled: isolation == TransactionIsolation::Serializable,
            inner: Mutex::new(CommitLogInner {
                current: initial,
                most_recent,
                stopped: false,
            }),
            installed: Condvar::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn assert_enabled(&self) -> Result<()> {
        if !self.enabled {
            return Err(SeleneError::IllegalState("commit log is not enabled".into()));
        }
        Ok(())
    }

    /// The most recent version observed locally, projected onto the current
    /// cluster snapshot. Callers observe a single atomic value.
    pub fn get_current_version(&self) -> Result<VersionVector> {
        self.assert_enabled()?;
        let inner = self.inner.lock();
        let version = self.generator.updated_version(&inner.most_recent);
        trace!("get_current_version() ==> {version}");
        Ok(version)
    }

    /// The highest version available on this node that is below-or-equal
    /// `other`.
    ///
    /// With no bound this is the current version. A bound that already has
    /// a counter for this node is returned unchanged (the caller holds a
    /// valid local coordinate); otherwise the chain is walked collecting
    /// every entry below-or-equal the bound and the merge-max of the
    /// collected versions is returned, which always has a defined local
    /// counter.
    pub fn get_available_version_less_than(
        &self,
        other: Option<&VersionVector>,
    ) -> Result<VersionVector> {
        self.assert_enabled()?;
        let Some(other) = other else {
            let inner = self.inner.lock();
            return Ok(self.generator.updated_version(&inner.most_recent));
        };

        let bound = self.generator.updated_version(other);
        if self.generator.local_counter_of(&bound) != NON_EXISTING {
            return Ok(bound);
        }

        let mut possible = Vec::new();
        let mut iterator = Some(self.snapshot_head());
        while let Some(entry) = iterator {
            let version = self.generator.updated_version(entry.version());
            if version.is_bounded_by(&bound)? {
                possible.push(version);
            }
            iterator = entry.previous().cloned();
        }
        self.generator.merge_and_max(&possible)
    }

    /// Computes the locally-consistent read version for snapshot `other`:
    /// the snapshot wrapped together with the sub-versions a reader at that
    /// snapshot must skip.
    ///
    /// A chain entry whose local counter is within the reader's horizon is
    /// not visible when its full vector is not below-or-equal the snapshot,
    /// or when it is a coincident sub-version (same vector, sub-version
    /// above the base commit).
    pub fn get_read_version(&self, other: &VersionVector) -> Result<ReadVersion> {
        self.assert_enabled()?;
        let bound = self.generator.updated_version(other);
        let mut read_version = self.generator.convert_to_read(&bound);

        let mut iterator = Some(self.snapshot_head());
        while let Some(entry) = iterator {
            let version = self.generator.updated_version(entry.version());
            let local_counter = self.generator.local_counter_of(&version);
            if local_counter <= read_version.local_counter() {
                let visible = version.is_less_or_equal(&bound)?;
                let coincident_above =
                    visible && version == bound && entry.sub_version() > 0;
                if !visible || coincident_above {
                    trace!(
                        "get_read_version({bound}) ==> {version}+{} NOT VISIBLE",
                        entry.sub_version()
                    );
                    read_version.add_not_visible_sub_version(local_counter, entry.sub_version());
                } else {
                    trace!(
                        "get_read_version({bound}) ==> {version}+{} VISIBLE",
                        entry.sub_version()
                    );
                }
            } else {
                trace!(
                    "get_read_version({bound}) ==> {version}+{} IGNORE",
                    entry.sub_version()
                );
            }
            iterator = entry.previous().cloned();
        }
        Ok(read_version)
    }

    /// Links a batch of committed transactions into the chain, in order,
    /// and wakes every version waiter.
    pub fn insert_new_committed_versions(
        &self,
        transactions: &[CommittedTransaction],
    ) -> Result<()> {
        self.assert_enabled()?;
        let mut inner = self.inner.lock();
        for transaction in transactions {
            trace!(
                "insert_new_committed_versions(...) ==> add {}",
                transaction.version()
            );
            let entry = Arc::new(VersionEntry {
                version: transaction.version().clone(),
                sub_version: transaction.sub_version(),
                keys_modified: transaction.keys_modified().map(|keys| keys.to_vec()),
                previous: Some(inner.current.clone()),
            });
            inner.most_recent = self
                .generator
                .merge_and_max(&[inner.most_recent.clone(), entry.version.clone()])?;
            inner.current = entry;
        }
        trace!(
            "insert_new_committed_versions(...) ==> head is {}",
            inner.current.version()
        );
        drop(inner);
        self.installed.notify_all();
        Ok(())
    }

    /// The sub-version the next committed batch should start from: the
    /// continuation of the head when the batch's vector coincides with it,
    /// zero otherwise. Keeps `(local counter, sub-version)` pairs unique
    /// across batches.
    pub fn next_sub_version_for(&self, version: &VersionVector) -> Result<u64> {
        self.assert_enabled()?;
        let projected = self.generator.updated_version(version);
        let inner = self.inner.lock();
        let head = self.generator.updated_version(inner.current.version());
        if head == projected {
            Ok(inner.current.sub_version() + 1)
        } else {
            Ok(0)
        }
    }

    /// Blocks until the local counter of the head reaches the local counter
    /// of `version`, or until `timeout_ms` elapses. A negative timeout
    /// waits forever; zero reports the current truth immediately.
    ///
    /// Returns whether the condition holds on return. A concurrent
    /// [`CommitLog::stop`] cancels the wait with
    /// [`SeleneError::Interrupted`].
    pub fn wait_for_version(&self, version: &VersionVector, timeout_ms: i64) -> Result<bool> {
        self.assert_enabled()?;
        let target = self.generator.local_counter_of(version);
        let mut inner = self.inner.lock();
        trace!(
            "wait_for_version({version}, {timeout_ms}) and current version is {}",
            inner.current.version()
        );

        if timeout_ms < 0 {
            loop {
                if inner.stopped {
                    return Err(SeleneError::Interrupted("version install".into()));
                }
                if self.generator.local_counter_of(inner.current.version()) >= target {
                    return Ok(true);
                }
                self.installed.wait(&mut inner);
            }
        }

        let deadline = Instant::now() + Duration::from_millis(timeout_ms as u64);
        loop {
            if inner.stopped {
                return Err(SeleneError::Interrupted("version install".into()));
            }
            let reached = self.generator.local_counter_of(inner.current.version()) >= target;
            if reached || Instant::now() >= deadline {
                trace!(
                    "wait_for_version({version}) ==> {} >= {target} ? {reached}",
                    self.generator.local_counter_of(inner.current.version())
                );
                return Ok(reached);
            }
            self.installed.wait_until(&mut inner, deadline);
        }
    }

    /// Cancels every pending wait; waiters return
    /// [`SeleneError::Interrupted`]. The log itself stays readable.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stopped = true;
        drop(inner);
        self.installed.notify_all();
    }

    /// Snapshot of the chain head for a lock-free walk.
    pub fn snapshot_head(&self) -> Arc<VersionEntry> {
        self.inner.lock().current.clone()
    }

    /// Writes the chain to `path`, one `<version> = <keys-or-ALL>` line per
    /// entry, newest first. Diagnostic only.
    pub fn dump_to(&self, path: &Path) -> Result<()> {
        self.assert_enabled()?;
        let mut writer = BufWriter::new(File::create(path)?);
        let mut iterator = Some(self.snapshot_head());
        while let Some(entry) = iterator {
            writeln!(writer, "{}", entry.dump_line())?;
            iterator = entry.previous().cloned();
        }
        writer.flush()?;
        Ok(())
    }
}
