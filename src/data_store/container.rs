use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use log::trace;
use parking_lot::RwLock;

use crate::data_store::versioned_value::{DataKey, Value, VersionedValue};
use crate::distribution::Distribution;
use crate::errors::{Result, SeleneError};
use crate::version::{ReadVersion, VersionGenerator, VersionVector, WriteVersion, NON_EXISTING};

/// The outcome of reading a key under a snapshot.
///
/// Besides the payload, carries the metadata the transaction state machine
/// needs: the creation version of the entry that was served (so the
/// transaction's snapshot can advance to cover it) and whether that entry
/// is the most recent committed version of the key.
#[derive(Debug)]
pub struct VersionedRead {
    data: Option<Arc<Value>>,
    version: Option<VersionVector>,
    most_recent: bool,
}

impl VersionedRead {
    fn miss(most_recent: bool) -> Self {
        Self {
            data: None,
            version: None,
            most_recent,
        }
    }

    pub fn data(&self) -> Option<&Arc<Value>> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<Arc<Value>> {
        self.data
    }

    /// Creation version of the entry that was read, `None` on a miss.
    pub fn version(&self) -> Option<&VersionVector> {
        self.version.as_ref()
    }

    /// Whether the entry served is the newest committed version of the key.
    pub fn is_most_recent(&self) -> bool {
        self.most_recent
    }
}

#[derive(Default)]
struct VersionChain {
    /// Committed versions, newest first. Entries are only prepended.
    versions: RwLock<Vec<VersionedValue>>,
}

/// Multi-version in-memory data container.
///
/// Keys map to per-key version chains over a lock-free skip map; each chain
/// is guarded by its own read-write lock. Reads under a [`ReadVersion`] are
/// snapshot-consistent, writes under a [`WriteVersion`] are atomic per key.
pub struct DataContainer {
    generator: Arc<VersionGenerator>,
    chains: SkipMap<DataKey, Arc<VersionChain>>,
}

impl DataContainer {
    pub fn new(generator: Arc<VersionGenerator>) -> Self {
        Self {
            generator,
            chains: SkipMap::new(),
        }
    }

    /// Reads `key` under `read_version`, or the newest committed version
    /// when no snapshot is given.
    pub fn read(&self, key: &DataKey, read_version: Option<&ReadVersion>) -> VersionedRead {
        let Some(chain) = self.chains.get(key) else {
            return VersionedRead::miss(true);
        };
        let versions = chain.value().versions.read();
        if versions.is_empty() {
            return VersionedRead::miss(true);
        }

        match read_version {
            None => {
                let newest = &versions[0];
                VersionedRead {
                    data: newest.data().cloned(),
                    version: Some(newest.version().vector().clone()),
                    most_recent: true,
                }
            }
            Some(snapshot) => {
                for (position, value) in versions.iter().enumerate() {
                    let local_counter = self.generator.local_counter_of(value.version().vector());
                    if snapshot.is_not_visible(local_counter, value.version().sub_version()) {
                        trace!(
                            "read({key}) skipping version {} (not visible at {})",
                            value.version(),
                            snapshot.vector()
                        );
                        continue;
                    }
                    return VersionedRead {
                        data: value.data().cloned(),
                        version: Some(value.version().vector().clone()),
                        most_recent: position == 0,
                    };
                }
                // Entries exist but none is visible: the key has data the
                // snapshot cannot see, so this miss is not the most recent
                // state.
                VersionedRead::miss(false)
            }
        }
    }

    /// Installs a committed value (or a tombstone for `None`) for `key`
    /// under `version`.
    ///
    /// # Errors
    ///
    /// Returns [`SeleneError::CommitApplyFailed`] when the write version
    /// carries no counter for the local node; committed versions must have
    /// been stamped by the prepare/commit pipeline.
    pub fn commit(
        &self,
        key: &DataKey,
        value: Option<Arc<Value>>,
        version: &WriteVersion,
    ) -> Result<()> {
        if self.generator.local_counter_of(version.vector()) == NON_EXISTING {
            return Err(SeleneError::CommitApplyFailed(format!(
                "write version {version} has no local counter"
            )));
        }
        trace!("commit({key}) at {version}");
        let chain = self
            .chains
            .get_or_insert_with(key.clone(), || Arc::new(VersionChain::default()));
        let versioned = match value {
            Some(data) => VersionedValue::new(data, version.clone()),
            None => VersionedValue::tombstone(version.clone()),
        };
        chain.value().versions.write().insert(0, versioned);
        Ok(())
    }

    /// Tombstones every key under `version` (a transaction-scoped clear).
    pub fn clear_all(&self, version: &WriteVersion) -> Result<()> {
        if self.generator.local_counter_of(version.vector()) == NON_EXISTING {
            return Err(SeleneError::CommitApplyFailed(format!(
                "write version {version} has no local counter"
            )));
        }
        trace!("clear_all at {version}");
        for entry in self.chains.iter() {
            entry
                .value()
                .versions
                .write()
                .insert(0, VersionedValue::tombstone(version.clone()));
        }
        Ok(())
    }

    /// Re-checks, for every locally-owned key in `reads`, that the version
    /// observed by the transaction is still the newest committed version.
    pub fn validate_read_set(
        &self,
        reads: &[(DataKey, Option<VersionVector>)],
        distribution: &dyn Distribution,
    ) -> Result<()> {
        for (key, read_version) in reads {
            if !distribution.is_local_owner(key) {
                continue;
            }
            let newest = self.most_recent(key).map(|value| {
                self.generator.updated_version(value.version().vector())
            });
            let observed = read_version
                .as_ref()
                .map(|version| self.generator.updated_version(version));
            if newest != observed {
                return Err(SeleneError::ReadWriteConflict(key.clone()));
            }
        }
        Ok(())
    }

    /// The newest committed version of `key`, if any.
    pub fn most_recent(&self, key: &DataKey) -> Option<VersionedValue> {
        let chain = self.chains.get(key)?;
        let versions = chain.value().versions.read();
        versions.first().cloned()
    }

    /// Number of keys with at least one committed version.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
