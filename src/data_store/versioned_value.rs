use std::sync::Arc;

use crate::version::WriteVersion;

/// The key type for data items in the store.
pub type DataKey = String;

/// Value payloads are opaque bytes; the transactional core never inspects
/// them.
pub type Value = Vec<u8>;

/// One committed version of a data item: the payload (or a tombstone for a
/// deletion) together with the write version it was committed under.
#[derive(Debug, Clone)]
pub struct VersionedValue {
    data: Option<Arc<Value>>,
    version: WriteVersion,
}

impl VersionedValue {
    /// Creates a new `VersionedValue` holding a payload.
    pub fn new(data: Arc<Value>, version: WriteVersion) -> Self {
        Self {
            data: Some(data),
            version,
        }
    }

    /// Creates a tombstone marking the item deleted at `version`.
    pub fn tombstone(version: WriteVersion) -> Self {
        Self {
            data: None,
            version,
        }
    }

    /// Returns the payload, or `None` for a tombstone.
    pub fn data(&self) -> Option<&Arc<Value>> {
        self.data.as_ref()
    }

    /// Returns the version this value was committed under.
    pub fn version(&self) -> &WriteVersion {
        &self.version
    }

    pub fn is_tombstone(&self) -> bool {
        self.data.is_none()
    }
}
