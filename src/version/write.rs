use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::vector::VersionVector;

/// The version stamped onto a committed cache entry: a vector plus the
/// sub-version tag that orders transactions which were assigned the same
/// vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteVersion {
    vector: VersionVector,
    sub_version: u64,
}

impl WriteVersion {
    pub(crate) fn new(vector: VersionVector, sub_version: u64) -> Self {
        Self {
            vector,
            sub_version,
        }
    }

    pub fn vector(&self) -> &VersionVector {
        &self.vector
    }

    pub fn sub_version(&self) -> u64 {
        self.sub_version
    }
}

impl fmt::Display for WriteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.vector, self.sub_version)
    }
}
