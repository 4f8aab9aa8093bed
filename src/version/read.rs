use ahash::AHashSet as HashSet;

use crate::version::vector::VersionVector;

/// A snapshot vector prepared for serving reads on this node.
///
/// Besides the vector itself, a read version carries the set of
/// *not-visible sub-versions*: `(local_counter, sub_version)` pairs of
/// committed entries that share the reader's per-node counter but must not
/// be observed, either because their full vector is not below-or-equal the
/// reader's snapshot, or because they are coincident sub-versions above
/// the reader's horizon.
#[derive(Debug, Clone)]
pub struct ReadVersion {
    vector: VersionVector,
    local_index: usize,
    not_visible: HashSet<(i64, u64)>,
}

impl ReadVersion {
    pub(crate) fn new(vector: VersionVector, local_index: usize) -> Self {
        Self {
            vector,
            local_index,
            not_visible: HashSet::new(),
        }
    }

    pub fn vector(&self) -> &VersionVector {
        &self.vector
    }

    /// The reader's counter for the local node.
    pub fn local_counter(&self) -> i64 {
        self.vector.get(self.local_index)
    }

    pub(crate) fn add_not_visible_sub_version(&mut self, local_counter: i64, sub_version: u64) {
        self.not_visible.insert((local_counter, sub_version));
    }

    /// True when the committed entry identified by `(local_counter,
    /// sub_version)` must be skipped by this reader.
    pub fn is_not_visible(&self, local_counter: i64, sub_version: u64) -> bool {
        local_counter > self.local_counter()
            || self.not_visible.contains(&(local_counter, sub_version))
    }

    /// Number of not-visible pairs collected for this reader.
    pub fn not_visible_len(&self) -> usize {
        self.not_visible.len()
    }

    pub fn contains_not_visible(&self, local_counter: i64, sub_version: u64) -> bool {
        self.not_visible.contains(&(local_counter, sub_version))
    }
}
