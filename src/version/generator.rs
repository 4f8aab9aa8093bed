use std::sync::Arc;

use ahash::AHashMap as HashMap;
use log::warn;
use parking_lot::RwLock;

use crate::distribution::NodeId;
use crate::errors::{Result, SeleneError};
use crate::version::read::ReadVersion;
use crate::version::vector::{VersionVector, NON_EXISTING};
use crate::version::write::WriteVersion;

/// The cluster membership under which a set of vector versions was
/// generated. Coordinates of a [`VersionVector`] with the same `view_id`
/// are indexed by position in `members`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSnapshot {
    view_id: u64,
    members: Vec<NodeId>,
}

impl ClusterSnapshot {
    pub fn new(view_id: u64, members: Vec<NodeId>) -> Self {
        Self { view_id, members }
    }

    pub fn view_id(&self) -> u64 {
        self.view_id
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.members.iter().position(|member| *member == node)
    }
}

struct GeneratorInner {
    current: Arc<ClusterSnapshot>,
    local_index: usize,
    /// Superseded snapshots, kept so historical vectors can still be
    /// projected onto the current view by member identity.
    history: HashMap<u64, Arc<ClusterSnapshot>>,
}

/// Factory and calculator for vector versions on one node.
///
/// The generator owns the current [`ClusterSnapshot`] and is the only
/// component that knows which coordinate belongs to the local node. All
/// cross-snapshot work goes through [`VersionGenerator::updated_version`],
/// which projects a historical vector onto the current view; raw
/// comparisons across views fail with [`SeleneError::CrossSnapshot`].
pub struct VersionGenerator {
    local_node: NodeId,
    inner: RwLock<GeneratorInner>,
}

impl VersionGenerator {
    /// Creates a generator for `local_node` under the initial membership.
    ///
    /// # Panics
    ///
    /// Panics when `local_node` is not listed in `members`; that is a
    /// configuration bug, not a runtime condition.
    pub fn new(local_node: NodeId, members: Vec<NodeId>) -> Self {
        let snapshot = Arc::new(ClusterSnapshot::new(1, members));
        let local_index = match snapshot.index_of(local_node) {
            Some(index) => index,
            None => panic!("local node {local_node} is not a cluster member"),
        };
        let mut history = HashMap::new();
        history.insert(snapshot.view_id(), snapshot.clone());
        Self {
            local_node,
            inner: RwLock::new(GeneratorInner {
                current: snapshot,
                local_index,
                history,
            }),
        }
    }

    pub fn local_node(&self) -> NodeId {
        self.local_node
    }

    /// Index of the local node's coordinate in the current snapshot.
    pub fn local_index(&self) -> usize {
        self.inner.read().local_index
    }

    pub fn cluster_snapshot(&self) -> Arc<ClusterSnapshot> {
        self.inner.read().current.clone()
    }

    /// Installs a new cluster membership. Vectors generated under previous
    /// views remain projectable; membership agreement itself is the
    /// responsibility of an external view-change protocol.
    pub fn install_cluster_snapshot(&self, members: Vec<NodeId>) {
        let mut inner = self.inner.write();
        let view_id = inner.current.view_id() + 1;
        let snapshot = Arc::new(ClusterSnapshot::new(view_id, members));
        let local_index = match snapshot.index_of(self.local_node) {
            Some(index) => index,
            None => panic!("local node {} left its own cluster view", self.local_node),
        };
        inner.history.insert(view_id, snapshot.clone());
        inner.current = snapshot;
        inner.local_index = local_index;
    }

    /// A fresh vector with every coordinate zero under the current view.
    pub fn generate_new(&self) -> VersionVector {
        let inner = self.inner.read();
        VersionVector::new(inner.current.view_id(), vec![0; inner.current.len()])
    }

    /// Projects `version` onto the current cluster snapshot: surviving
    /// members keep their counter, members new to the view get
    /// [`NON_EXISTING`].
    pub fn updated_version(&self, version: &VersionVector) -> VersionVector {
        let inner = self.inner.read();
        if version.view_id() == inner.current.view_id() {
            return version.clone();
        }
        let Some(source) = inner.history.get(&version.view_id()).cloned() else {
            warn!(
                "no membership recorded for view {}; projecting as empty",
                version.view_id()
            );
            return VersionVector::new(
                inner.current.view_id(),
                vec![NON_EXISTING; inner.current.len()],
            );
        };
        let counters = inner
            .current
            .members()
            .iter()
            .map(|member| match source.index_of(*member) {
                Some(index) => version.get(index),
                None => NON_EXISTING,
            })
            .collect();
        VersionVector::new(inner.current.view_id(), counters)
    }

    /// Coordinate-wise maximum over the given versions, each projected onto
    /// the current view first. [`NON_EXISTING`] coordinates are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SeleneError::IllegalState`] for an empty input.
    pub fn merge_and_max(&self, versions: &[VersionVector]) -> Result<VersionVector> {
        let mut iter = versions.iter();
        let Some(first) = iter.next() else {
            return Err(SeleneError::IllegalState(
                "cannot merge an empty set of versions".into(),
            ));
        };
        let mut merged = self.updated_version(first);
        for version in iter {
            merged = merged.merge_max(&self.updated_version(version))?;
        }
        Ok(merged)
    }

    /// Wraps `version` as a [`ReadVersion`] with an empty not-visible set.
    pub fn convert_to_read(&self, version: &VersionVector) -> ReadVersion {
        let projected = self.updated_version(version);
        ReadVersion::new(projected, self.local_index())
    }

    /// Tags `version` with an explicit sub-version for commit ordering.
    pub fn convert_to_write(&self, version: &VersionVector, sub_version: u64) -> WriteVersion {
        WriteVersion::new(self.updated_version(version), sub_version)
    }

    /// Copy of `version` with the local node's counter replaced.
    pub fn set_local_counter(&self, version: &VersionVector, value: i64) -> VersionVector {
        let projected = self.updated_version(version);
        projected.with_counter(self.local_index(), value)
    }

    /// The local node's counter in `version`, after projection.
    pub fn local_counter_of(&self, version: &VersionVector) -> i64 {
        let inner = self.inner.read();
        if version.view_id() == inner.current.view_id() {
            return version.get(inner.local_index);
        }
        drop(inner);
        self.updated_version(version).get(self.local_index())
    }

    /// Derives the commit version from the merged prepare votes: the commit
    /// value is the maximum counter among the write-owners' coordinates,
    /// and every write-owner coordinate is raised to it. Non-owner
    /// coordinates keep their merged value.
    pub fn calculate_commit_version(
        &self,
        merged_votes: &VersionVector,
        write_owners: &[NodeId],
    ) -> VersionVector {
        let projected = self.updated_version(merged_votes);
        let snapshot = self.cluster_snapshot();
        let owner_indexes: Vec<usize> = write_owners
            .iter()
            .filter_map(|owner| snapshot.index_of(*owner))
            .collect();
        let commit_value = owner_indexes
            .iter()
            .map(|index| projected.get(*index))
            .filter(|counter| *counter != NON_EXISTING)
            .max()
            .unwrap_or(0);
        let mut result = projected;
        for index in owner_indexes {
            result = result.with_counter(index, commit_value);
        }
        result
    }
}
