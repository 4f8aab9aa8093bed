use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SeleneError};

/// Sentinel counter value for a node that has no coordinate in a vector,
/// e.g. a node that joined the cluster after the vector was generated.
pub const NON_EXISTING: i64 = -1;

/// Outcome of comparing two vector versions.
///
/// The vector ordering is partial: two versions generated on different
/// nodes without intervening synchronization are `Concurrent`. The
/// `BeforeOrEqual` / `AfterOrEqual` results arise when the versions agree
/// on every coordinate defined on both sides but one of them defines more
/// coordinates than the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRelation {
    Before,
    BeforeOrEqual,
    Equal,
    After,
    AfterOrEqual,
    Concurrent,
}

/// An immutable vector version: one logical counter per cluster member,
/// bound to the cluster snapshot (`view_id`) under which it was generated.
///
/// Coordinates are dense (index = position of the member in the snapshot's
/// member list) with [`NON_EXISTING`] marking nodes that had no counter
/// when the vector was produced. Versions are never mutated after
/// creation; every operation returns a new vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionVector {
    view_id: u64,
    counters: Vec<i64>,
}

impl VersionVector {
    pub fn new(view_id: u64, counters: Vec<i64>) -> Self {
        Self { view_id, counters }
    }

    /// The cluster snapshot this vector was generated under.
    pub fn view_id(&self) -> u64 {
        self.view_id
    }

    /// Number of coordinates (the member count of the generating snapshot).
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Returns the counter at `index`, or [`NON_EXISTING`] when the index is
    /// outside the vector.
    pub fn get(&self, index: usize) -> i64 {
        self.counters.get(index).copied().unwrap_or(NON_EXISTING)
    }

    pub fn counters(&self) -> &[i64] {
        &self.counters
    }

    /// Returns a copy of this vector with the counter at `index` replaced.
    pub fn with_counter(&self, index: usize, value: i64) -> Self {
        let mut counters = self.counters.clone();
        if index >= counters.len() {
            counters.resize(index + 1, NON_EXISTING);
        }
        counters[index] = value;
        Self {
            view_id: self.view_id,
            counters,
        }
    }

    fn check_same_view(&self, other: &Self) -> Result<()> {
        if self.view_id != other.view_id {
            return Err(SeleneError::CrossSnapshot(self.view_id, other.view_id));
        }
        Ok(())
    }

    /// Compares two vectors from the same cluster snapshot.
    ///
    /// Coordinates undefined on either side do not participate in the
    /// ordering, but asymmetry in which side defines them downgrades a
    /// strict result to `Concurrent` and an equal result to
    /// `BeforeOrEqual` / `AfterOrEqual`.
    ///
    /// # Errors
    ///
    /// Returns [`SeleneError::CrossSnapshot`] when the vectors belong to
    /// different cluster snapshots. Project both onto a common snapshot
    /// first (see `VersionGenerator::updated_version`).
    pub fn compare(&self, other: &Self) -> Result<VersionRelation> {
        self.check_same_view(other)?;

        let mut less = false;
        let mut greater = false;
        let mut self_extra = false;
        let mut other_extra = false;

        let len = self.counters.len().max(other.counters.len());
        for index in 0..len {
            let a = self.get(index);
            let b = other.get(index);
            match (a != NON_EXISTING, b != NON_EXISTING) {
                (true, true) => {
                    if a < b {
                        less = true;
                    } else if a > b {
                        greater = true;
                    }
                }
                (true, false) => self_extra = true,
                (false, true) => other_extra = true,
                (false, false) => {}
            }
        }

        let relation = match (less, greater) {
            (true, true) => VersionRelation::Concurrent,
            (true, false) => {
                if self_extra {
                    VersionRelation::Concurrent
                } else {
                    VersionRelation::Before
                }
            }
            (false, true) => {
                if other_extra {
                    VersionRelation::Concurrent
                } else {
                    VersionRelation::After
                }
            }
            (false, false) => match (self_extra, other_extra) {
                (true, true) => VersionRelation::Concurrent,
                (true, false) => VersionRelation::AfterOrEqual,
                (false, true) => VersionRelation::BeforeOrEqual,
                (false, false) => VersionRelation::Equal,
            },
        };
        Ok(relation)
    }

    /// True when this vector is `Before`, `BeforeOrEqual` or `Equal` to
    /// `other`. This is the visibility test used by commit-log walks.
    pub fn is_less_or_equal(&self, other: &Self) -> Result<bool> {
        Ok(matches!(
            self.compare(other)?,
            VersionRelation::Before | VersionRelation::BeforeOrEqual | VersionRelation::Equal
        ))
    }

    /// True when every coordinate that `bound` defines dominates this
    /// vector's. Coordinates undefined in `bound` are unconstrained, and an
    /// undefined coordinate here sits below any defined one.
    ///
    /// This is the filter for "the best locally-available version a remote
    /// snapshot allows": the remote constrains only the coordinates it
    /// knows about.
    pub fn is_bounded_by(&self, bound: &Self) -> Result<bool> {
        self.check_same_view(bound)?;
        let len = self.counters.len().max(bound.counters.len());
        for index in 0..len {
            let limit = bound.get(index);
            if limit == NON_EXISTING {
                continue;
            }
            if self.get(index) > limit {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Coordinate-wise maximum of two vectors from the same snapshot,
    /// ignoring [`NON_EXISTING`] coordinates.
    pub fn merge_max(&self, other: &Self) -> Result<Self> {
        self.check_same_view(other)?;
        let len = self.counters.len().max(other.counters.len());
        let mut counters = Vec::with_capacity(len);
        for index in 0..len {
            counters.push(self.get(index).max(other.get(index)));
        }
        Ok(Self {
            view_id: self.view_id,
            counters,
        })
    }
}

impl fmt::Display for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}@view{}", self.counters, self.view_id)
    }
}
