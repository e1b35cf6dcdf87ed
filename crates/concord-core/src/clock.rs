//! Vector clock for causal ordering of context events.
//!
//! Each node attached to a context keeps one live `VectorClock`. Only the
//! owning node advances its own entry (`tick`); every other entry only rises
//! through `update`, which takes the element-wise maximum. Entries never
//! decrease, and `update` is idempotent and commutative.
//!
//! Snapshots (`VectorClockSnapshot`) are immutable values embedded into
//! outgoing events and compared with `VectorClock::compare`.

use crate::identifiers::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;

/// Result of comparing two vector clock snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CausalOrdering {
    /// Left happened strictly before right
    Before,
    /// Left happened strictly after right
    After,
    /// Neither dominates the other
    Concurrent,
    /// Identical causal history
    Equal,
}

/// Immutable copy of a vector clock, as carried by events.
///
/// Missing entries are treated as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClockSnapshot(BTreeMap<NodeId, u64>);

impl VectorClockSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter recorded for `node`, zero when absent
    pub fn get(&self, node: &NodeId) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    /// Iterate entries in node order
    pub fn iter(&self) -> btree_map::Iter<'_, NodeId, u64> {
        self.0.iter()
    }

    /// Number of recorded entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no entries are recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Element-wise maximum of two snapshots.
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (node, counter) in other.iter() {
            let current = merged.entry(node.clone()).or_insert(0);
            if *counter > *current {
                *current = *counter;
            }
        }
        Self(merged)
    }

    /// Whether every entry of `self` is at least the matching entry of `other`
    pub fn dominates(&self, other: &Self) -> bool {
        matches!(
            VectorClock::compare(self, other),
            CausalOrdering::After | CausalOrdering::Equal
        )
    }
}

impl FromIterator<(NodeId, u64)> for VectorClockSnapshot {
    fn from_iter<I: IntoIterator<Item = (NodeId, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a VectorClockSnapshot {
    type Item = (&'a NodeId, &'a u64);
    type IntoIter = btree_map::Iter<'a, NodeId, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Live vector clock owned by one node for one context.
#[derive(Debug, Clone)]
pub struct VectorClock {
    node_id: NodeId,
    entries: BTreeMap<NodeId, u64>,
}

impl VectorClock {
    /// Create a clock owned by `node_id`, with the local counter at zero
    pub fn new(node_id: NodeId) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(node_id.clone(), 0);
        Self { node_id, entries }
    }

    /// Owning node
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Current counter for `node`, zero when absent
    pub fn get(&self, node: &NodeId) -> u64 {
        self.entries.get(node).copied().unwrap_or(0)
    }

    /// Advance the local counter and return a snapshot for an outgoing event.
    pub fn tick(&mut self) -> VectorClockSnapshot {
        let local = self.entries.entry(self.node_id.clone()).or_insert(0);
        *local = local.saturating_add(1);
        self.snapshot()
    }

    /// Merge a remote snapshot by element-wise maximum.
    ///
    /// The local node's own entry is never modified here; it only moves
    /// through `tick`.
    pub fn update(&mut self, remote: &VectorClockSnapshot) {
        for (node, counter) in remote.iter() {
            if *node == self.node_id {
                continue;
            }
            let current = self.entries.entry(node.clone()).or_insert(0);
            if *counter > *current {
                *current = *counter;
            }
        }
    }

    /// Immutable copy of the current entries
    pub fn snapshot(&self) -> VectorClockSnapshot {
        VectorClockSnapshot(self.entries.clone())
    }

    /// Compare two snapshots element-wise.
    pub fn compare(a: &VectorClockSnapshot, b: &VectorClockSnapshot) -> CausalOrdering {
        let mut a_smaller = false;
        let mut a_larger = false;

        for node in a.0.keys().chain(b.0.keys()) {
            let left = a.get(node);
            let right = b.get(node);
            if left < right {
                a_smaller = true;
            } else if left > right {
                a_larger = true;
            }
            if a_smaller && a_larger {
                return CausalOrdering::Concurrent;
            }
        }

        match (a_smaller, a_larger) {
            (false, false) => CausalOrdering::Equal,
            (true, false) => CausalOrdering::Before,
            (false, true) => CausalOrdering::After,
            (true, true) => CausalOrdering::Concurrent,
        }
    }
}
