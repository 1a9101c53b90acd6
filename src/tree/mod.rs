//! Status Tree
//!
//! The in-memory tree is an immutable [`TreeNodeSet`] snapshot. Every edit is
//! expressed as a [`TreeNodeSetDelta`] computed by a pure function of the
//! snapshot; callers apply the delta to obtain the next snapshot.

pub mod delta;
pub mod heal;
pub mod metrics;
pub mod node;
pub mod walker;

pub use node::{Metadata, NodeProperties, NodeUpdates, TreeNode, REFERENCE_MAP_NODE_ID};

use crate::types::{NodeId, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// All nodes of all types, keyed by id. The set is the sole owner of nodes.
pub type TreeNodeSet = HashMap<NodeId, TreeNode>;

/// Minimal description of a transition between two snapshots.
///
/// An id never appears in both `updated` and `removed`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreeNodeSetDelta {
    pub updated: TreeNodeSet,
    pub removed: TreeNodeSet,
}

impl TreeNodeSetDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty()
    }

    /// Record a new or changed node, cancelling any pending removal.
    pub fn upsert(&mut self, node: TreeNode) {
        self.removed.remove(&node.id);
        self.updated.insert(node.id, node);
    }

    /// Record a removal, cancelling any pending update.
    pub fn remove(&mut self, node: TreeNode) {
        self.updated.remove(&node.id);
        self.removed.insert(node.id, node);
    }

    /// View `base` as if this delta had been applied.
    pub fn over<'a>(&'a self, base: &'a TreeNodeSet) -> Overlay<'a> {
        Overlay { base, delta: self }
    }
}

/// Read access to nodes by id.
///
/// Implemented by plain snapshots and by [`Overlay`], so traversal and
/// metric code runs unchanged on a delta under construction.
pub trait NodeLookup {
    fn node(&self, id: &NodeId) -> Option<&TreeNode>;

    /// Ids of every live node, in unspecified order.
    fn node_ids(&self) -> Vec<NodeId>;

    fn contains(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Roots of the given type, ordered by filename then id.
    fn roots_of(&self, node_type: NodeType) -> Vec<NodeId> {
        let mut roots: Vec<&TreeNode> = self
            .node_ids()
            .iter()
            .filter_map(|id| self.node(id))
            .filter(|n| n.node_type == node_type && n.is_root())
            .collect();
        roots.sort_by(|a, b| a.filename.cmp(&b.filename).then(a.id.cmp(&b.id)));
        roots.iter().map(|n| n.id).collect()
    }

    /// The canonical root of a type: the first root in [`roots_of`] order.
    ///
    /// [`roots_of`]: NodeLookup::roots_of
    fn root_of(&self, node_type: NodeType) -> Option<NodeId> {
        self.roots_of(node_type).into_iter().next()
    }
}

impl NodeLookup for TreeNodeSet {
    fn node(&self, id: &NodeId) -> Option<&TreeNode> {
        self.get(id)
    }

    fn node_ids(&self) -> Vec<NodeId> {
        self.keys().copied().collect()
    }
}

/// A snapshot seen through a pending delta.
#[derive(Clone, Copy)]
pub struct Overlay<'a> {
    base: &'a TreeNodeSet,
    delta: &'a TreeNodeSetDelta,
}

impl<'a> Overlay<'a> {
    pub fn new(base: &'a TreeNodeSet, delta: &'a TreeNodeSetDelta) -> Self {
        Self { base, delta }
    }
}

impl NodeLookup for Overlay<'_> {
    fn node(&self, id: &NodeId) -> Option<&TreeNode> {
        if self.delta.removed.contains_key(id) {
            return None;
        }
        self.delta.updated.get(id).or_else(|| self.base.get(id))
    }

    fn node_ids(&self) -> Vec<NodeId> {
        let mut seen: HashSet<NodeId> = HashSet::with_capacity(self.base.len());
        let mut ids = Vec::with_capacity(self.base.len() + self.delta.updated.len());
        for id in self.base.keys().chain(self.delta.updated.keys()) {
            if !self.delta.removed.contains_key(id) && seen.insert(*id) {
                ids.push(*id);
            }
        }
        ids
    }
}

/// Combine two deltas; `second` wins on conflicting ids.
///
/// Ids removed by `second` leave `first.updated`, and ids updated by
/// `second` leave `first.removed`, so the result never lists an id twice.
pub fn merge_deltas(first: &TreeNodeSetDelta, second: &TreeNodeSetDelta) -> TreeNodeSetDelta {
    let mut merged = first.clone();
    for node in second.removed.values() {
        merged.remove(node.clone());
    }
    for node in second.updated.values() {
        merged.upsert(node.clone());
    }
    merged
}

/// Produce the snapshot that results from applying `delta` to `nodes`.
pub fn apply_delta(nodes: &TreeNodeSet, delta: &TreeNodeSetDelta) -> TreeNodeSet {
    let mut next = nodes.clone();
    for (id, node) in &delta.updated {
        next.insert(*id, node.clone());
    }
    for id in delta.removed.keys() {
        next.remove(id);
    }
    next
}
