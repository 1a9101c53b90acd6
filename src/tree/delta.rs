//! Delta Algebra
//!
//! Pure operations computing the minimal [`TreeNodeSetDelta`] for an edit.
//! Each operation validates everything before touching the delta, so a
//! failed operation leaves no partial effect.

use crate::error::TreeError;
use crate::tree::metrics;
use crate::tree::walker;
use crate::tree::{NodeLookup, NodeUpdates, Overlay, TreeNode, TreeNodeSet, TreeNodeSetDelta};
use crate::types::{NodeId, NodeType};
use std::collections::HashSet;
use tracing::debug;

/// Position in a child list for an optional insertion index.
///
/// Negative or absent indexes append; indexes past the end clamp to append.
pub fn insert_position(len: usize, index: Option<isize>) -> usize {
    match index {
        Some(i) if i >= 0 && (i as usize) <= len => i as usize,
        _ => len,
    }
}

/// Accumulates several operations into one delta over a fixed snapshot.
///
/// Every operation sees the snapshot as modified by the operations before
/// it. Metrics propagation runs inside each structural operation.
pub struct DeltaBuilder<'a> {
    base: &'a TreeNodeSet,
    delta: TreeNodeSetDelta,
}

impl<'a> DeltaBuilder<'a> {
    pub fn new(base: &'a TreeNodeSet) -> Self {
        Self::with_delta(base, TreeNodeSetDelta::new())
    }

    /// Continue building on top of an existing delta.
    pub fn with_delta(base: &'a TreeNodeSet, delta: TreeNodeSetDelta) -> Self {
        Self { base, delta }
    }

    /// Current state: the snapshot seen through the delta built so far.
    pub fn view(&self) -> Overlay<'_> {
        self.delta.over(self.base)
    }

    pub fn delta(&self) -> &TreeNodeSetDelta {
        &self.delta
    }

    pub fn finish(self) -> TreeNodeSetDelta {
        self.delta
    }

    fn get(&self, id: &NodeId) -> Result<TreeNode, TreeError> {
        self.view().node(id).cloned().ok_or(TreeError::NotFound(*id))
    }

    /// Record a node change that has no metric consequences (e.g. child
    /// order). Skipped when the node is unchanged.
    pub(crate) fn put(&mut self, node: TreeNode) {
        if self.view().node(&node.id) != Some(&node) {
            self.delta.upsert(node);
        }
    }

    /// Insert `node` under `parent_id` at `index`.
    pub fn add(
        &mut self,
        mut node: TreeNode,
        parent_id: NodeId,
        index: Option<isize>,
    ) -> Result<(), TreeError> {
        if self.view().contains(&node.id) {
            return Err(TreeError::InvalidOperation(format!(
                "node {} already exists",
                node.id
            )));
        }
        if !node.children_ids.is_empty() {
            return Err(TreeError::InvalidOperation(format!(
                "node {} must not carry children when added",
                node.id
            )));
        }
        let mut parent = self.get(&parent_id)?;
        if parent.node_type != node.node_type {
            return Err(TreeError::InvalidOperation(format!(
                "cannot add a {} node under a {} node",
                node.node_type, parent.node_type
            )));
        }

        let position = insert_position(parent.children_ids.len(), index);
        parent.children_ids.insert(position, node.id);
        node.parent_id = Some(parent_id);
        node.calculated_metrics = metrics::CalculatedMetrics::default();

        debug!(node_id = %node.id, parent_id = %parent_id, position, "Adding node");
        let node_id = node.id;
        self.delta.upsert(parent);
        self.delta.upsert(node);
        metrics::propagate(self.base, &mut self.delta, node_id);
        Ok(())
    }

    /// Install `node` as the root of its type.
    pub fn add_root(&mut self, mut node: TreeNode) -> Result<(), TreeError> {
        if self.view().contains(&node.id) {
            return Err(TreeError::InvalidOperation(format!(
                "node {} already exists",
                node.id
            )));
        }
        if let Some(existing) = self.view().root_of(node.node_type) {
            return Err(TreeError::InvalidOperation(format!(
                "a {} root already exists: {}",
                node.node_type, existing
            )));
        }
        node.parent_id = None;
        node.children_ids.clear();
        node.calculated_metrics = metrics::CalculatedMetrics::default();
        debug!(node_id = %node.id, node_type = %node.node_type, "Adding root");
        let node_id = node.id;
        self.delta.upsert(node);
        metrics::propagate(self.base, &mut self.delta, node_id);
        Ok(())
    }

    /// Merge `updates` into a node and recompute metrics from it.
    pub fn update(&mut self, node_id: NodeId, updates: &NodeUpdates) -> Result<(), TreeError> {
        let original = self.get(&node_id)?;
        let mut node = original.clone();
        let state_changed = updates.apply_to(&mut node);
        if node != original {
            self.delta.upsert(node);
        }
        debug!(node_id = %node_id, state_changed, "Updating node");
        // The parent is always re-evaluated: a state flip changes which
        // children count even when this node's own value is unchanged.
        metrics::propagate(self.base, &mut self.delta, node_id);
        Ok(())
    }

    /// Remove a node together with its whole subtree.
    pub fn remove(&mut self, node_id: NodeId) -> Result<(), TreeError> {
        let node = self.get(&node_id)?;
        let subtree = walker::descendants(&self.view(), &node_id);

        let removed: Vec<TreeNode> = {
            let view = self.view();
            subtree.iter().filter_map(|id| view.node(id).cloned()).collect()
        };
        let parent = node
            .parent_id
            .and_then(|pid| self.view().node(&pid).cloned())
            .filter(|p| !subtree.contains(&p.id));

        let removed_maps: HashSet<NodeId> = removed
            .iter()
            .filter(|n| n.node_type == NodeType::Map)
            .map(|n| n.id)
            .collect();

        debug!(node_id = %node_id, subtree_size = removed.len(), "Removing subtree");
        for n in removed {
            self.delta.remove(n);
        }

        let mut starts = Vec::new();
        if let Some(mut parent) = parent {
            parent.children_ids.retain(|id| *id != node_id);
            starts.push(parent.id);
            self.delta.upsert(parent);
        }

        // Nodes referencing a removed map node lose that input.
        if !removed_maps.is_empty() {
            let view = self.view();
            let mut referrers: Vec<NodeId> = view
                .node_ids()
                .into_iter()
                .filter(|id| {
                    view.node(id)
                        .and_then(|n| n.reference_map_node_id())
                        .map(|target| removed_maps.contains(&target))
                        .unwrap_or(false)
                })
                .collect();
            referrers.sort();
            starts.extend(referrers);
        }

        metrics::propagate_from(self.base, &mut self.delta, &starts);
        Ok(())
    }

    /// Move a node under `new_parent_id` at `index`.
    pub fn reparent(
        &mut self,
        node_id: NodeId,
        new_parent_id: NodeId,
        index: Option<isize>,
    ) -> Result<(), TreeError> {
        let mut node = self.get(&node_id)?;
        let mut new_parent = self.get(&new_parent_id)?;

        if new_parent.node_type != node.node_type {
            return Err(TreeError::InvalidOperation(format!(
                "cannot move a {} node under a {} node",
                node.node_type, new_parent.node_type
            )));
        }
        if walker::is_self_or_ancestor(&self.view(), &node_id, &new_parent_id) {
            return Err(TreeError::InvalidOperation(
                "cannot move a node to one of its descendants".to_string(),
            ));
        }

        if node.parent_id == Some(new_parent_id) {
            new_parent.children_ids.retain(|id| *id != node_id);
            let position = insert_position(new_parent.children_ids.len(), index);
            new_parent.children_ids.insert(position, node_id);
            debug!(node_id = %node_id, parent_id = %new_parent_id, position, "Reordering node");
            self.put(new_parent);
            metrics::propagate(self.base, &mut self.delta, new_parent_id);
            return Ok(());
        }

        let old_parent = node.parent_id.and_then(|pid| self.view().node(&pid).cloned());
        let mut starts = Vec::with_capacity(2);
        if let Some(mut old_parent) = old_parent {
            old_parent.children_ids.retain(|id| *id != node_id);
            starts.push(old_parent.id);
            self.delta.upsert(old_parent);
        }

        new_parent.children_ids.retain(|id| *id != node_id);
        let position = insert_position(new_parent.children_ids.len(), index);
        new_parent.children_ids.insert(position, node_id);
        node.parent_id = Some(new_parent_id);
        debug!(node_id = %node_id, parent_id = %new_parent_id, position, "Moving node");
        self.delta.upsert(new_parent);
        self.delta.upsert(node);
        starts.push(new_parent_id);

        metrics::propagate_from(self.base, &mut self.delta, &starts);
        Ok(())
    }
}

/// Delta inserting `node` under `parent_id` at `index`.
pub fn add_node(
    nodes: &TreeNodeSet,
    node: TreeNode,
    parent_id: NodeId,
    index: Option<isize>,
) -> Result<TreeNodeSetDelta, TreeError> {
    let mut builder = DeltaBuilder::new(nodes);
    builder.add(node, parent_id, index)?;
    Ok(builder.finish())
}

/// Delta installing `node` as the root of its type.
pub fn add_root(nodes: &TreeNodeSet, node: TreeNode) -> Result<TreeNodeSetDelta, TreeError> {
    let mut builder = DeltaBuilder::new(nodes);
    builder.add_root(node)?;
    Ok(builder.finish())
}

/// Delta merging `updates` into `node_id`.
pub fn update_node(
    nodes: &TreeNodeSet,
    node_id: NodeId,
    updates: &NodeUpdates,
) -> Result<TreeNodeSetDelta, TreeError> {
    let mut builder = DeltaBuilder::new(nodes);
    builder.update(node_id, updates)?;
    Ok(builder.finish())
}

/// Delta removing `node_id` and its descendants.
pub fn remove_node(nodes: &TreeNodeSet, node_id: NodeId) -> Result<TreeNodeSetDelta, TreeError> {
    let mut builder = DeltaBuilder::new(nodes);
    builder.remove(node_id)?;
    Ok(builder.finish())
}

/// Delta moving `node_id` under `new_parent_id`.
///
/// With `base_delta`, the move is computed against `nodes` as modified by
/// that delta and the result is the merge of both.
pub fn reparent_node(
    nodes: &TreeNodeSet,
    node_id: NodeId,
    new_parent_id: NodeId,
    index: Option<isize>,
    base_delta: Option<&TreeNodeSetDelta>,
) -> Result<TreeNodeSetDelta, TreeError> {
    let mut builder = DeltaBuilder::with_delta(nodes, base_delta.cloned().unwrap_or_default());
    builder.reparent(node_id, new_parent_id, index)?;
    Ok(builder.finish())
}
