//! Tree Healing
//!
//! Idempotent repair of structural damage introduced outside the engine:
//! hand edits, merges, or a crash between file writes. Every pass is a pure
//! function returning a delta, and returns an empty delta on a healthy set.

use crate::tree::delta::DeltaBuilder;
use crate::tree::walker;
use crate::tree::{apply_delta, merge_deltas, NodeLookup, TreeNode, TreeNodeSet, TreeNodeSetDelta};
use crate::types::{NodeId, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Properties used when a missing root has to be synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootDefaults {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl RootDefaults {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            description: String::new(),
        }
    }

    fn build(&self, node_type: NodeType) -> TreeNode {
        let mut root = TreeNode::new(node_type, self.title.clone());
        root.description = self.description.clone();
        root
    }
}

/// Per-type root defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootTemplates {
    #[serde(default = "default_map_root")]
    pub map: RootDefaults,
    #[serde(default = "default_waypoint_root")]
    pub waypoint: RootDefaults,
    #[serde(default = "default_user_root")]
    pub user: RootDefaults,
}

fn default_map_root() -> RootDefaults {
    RootDefaults::titled("Map")
}

fn default_waypoint_root() -> RootDefaults {
    RootDefaults::titled("Waypoints")
}

fn default_user_root() -> RootDefaults {
    RootDefaults::titled("Users")
}

impl Default for RootTemplates {
    fn default() -> Self {
        Self {
            map: default_map_root(),
            waypoint: default_waypoint_root(),
            user: default_user_root(),
        }
    }
}

impl RootTemplates {
    pub fn for_type(&self, node_type: NodeType) -> &RootDefaults {
        match node_type {
            NodeType::Map => &self.map,
            NodeType::Waypoint => &self.waypoint,
            NodeType::User => &self.user,
        }
    }
}

/// Nodes in a stable order: by filename, then id.
fn ordered(nodes: &TreeNodeSet) -> Vec<&TreeNode> {
    let mut all: Vec<&TreeNode> = nodes.values().collect();
    all.sort_by(|a, b| a.filename.cmp(&b.filename).then(a.id.cmp(&b.id)));
    all
}

/// Drop child entries that do not belong in each node's `children_ids`.
///
/// An entry is dropped when its target is absent, is of another type, names
/// a different parent, or repeats an earlier entry. The parent pass re-adds
/// children to the parent they actually name.
pub fn heal_children(nodes: &TreeNodeSet) -> TreeNodeSetDelta {
    let mut delta = TreeNodeSetDelta::new();
    for node in ordered(nodes) {
        let mut seen = HashSet::new();
        let kept: Vec<NodeId> = node
            .children_ids
            .iter()
            .filter(|id| {
                nodes
                    .get(id)
                    .map(|child| {
                        child.node_type == node.node_type && child.parent_id == Some(node.id)
                    })
                    .unwrap_or(false)
            })
            .filter(|id| seen.insert(**id))
            .copied()
            .collect();

        if kept != node.children_ids {
            debug!(
                node_id = %node.id,
                dropped = node.children_ids.len() - kept.len(),
                "Dropping invalid child references"
            );
            let mut healed = node.clone();
            healed.children_ids = kept;
            delta.upsert(healed);
        }
    }
    delta
}

/// Keep exactly one root per type; demote duplicates under the first.
///
/// Demoted roots keep their own subtree intact.
pub fn canonicalize_roots(nodes: &TreeNodeSet) -> TreeNodeSetDelta {
    let mut builder = DeltaBuilder::new(nodes);
    for node_type in NodeType::ALL {
        let roots = nodes.roots_of(node_type);
        let Some((canonical, duplicates)) = roots.split_first() else {
            continue;
        };
        for duplicate in duplicates {
            info!(
                node_type = %node_type,
                root_id = %canonical,
                duplicate_id = %duplicate,
                "Demoting duplicate root"
            );
            if let Err(e) = builder.reparent(*duplicate, *canonical, None) {
                warn!(duplicate_id = %duplicate, error = %e, "Failed to demote duplicate root");
            }
        }
    }
    builder.finish()
}

/// Reattach nodes whose parent reference is broken, and relist children
/// their valid parent has forgotten.
///
/// The pass runs against `nodes` as modified by `in_flight` (when given), so
/// a parent removed by a pending delta counts as missing; the returned delta
/// applies on top of `in_flight`. A broken parent is one that is missing,
/// of another type, or part of a cycle that never reaches a root. Orphans
/// go under the canonical root of their type, synthesized from `templates`
/// when the type has none.
pub fn heal_parents(
    nodes: &TreeNodeSet,
    templates: &RootTemplates,
    in_flight: Option<&TreeNodeSetDelta>,
) -> TreeNodeSetDelta {
    let current;
    let nodes = match in_flight {
        Some(d) => {
            current = apply_delta(nodes, d);
            &current
        }
        None => nodes,
    };

    let mut delta = TreeNodeSetDelta::new();
    let candidates: Vec<NodeId> = ordered(nodes)
        .into_iter()
        .filter(|n| !n.is_root())
        .map(|n| n.id)
        .collect();

    // Missing or mistyped parents first, then cycles: breaking the topmost
    // broken link is enough for everything beneath it to reach a root again.
    for check_cycles in [false, true] {
        for id in &candidates {
            let node = {
                let view = delta.over(nodes);
                let Some(node) = view.node(id) else {
                    continue;
                };
                let parent_ok = node
                    .parent_id
                    .and_then(|pid| view.node(&pid))
                    .map(|p| p.node_type == node.node_type)
                    .unwrap_or(false);
                let broken = if check_cycles {
                    parent_ok && !walker::reaches_root(&view, id)
                } else {
                    !parent_ok
                };
                if !broken {
                    continue;
                }
                node.clone()
            };
            reattach_under_root(nodes, &mut delta, node, templates);
        }
    }

    // Relist children missing from a valid parent's list.
    let relist: Vec<(NodeId, NodeId)> = {
        let view = delta.over(nodes);
        let mut pending: Vec<&TreeNode> = view
            .node_ids()
            .iter()
            .filter_map(|id| view.node(id))
            .filter(|n| !n.is_root())
            .collect();
        pending.sort_by(|a, b| a.filename.cmp(&b.filename).then(a.id.cmp(&b.id)));
        pending
            .into_iter()
            .filter_map(|n| {
                let pid = n.parent_id?;
                let parent = view.node(&pid)?;
                (!parent.children_ids.contains(&n.id)).then_some((pid, n.id))
            })
            .collect()
    };
    for (parent_id, child_id) in relist {
        let parent = delta.over(nodes).node(&parent_id).cloned();
        if let Some(mut parent) = parent {
            debug!(node_id = %child_id, parent_id = %parent_id, "Relisting child in parent");
            parent.children_ids.push(child_id);
            delta.upsert(parent);
        }
    }

    delta
}

/// Move `node` under the canonical root of its type, synthesizing the root
/// when the type has none.
fn reattach_under_root(
    nodes: &TreeNodeSet,
    delta: &mut TreeNodeSetDelta,
    mut node: TreeNode,
    templates: &RootTemplates,
) {
    let id = node.id;
    let existing_root = delta.over(nodes).root_of(node.node_type);
    let root_id = match existing_root {
        Some(root_id) => root_id,
        None => {
            let root = templates.for_type(node.node_type).build(node.node_type);
            info!(node_type = %node.node_type, root_id = %root.id, "Synthesizing missing root");
            let root_id = root.id;
            delta.upsert(root);
            root_id
        }
    };

    warn!(node_id = %id, old_parent = ?node.parent_id, root_id = %root_id, "Reattaching orphaned node");

    // A parent on a cycle still lists the node.
    let old_parent = node.parent_id.and_then(|pid| delta.over(nodes).node(&pid).cloned());
    if let Some(mut old) = old_parent {
        if old.id == id {
            node.children_ids.retain(|c| *c != id);
        } else if old.children_ids.contains(&id) {
            old.children_ids.retain(|c| *c != id);
            delta.upsert(old);
        }
    }

    node.parent_id = Some(root_id);
    delta.upsert(node);
    let root = delta.over(nodes).node(&root_id).cloned();
    if let Some(mut root) = root {
        if !root.children_ids.contains(&id) {
            root.children_ids.push(id);
            delta.upsert(root);
        }
    }
}

/// Run every healing pass: children, then roots, then parents.
pub fn heal(nodes: &TreeNodeSet, templates: &RootTemplates) -> TreeNodeSetDelta {
    let children = heal_children(nodes);
    let after_children = apply_delta(nodes, &children);
    let roots = canonicalize_roots(&after_children);
    let structural = merge_deltas(&children, &roots);
    let parents = heal_parents(nodes, templates, Some(&structural));
    let healed = merge_deltas(&structural, &parents);
    if !healed.is_empty() {
        info!(
            updated = healed.updated.len(),
            removed = healed.removed.len(),
            "Tree healed"
        );
    }
    healed
}
