//! Waypoint Sync
//!
//! Mirrors the shape of a map subtree into the waypoint subtree that
//! references it. Waypoints are matched to map nodes purely by
//! `referenceMapNodeId`. Missing waypoints are created, moved map nodes pull
//! their waypoint along, and waypoints whose map node is gone are parked
//! under an "Old Nodes" holder instead of being deleted, so user-entered
//! data survives edits to the map.

use crate::error::TreeError;
use crate::tree::delta::DeltaBuilder;
use crate::tree::walker;
use crate::tree::{NodeLookup, TreeNode, TreeNodeSet, TreeNodeSetDelta};
use crate::types::{NodeId, NodeState, NodeType};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, instrument};

/// Metadata flag marking the holder of quarantined waypoints.
pub const OLD_NODES_HOLDER: &str = "oldNodesHolder";

/// Title given to a newly created holder.
pub const OLD_NODES_TITLE: &str = "Old Nodes";

/// Whether `node` is the holder of quarantined waypoints.
pub fn is_holder(node: &TreeNode) -> bool {
    node.metadata
        .get(OLD_NODES_HOLDER)
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

/// Compute the delta that brings the subtree under `waypoint_root_id` in
/// line with the map subtree it references.
///
/// Fails with `NotFound` if the waypoint or its referenced map node is
/// absent, and with `InvalidOperation` if the waypoint has no reference or
/// the reference does not name a map node. Running sync on an already
/// synced subtree yields an empty delta.
#[instrument(skip(nodes), fields(waypoint = %waypoint_root_id))]
pub fn sync_waypoints(
    nodes: &TreeNodeSet,
    waypoint_root_id: NodeId,
) -> Result<TreeNodeSetDelta, TreeError> {
    let waypoint_root = nodes
        .get(&waypoint_root_id)
        .ok_or(TreeError::NotFound(waypoint_root_id))?;
    if waypoint_root.node_type != NodeType::Waypoint {
        return Err(TreeError::InvalidOperation(format!(
            "node {} is a {} node, not a waypoint",
            waypoint_root_id, waypoint_root.node_type
        )));
    }
    let map_root_id = waypoint_root.reference_map_node_id().ok_or_else(|| {
        TreeError::InvalidOperation(format!(
            "waypoint {} has no referenceMapNodeId",
            waypoint_root_id
        ))
    })?;
    let map_root = nodes
        .get(&map_root_id)
        .ok_or(TreeError::NotFound(map_root_id))?;
    if map_root.node_type != NodeType::Map {
        return Err(TreeError::InvalidOperation(format!(
            "waypoint {} references {} which is not a map node",
            waypoint_root_id, map_root_id
        )));
    }

    let live_map: HashSet<NodeId> = walker::descendants(nodes, &map_root_id).into_iter().collect();

    // First waypoint (pre-order) referencing each map node. Quarantined
    // nodes are included, so a map node that comes back is reconnected.
    let mut by_reference: HashMap<NodeId, NodeId> = HashMap::new();
    for id in walker::descendants(nodes, &waypoint_root_id).into_iter().skip(1) {
        if let Some(target) = nodes.get(&id).and_then(|n| n.reference_map_node_id()) {
            by_reference.entry(target).or_insert(id);
        }
    }

    let mut builder = DeltaBuilder::new(nodes);
    let mut created = 0usize;
    let mut moved = 0usize;

    let mut queue: VecDeque<(NodeId, NodeId)> = VecDeque::from([(map_root_id, waypoint_root_id)]);
    while let Some((map_id, waypoint_id)) = queue.pop_front() {
        let map_children: Vec<TreeNode> = {
            let view = builder.view();
            match view.node(&map_id) {
                Some(map_node) => map_node
                    .children_ids
                    .iter()
                    .filter_map(|id| view.node(id).cloned())
                    .collect(),
                None => continue,
            }
        };

        let mut mirrored = Vec::with_capacity(map_children.len());
        for map_child in &map_children {
            let existing = by_reference.get(&map_child.id).copied();
            let target = match existing {
                Some(w) => {
                    let parent = builder.view().node(&w).and_then(|n| n.parent_id);
                    if parent != Some(waypoint_id) {
                        debug!(waypoint = %w, map_node = %map_child.id, "Following moved map node");
                        builder.reparent(w, waypoint_id, None)?;
                        moved += 1;
                    }
                    w
                }
                None => {
                    let mut node = TreeNode::new(NodeType::Waypoint, map_child.title.clone());
                    node.set_reference_map_node_id(map_child.id);
                    let id = node.id;
                    debug!(waypoint = %id, map_node = %map_child.id, "Creating waypoint");
                    builder.add(node, waypoint_id, None)?;
                    by_reference.insert(map_child.id, id);
                    created += 1;
                    id
                }
            };
            mirrored.push(target);
            queue.push_back((map_child.id, target));
        }

        // Mirrored children follow map order; anything else keeps its
        // relative order after them.
        let parent = builder.view().node(&waypoint_id).cloned();
        if let Some(mut parent) = parent {
            let mirrored_set: HashSet<NodeId> = mirrored.iter().copied().collect();
            let rest: Vec<NodeId> = parent
                .children_ids
                .iter()
                .filter(|id| !mirrored_set.contains(id))
                .copied()
                .collect();
            let mut ordered = mirrored;
            ordered.extend(rest);
            if ordered != parent.children_ids {
                parent.children_ids = ordered;
                builder.put(parent);
            }
        }
    }

    let quarantined = quarantine_stale(&mut builder, waypoint_root_id, &live_map)?;

    if created + moved + quarantined > 0 {
        info!(created, moved, quarantined, "Waypoints synced");
    }
    Ok(builder.finish())
}

/// Move waypoints whose reference no longer names a live map node under
/// the holder, creating the holder on first use.
fn quarantine_stale(
    builder: &mut DeltaBuilder<'_>,
    waypoint_root_id: NodeId,
    live_map: &HashSet<NodeId>,
) -> Result<usize, TreeError> {
    let mut holder_id = builder
        .view()
        .node(&waypoint_root_id)
        .into_iter()
        .flat_map(|root| root.children_ids.iter())
        .copied()
        .find(|id| builder.view().node(id).map(is_holder).unwrap_or(false));

    let candidates: Vec<NodeId> = {
        let view = builder.view();
        walker::descendants(&view, &waypoint_root_id)
            .into_iter()
            .skip(1)
            .filter(|id| {
                view.node(id)
                    .and_then(|n| n.reference_map_node_id())
                    .map(|target| !live_map.contains(&target))
                    .unwrap_or(false)
            })
            .collect()
    };

    let mut quarantined = 0usize;
    for id in candidates {
        if let Some(holder) = holder_id {
            if walker::ancestors(&builder.view(), &id).contains(&holder) {
                continue;
            }
        }
        let holder = match holder_id {
            Some(holder) => holder,
            None => {
                let mut holder = TreeNode::new(NodeType::Waypoint, OLD_NODES_TITLE);
                holder
                    .metadata
                    .insert(OLD_NODES_HOLDER.to_string(), serde_json::Value::Bool(true));
                holder.node_state = NodeState::Draft;
                let new_id = holder.id;
                builder.add(holder, waypoint_root_id, None)?;
                holder_id = Some(new_id);
                new_id
            }
        };
        debug!(waypoint = %id, holder = %holder, "Quarantining stale waypoint");
        builder.reparent(id, holder, None)?;
        quarantined += 1;
    }
    Ok(quarantined)
}
