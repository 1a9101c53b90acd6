//! Iterative traversals over a node set.
//!
//! All walks use explicit stacks and a visited set, so deep trees cannot
//! exhaust the call stack and corrupted (cyclic) data cannot loop forever.

use crate::tree::NodeLookup;
use crate::types::NodeId;
use std::collections::HashSet;

/// Every node in the subtree rooted at `start`, `start` first, in
/// depth-first pre-order following `children_ids` order.
///
/// Child ids that do not resolve are skipped. Returns an empty vector when
/// `start` itself is absent.
pub fn descendants<L: NodeLookup + ?Sized>(nodes: &L, start: &NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    if !nodes.contains(start) {
        return out;
    }

    let mut visited = HashSet::new();
    let mut stack = vec![*start];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = nodes.node(&id) else {
            continue;
        };
        out.push(id);
        for child in node.children_ids.iter().rev() {
            if !visited.contains(child) {
                stack.push(*child);
            }
        }
    }
    out
}

/// Subtree of `start` in post-order (children before parents).
pub fn post_order<L: NodeLookup + ?Sized>(nodes: &L, start: &NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(*start, false)];

    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            out.push(id);
            continue;
        }
        if !visited.insert(id) {
            continue;
        }
        let Some(node) = nodes.node(&id) else {
            continue;
        };
        stack.push((id, true));
        for child in node.children_ids.iter().rev() {
            if !visited.contains(child) {
                stack.push((*child, false));
            }
        }
    }
    out
}

/// Ancestors of `start`, nearest first. The walk stops at a root, at a
/// parent id that does not resolve, or when an id repeats.
pub fn ancestors<L: NodeLookup + ?Sized>(nodes: &L, start: &NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut visited = HashSet::from([*start]);
    let mut current = nodes.node(start).and_then(|n| n.parent_id);

    while let Some(id) = current {
        if !visited.insert(id) {
            break;
        }
        let Some(node) = nodes.node(&id) else {
            break;
        };
        out.push(id);
        current = node.parent_id;
    }
    out
}

/// Whether `node_id` is `candidate` itself or one of its ancestors.
///
/// Used to reject moves of a node beneath its own subtree: the walk climbs
/// from the candidate parent, which is O(depth) rather than O(subtree).
pub fn is_self_or_ancestor<L: NodeLookup + ?Sized>(
    nodes: &L,
    node_id: &NodeId,
    candidate: &NodeId,
) -> bool {
    node_id == candidate || ancestors(nodes, candidate).contains(node_id)
}

/// Whether the parent chain of `start` ends at a root without revisiting a
/// node or hitting a missing parent.
pub fn reaches_root<L: NodeLookup + ?Sized>(nodes: &L, start: &NodeId) -> bool {
    let mut visited = HashSet::new();
    let mut current = *start;
    loop {
        if !visited.insert(current) {
            return false;
        }
        let Some(node) = nodes.node(&current) else {
            return false;
        };
        match node.parent_id {
            None => return true,
            Some(parent) => current = parent,
        }
    }
}
