//! Metrics Propagation Engine
//!
//! Calculated metrics are a pure function of a node's own overrides, its
//! active children's calculated metrics, and the calculated metrics of the
//! node it references. Propagation walks upward from a changed node and
//! stops at the first ancestor whose value does not change, keeping the cost
//! of an edit proportional to depth rather than tree size.

use crate::tree::walker;
use crate::tree::{NodeLookup, TreeNode, TreeNodeSet, TreeNodeSetDelta};
use crate::types::{NodeId, NodeType};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, trace, warn};

/// Readiness level of a leaf with no override and no reference.
pub const DEFAULT_READINESS_LEVEL: u32 = 0;

/// Derived metric values. Always fully populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculatedMetrics {
    pub readiness_level: u32,
}

impl Default for CalculatedMetrics {
    fn default() -> Self {
        Self {
            readiness_level: DEFAULT_READINESS_LEVEL,
        }
    }
}

/// User-authored overrides. Absent fields fall back to the calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_level: Option<u32>,
}

impl SetMetrics {
    pub fn is_empty(&self) -> bool {
        self.readiness_level.is_none()
    }
}

/// Per-field update of a set metric.
///
/// In JSON an absent field is `Keep`, `null` is `Clear`, and a value is `Set`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MetricUpdate<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T: Copy> MetricUpdate<T> {
    pub fn apply(&self, current: Option<T>) -> Option<T> {
        match self {
            MetricUpdate::Keep => current,
            MetricUpdate::Clear => None,
            MetricUpdate::Set(value) => Some(*value),
        }
    }

    pub fn is_keep(&self) -> bool {
        matches!(self, MetricUpdate::Keep)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for MetricUpdate<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => MetricUpdate::Clear,
            Some(value) => MetricUpdate::Set(value),
        })
    }
}

impl<T: Serialize> Serialize for MetricUpdate<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricUpdate::Set(value) => serializer.serialize_some(value),
            _ => serializer.serialize_none(),
        }
    }
}

/// Tri-state update of every set metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMetricsUpdate {
    #[serde(default, skip_serializing_if = "MetricUpdate::is_keep")]
    pub readiness_level: MetricUpdate<u32>,
}

impl SetMetricsUpdate {
    pub fn apply(&self, current: &SetMetrics) -> SetMetrics {
        SetMetrics {
            readiness_level: self.readiness_level.apply(current.readiness_level),
        }
    }
}

/// Readiness rule: the override wins, then the referenced node, then the
/// minimum over active children, then the leaf default.
pub fn readiness_level(
    set_value: Option<u32>,
    active_children: impl IntoIterator<Item = u32>,
    referenced: Option<u32>,
) -> u32 {
    set_value
        .or(referenced)
        .or_else(|| active_children.into_iter().min())
        .unwrap_or(DEFAULT_READINESS_LEVEL)
}

/// Apply every metric rule.
pub fn calculate(
    set_metrics: &SetMetrics,
    active_children: &[CalculatedMetrics],
    referenced: Option<&CalculatedMetrics>,
) -> CalculatedMetrics {
    CalculatedMetrics {
        readiness_level: readiness_level(
            set_metrics.readiness_level,
            active_children.iter().map(|m| m.readiness_level),
            referenced.map(|m| m.readiness_level),
        ),
    }
}

/// Calculate `node`'s metrics from the current state of its children and
/// referenced map node, as seen through `nodes`. A reference to a node of
/// any other type is ignored.
pub fn calculate_for<L: NodeLookup + ?Sized>(nodes: &L, node: &TreeNode) -> CalculatedMetrics {
    let children: Vec<CalculatedMetrics> = node
        .children_ids
        .iter()
        .filter_map(|id| nodes.node(id))
        .filter(|child| child.is_active())
        .map(|child| child.calculated_metrics)
        .collect();
    let referenced = node
        .reference_map_node_id()
        .filter(|id| *id != node.id)
        .and_then(|id| nodes.node(&id))
        .filter(|n| n.node_type == NodeType::Map)
        .map(|n| &n.calculated_metrics);
    calculate(&node.set_metrics, &children, referenced)
}

/// Whether `node` takes the metrics of `target` as an input.
fn references_map<L: NodeLookup + ?Sized>(nodes: &L, node: &TreeNode, target: NodeId) -> bool {
    node.id != target
        && node.reference_map_node_id() == Some(target)
        && nodes
            .node(&target)
            .map(|n| n.node_type == NodeType::Map)
            .unwrap_or(false)
}

/// Map of referenced map node id to the ids referencing it.
fn referrer_index<L: NodeLookup + ?Sized>(nodes: &L) -> HashMap<NodeId, Vec<NodeId>> {
    let mut index: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for id in nodes.node_ids() {
        let Some(node) = nodes.node(&id) else {
            continue;
        };
        if let Some(target) = node.reference_map_node_id() {
            if references_map(nodes, node, target) {
                index.entry(target).or_default().push(id);
            }
        }
    }
    index
}

/// Recompute metrics starting at `start` and walking up, writing every
/// changed node into `delta`.
///
/// The parent of `start` is always re-evaluated, because the triggering
/// change (add, remove, state flip) can alter the parent's inputs without
/// changing `start`'s own value. Above that, propagation stops at the first
/// ancestor whose recomputed metrics equal the stored ones.
pub fn propagate(base: &TreeNodeSet, delta: &mut TreeNodeSetDelta, start: NodeId) {
    propagate_from(base, delta, &[start]);
}

/// [`propagate`] from several starting nodes, each forcing its parent check.
pub fn propagate_from(base: &TreeNodeSet, delta: &mut TreeNodeSetDelta, starts: &[NodeId]) {
    let mut queue: VecDeque<(NodeId, bool)> = starts.iter().map(|id| (*id, true)).collect();
    let mut referrers: Option<HashMap<NodeId, Vec<NodeId>>> = None;
    let step_limit = (base.len() + delta.updated.len() + starts.len()) * 4 + 16;
    let mut steps = 0usize;

    while let Some((id, force_check_parent)) = queue.pop_front() {
        steps += 1;
        if steps > step_limit {
            warn!(steps, "Metrics propagation exceeded step limit; tree may contain a cycle");
            break;
        }

        let (updated, parent_id) = {
            let view = delta.over(base);
            let Some(node) = view.node(&id) else {
                continue;
            };
            let metrics = calculate_for(&view, node);
            let updated = if metrics != node.calculated_metrics {
                let mut node = node.clone();
                node.calculated_metrics = metrics;
                Some(node)
            } else {
                None
            };
            (updated, node.parent_id)
        };

        let changed = updated.is_some();
        if let Some(node) = updated {
            trace!(node_id = %id, readiness_level = node.calculated_metrics.readiness_level, "Metrics changed");
            let node_type = node.node_type;
            delta.upsert(node);

            if node_type == NodeType::Map {
                let index = referrers.get_or_insert_with(|| referrer_index(&delta.over(base)));
                if let Some(ids) = index.get(&id) {
                    queue.extend(ids.iter().map(|r| (*r, false)));
                }
            }
        }

        if changed || force_check_parent {
            if let Some(parent_id) = parent_id {
                queue.push_back((parent_id, false));
            }
        } else {
            trace!(node_id = %id, "Metrics unchanged; propagation stops");
        }
    }
}

/// Recompute every node's metrics bottom-up, ignoring stored values.
///
/// Returns a delta holding only nodes whose calculated metrics differ from
/// what `nodes` currently stores. Map trees are computed first so that
/// references into them resolve to final values. Passes repeat until one
/// changes nothing; a chain of references settles in at most one pass per
/// node.
pub fn recompute_all(nodes: &TreeNodeSet) -> TreeNodeSetDelta {
    let mut computed: TreeNodeSet = nodes.clone();
    let mut order: Vec<NodeId> = Vec::with_capacity(nodes.len());
    let mut seen: HashSet<NodeId> = HashSet::with_capacity(nodes.len());

    for node_type in NodeType::ALL {
        for root in nodes.roots_of(node_type) {
            for id in walker::post_order(nodes, &root) {
                if seen.insert(id) {
                    order.push(id);
                }
            }
        }
    }
    // Nodes unreachable from any root still get a value.
    let mut stragglers: Vec<NodeId> = nodes.keys().filter(|id| !seen.contains(id)).copied().collect();
    stragglers.sort();
    order.extend(stragglers);

    let max_passes = order.len() + 1;
    let mut settled = false;
    for pass in 0..max_passes {
        let mut changed = false;
        for id in &order {
            let Some(node) = computed.get(id) else {
                continue;
            };
            let metrics = calculate_for(&computed, node);
            if metrics != node.calculated_metrics {
                if let Some(node) = computed.get_mut(id) {
                    node.calculated_metrics = metrics;
                }
                changed = true;
            }
        }
        if !changed {
            debug!(pass, "Metrics recomputation settled");
            settled = true;
            break;
        }
    }
    if !settled {
        warn!(passes = max_passes, "Metrics recomputation did not settle; references may form a cycle");
    }

    let mut delta = TreeNodeSetDelta::new();
    for (id, node) in computed {
        if nodes
            .get(&id)
            .map(|old| old.calculated_metrics != node.calculated_metrics)
            .unwrap_or(false)
        {
            delta.upsert(node);
        }
    }
    delta
}
