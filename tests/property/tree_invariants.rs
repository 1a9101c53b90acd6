//! Random edit sequences keep every tree invariant.

use proptest::prelude::*;
use trellis::tree::delta::{add_node, add_root, remove_node, reparent_node, update_node};
use trellis::tree::heal::{heal, RootTemplates};
use trellis::tree::metrics::{recompute_all, MetricUpdate};
use trellis::tree::walker;
use trellis::tree::{apply_delta, NodeProperties, NodeUpdates, TreeNode, TreeNodeSet};
use trellis::types::{NodeId, NodeState, NodeType};

#[derive(Debug, Clone)]
enum Op {
    SetReadiness(usize, Option<u32>),
    ToggleState(usize),
    Remove(usize),
    Reparent(usize, usize, Option<isize>),
    Add(usize, Option<u32>),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<usize>(), proptest::option::of(0u32..10)).prop_map(|(i, v)| Op::SetReadiness(i, v)),
        any::<usize>().prop_map(Op::ToggleState),
        any::<usize>().prop_map(Op::Remove),
        (any::<usize>(), any::<usize>(), proptest::option::of(-2isize..4))
            .prop_map(|(a, b, i)| Op::Reparent(a, b, i)),
        (any::<usize>(), proptest::option::of(0u32..10)).prop_map(|(i, v)| Op::Add(i, v)),
    ]
}

/// A map tree whose node `k` hangs under one of the nodes before it.
fn tree_strategy() -> impl Strategy<Value = Vec<(usize, Option<u32>)>> {
    proptest::collection::vec((any::<usize>(), proptest::option::of(0u32..10)), 0..12)
}

fn build(shape: &[(usize, Option<u32>)]) -> (TreeNodeSet, Vec<NodeId>) {
    let root = TreeNode::new(NodeType::Map, "root");
    let mut ids = vec![root.id];
    let mut nodes = apply_delta(&TreeNodeSet::new(), &add_root(&TreeNodeSet::new(), root).unwrap());
    for (k, (parent, set)) in shape.iter().enumerate() {
        let mut props = NodeProperties::titled(format!("n{}", k));
        props.set_metrics.readiness_level = *set;
        let node = TreeNode::from_properties(NodeType::Map, props);
        let id = node.id;
        let parent = ids[parent % ids.len()];
        nodes = apply_delta(&nodes, &add_node(&nodes, node, parent, None).unwrap());
        ids.push(id);
    }
    (nodes, ids)
}

fn pick(nodes: &TreeNodeSet, i: usize) -> Option<NodeId> {
    let mut ids: Vec<NodeId> = nodes.keys().copied().collect();
    ids.sort();
    (!ids.is_empty()).then(|| ids[i % ids.len()])
}

fn assert_invariants(nodes: &TreeNodeSet) -> Result<(), TestCaseError> {
    for node in nodes.values() {
        prop_assert!(walker::reaches_root(nodes, &node.id));
        for child in &node.children_ids {
            prop_assert_eq!(nodes[child].parent_id, Some(node.id));
        }
        if let Some(parent) = node.parent_id {
            prop_assert!(nodes[&parent].children_ids.contains(&node.id));
        }
    }
    prop_assert!(recompute_all(nodes).is_empty(), "stored metrics match the rule");
    prop_assert!(heal(nodes, &RootTemplates::default()).is_empty(), "healthy set needs no healing");
    Ok(())
}

#[test]
fn test_edit_sequences_preserve_invariants() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(tree_strategy(), proptest::collection::vec(op_strategy(), 0..16)),
            |(shape, ops)| {
                let (mut nodes, _) = build(&shape);
                assert_invariants(&nodes)?;

                for op in ops {
                    let result = match op {
                        Op::SetReadiness(i, v) => {
                            let Some(id) = pick(&nodes, i) else { continue };
                            let update = v.map(MetricUpdate::Set).unwrap_or(MetricUpdate::Clear);
                            update_node(&nodes, id, &NodeUpdates::readiness_level(update))
                        }
                        Op::ToggleState(i) => {
                            let Some(id) = pick(&nodes, i) else { continue };
                            let state = match nodes[&id].node_state {
                                NodeState::Active => NodeState::Draft,
                                NodeState::Draft => NodeState::Active,
                            };
                            update_node(&nodes, id, &NodeUpdates::node_state(state))
                        }
                        Op::Remove(i) => {
                            let Some(id) = pick(&nodes, i) else { continue };
                            remove_node(&nodes, id)
                        }
                        Op::Reparent(a, b, index) => {
                            let (Some(id), Some(parent)) = (pick(&nodes, a), pick(&nodes, b)) else {
                                continue;
                            };
                            reparent_node(&nodes, id, parent, index, None)
                        }
                        Op::Add(i, set) => {
                            let Some(parent) = pick(&nodes, i) else { continue };
                            let mut props = NodeProperties::titled("added");
                            props.set_metrics.readiness_level = set;
                            add_node(&nodes, TreeNode::from_properties(NodeType::Map, props), parent, None)
                        }
                    };

                    let Ok(delta) = result else {
                        continue;
                    };
                    let next = apply_delta(&nodes, &delta);
                    prop_assert_eq!(&apply_delta(&next, &delta), &next, "applying twice changes nothing");
                    for id in delta.updated.keys() {
                        prop_assert!(!delta.removed.contains_key(id));
                    }
                    nodes = next;
                    assert_invariants(&nodes)?;
                }
                Ok(())
            },
        )
        .unwrap();
}

#[test]
fn test_reparent_under_own_subtree_always_fails() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(tree_strategy(), any::<usize>(), any::<usize>()), |(shape, a, b)| {
            let (nodes, ids) = build(&shape);
            let id = ids[a % ids.len()];
            let subtree = walker::descendants(&nodes, &id);
            let target = subtree[b % subtree.len()];

            prop_assert!(reparent_node(&nodes, id, target, None, None).is_err());
            Ok(())
        })
        .unwrap();
}
