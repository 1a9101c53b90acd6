//! Healing converges in one pass from arbitrary structural damage.

use proptest::prelude::*;
use trellis::tree::delta::{add_node, add_root};
use trellis::tree::heal::{heal, RootTemplates};
use trellis::tree::walker;
use trellis::tree::{apply_delta, NodeLookup, TreeNode, TreeNodeSet};
use trellis::types::{new_node_id, NodeId, NodeType};

#[derive(Debug, Clone)]
enum Damage {
    MissingParent(usize),
    SelfParent(usize),
    ParentIsDescendant(usize, usize),
    Detach(usize),
    GhostChild(usize),
    ForgetChild(usize),
}

fn damage_strategy() -> impl Strategy<Value = Damage> {
    prop_oneof![
        any::<usize>().prop_map(Damage::MissingParent),
        any::<usize>().prop_map(Damage::SelfParent),
        (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Damage::ParentIsDescendant(a, b)),
        any::<usize>().prop_map(Damage::Detach),
        any::<usize>().prop_map(Damage::GhostChild),
        any::<usize>().prop_map(Damage::ForgetChild),
    ]
}

fn build(parents: &[usize]) -> (TreeNodeSet, Vec<NodeId>) {
    let root = TreeNode::new(NodeType::User, "root");
    let mut ids = vec![root.id];
    let mut nodes = apply_delta(&TreeNodeSet::new(), &add_root(&TreeNodeSet::new(), root).unwrap());
    for (k, parent) in parents.iter().enumerate() {
        let node = TreeNode::new(NodeType::User, format!("u{}", k));
        let id = node.id;
        let parent = ids[parent % ids.len()];
        nodes = apply_delta(&nodes, &add_node(&nodes, node, parent, None).unwrap());
        ids.push(id);
    }
    (nodes, ids)
}

fn inflict(nodes: &mut TreeNodeSet, ids: &[NodeId], damage: &Damage) {
    let at = |i: usize| ids[i % ids.len()];
    match *damage {
        Damage::MissingParent(i) => {
            if let Some(n) = nodes.get_mut(&at(i)) {
                n.parent_id = Some(new_node_id());
            }
        }
        Damage::SelfParent(i) => {
            let id = at(i);
            if let Some(n) = nodes.get_mut(&id) {
                n.parent_id = Some(id);
            }
        }
        Damage::ParentIsDescendant(i, j) => {
            let id = at(i);
            let below = walker::descendants(&*nodes, &id);
            let target = below[j % below.len()];
            if let Some(n) = nodes.get_mut(&id) {
                n.parent_id = Some(target);
            }
        }
        Damage::Detach(i) => {
            if let Some(n) = nodes.get_mut(&at(i)) {
                n.parent_id = None;
            }
        }
        Damage::GhostChild(i) => {
            if let Some(n) = nodes.get_mut(&at(i)) {
                n.children_ids.push(new_node_id());
            }
        }
        Damage::ForgetChild(i) => {
            if let Some(n) = nodes.get_mut(&at(i)) {
                n.children_ids.pop();
            }
        }
    }
}

#[test]
fn test_heal_converges_in_one_pass() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let templates = RootTemplates::default();

    runner
        .run(
            &(
                proptest::collection::vec(any::<usize>(), 0..10),
                proptest::collection::vec(damage_strategy(), 1..6),
            ),
            |(parents, damages)| {
                let (mut nodes, ids) = build(&parents);
                for damage in &damages {
                    inflict(&mut nodes, &ids, damage);
                }

                let healed = apply_delta(&nodes, &heal(&nodes, &templates));
                prop_assert_eq!(healed.roots_of(NodeType::User).len(), 1);
                for node in healed.values() {
                    prop_assert!(walker::reaches_root(&healed, &node.id));
                    for child in &node.children_ids {
                        prop_assert_eq!(healed[child].parent_id, Some(node.id));
                    }
                    if let Some(parent) = node.parent_id {
                        prop_assert!(healed[&parent].children_ids.contains(&node.id));
                    }
                }
                prop_assert!(heal(&healed, &templates).is_empty());
                Ok(())
            },
        )
        .unwrap();
}
