//! Waypoint sync through the store: mirroring, metrics and quarantine.

use super::test_utils::{create, created_id, readiness, TestStore};
use trellis::tree::metrics::MetricUpdate;
use trellis::tree::{Metadata, NodeProperties, NodeUpdates, REFERENCE_MAP_NODE_ID};
use trellis::types::{NodeId, NodeState, NodeType};
use trellis::waypoint::{is_holder, OLD_NODES_TITLE};
use trellis::{FileStore, TreeStore};

async fn create_waypoint_root(store: &FileStore, map_root: NodeId) -> NodeId {
    let mut metadata = Metadata::new();
    metadata.insert(
        REFERENCE_MAP_NODE_ID.to_string(),
        serde_json::Value::String(map_root.to_string()),
    );
    let properties = NodeProperties {
        metadata,
        ..NodeProperties::titled("Plan")
    };
    let before = store.snapshot();
    let delta = store
        .create_node(NodeType::Waypoint, properties, None, None)
        .await
        .unwrap();
    created_id(&before, &delta)
}

fn mirror_of(nodes: &trellis::TreeNodeSet, map_id: &NodeId) -> NodeId {
    nodes
        .values()
        .find(|n| n.node_type == NodeType::Waypoint && n.reference_map_node_id() == Some(*map_id))
        .map(|n| n.id)
        .unwrap()
}

#[tokio::test]
async fn test_sync_mirrors_map_and_follows_metrics() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let m = create(&store, NodeType::Map, "Launch", None).await;
    let x = create(&store, NodeType::Map, "Build", Some(m)).await;
    let y = create(&store, NodeType::Map, "Ship", Some(m)).await;
    let z = create(&store, NodeType::Map, "Announce", Some(y)).await;
    let w = create_waypoint_root(&store, m).await;

    let delta = store.sync_waypoints(w).await.unwrap();
    assert!(!delta.is_empty());

    let nodes = store.snapshot();
    let (wx, wy, wz) = (mirror_of(&nodes, &x), mirror_of(&nodes, &y), mirror_of(&nodes, &z));
    assert_eq!(nodes[&w].children_ids, vec![wx, wy]);
    assert_eq!(nodes[&wy].children_ids, vec![wz]);
    assert_eq!(nodes[&wz].title, "Announce");
    assert_eq!(ts.document_count(NodeType::Waypoint), 4);

    store
        .update_node(z, NodeUpdates::readiness_level(MetricUpdate::Set(4)))
        .await
        .unwrap();
    let nodes = store.snapshot();
    assert_eq!(readiness(&nodes, &wz), 4);

    assert!(store.sync_waypoints(w).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_removed_map_nodes_are_quarantined() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let m = create(&store, NodeType::Map, "Launch", None).await;
    let y = create(&store, NodeType::Map, "Ship", Some(m)).await;
    let z = create(&store, NodeType::Map, "Announce", Some(y)).await;
    let w = create_waypoint_root(&store, m).await;
    store.sync_waypoints(w).await.unwrap();
    let nodes = store.snapshot();
    let (wy, wz) = (mirror_of(&nodes, &y), mirror_of(&nodes, &z));

    store.remove_node(y).await.unwrap();
    store.sync_waypoints(w).await.unwrap();

    let nodes = store.snapshot();
    let holder = nodes[&w]
        .children_ids
        .iter()
        .copied()
        .find(|id| is_holder(&nodes[id]))
        .unwrap();
    assert_eq!(nodes[&holder].title, OLD_NODES_TITLE);
    assert_eq!(nodes[&holder].node_state, NodeState::Draft);
    assert_eq!(nodes[&wy].parent_id, Some(holder));
    assert_eq!(nodes[&wz].parent_id, Some(wy));
    // Nothing is deleted.
    assert_eq!(ts.document_count(NodeType::Waypoint), 4);
    drop(store);

    let (reopened, report) = ts.open().await;
    assert_eq!(report.documents_written, 0);
    assert!(reopened.sync_waypoints(w).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sync_requires_reference() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let w = create(&store, NodeType::Waypoint, "Loose", None).await;
    assert!(store.sync_waypoints(w).await.is_err());
}
