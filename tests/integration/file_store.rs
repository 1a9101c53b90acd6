//! FileStore mutations end to end: delta, disk and reload agree.

use super::test_utils::{create, readiness, TestStore};
use trellis::error::TreeError;
use trellis::tree::metrics::MetricUpdate;
use trellis::tree::NodeUpdates;
use trellis::types::{NodeId, NodeState, NodeType};
use trellis::TreeStore;

struct Scenario {
    r: NodeId,
    a: NodeId,
    b: NodeId,
    c: NodeId,
    d: NodeId,
}

async fn build_scenario(store: &trellis::FileStore) -> Scenario {
    let r = create(store, NodeType::Map, "R", None).await;
    let a = create(store, NodeType::Map, "A", Some(r)).await;
    let b = create(store, NodeType::Map, "B", Some(r)).await;
    let c = create(store, NodeType::Map, "C", Some(b)).await;
    let d = create(store, NodeType::Map, "D", Some(b)).await;
    store
        .update_node(a, NodeUpdates::readiness_level(MetricUpdate::Set(2)))
        .await
        .unwrap();
    store
        .update_node(c, NodeUpdates::readiness_level(MetricUpdate::Set(3)))
        .await
        .unwrap();
    Scenario { r, a, b, c, d }
}

#[tokio::test]
async fn test_scenario_metrics_survive_reload() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let s = build_scenario(&store).await;

    let nodes = store.snapshot();
    assert_eq!(readiness(&nodes, &s.d), 0);
    assert_eq!(readiness(&nodes, &s.b), 0);
    assert_eq!(readiness(&nodes, &s.r), 0);

    let delta = store
        .update_node(s.d, NodeUpdates::readiness_level(MetricUpdate::Set(5)))
        .await
        .unwrap();
    assert!(delta.updated.contains_key(&s.b));
    assert!(delta.updated.contains_key(&s.r));

    let nodes = store.snapshot();
    assert_eq!(readiness(&nodes, &s.b), 3);
    assert_eq!(readiness(&nodes, &s.r), 2);
    drop(store);

    let (reopened, report) = ts.open().await;
    assert_eq!(report.documents_read, 5);
    assert_eq!(report.documents_written, 0);
    assert_eq!(*reopened.snapshot(), *nodes);
}

#[tokio::test]
async fn test_remove_cascades_to_disk() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let s = build_scenario(&store).await;

    let delta = store.remove_node(s.b).await.unwrap();
    let removed: Vec<&NodeId> = delta.removed.keys().collect();
    assert_eq!(removed.len(), 3);
    for id in [s.b, s.c, s.d] {
        assert!(delta.removed.contains_key(&id));
    }
    assert_eq!(ts.document_count(NodeType::Map), 2);

    let root = store.get_node(s.r).await.unwrap();
    assert_eq!(root.children_ids, vec![s.a]);
    assert_eq!(root.calculated_metrics.readiness_level, 2);
}

#[tokio::test]
async fn test_reparent_rewrites_both_chains() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let s = build_scenario(&store).await;

    store.set_node_parent(s.a, s.b, Some(0)).await.unwrap();
    let nodes = store.snapshot();
    assert_eq!(nodes[&s.r].children_ids, vec![s.b]);
    assert_eq!(nodes[&s.b].children_ids[0], s.a);
    assert_eq!(nodes[&s.a].parent_id, Some(s.b));
    // B = min(A=2, C=3, D=0), R follows B.
    assert_eq!(readiness(&nodes, &s.b), 0);
    assert_eq!(readiness(&nodes, &s.r), 0);

    let on_disk = ts.read_document(NodeType::Map, &nodes[&s.a].filename);
    assert!(on_disk.contains(&format!("parentId: {}", s.b)));
}

#[tokio::test]
async fn test_cycle_rejected_without_side_effects() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let s = build_scenario(&store).await;
    let before = store.snapshot();
    let files_before = ts.all_file_bytes();

    let err = store.set_node_parent(s.b, s.d, None).await.unwrap_err();
    assert!(matches!(err.tree_error(), Some(TreeError::InvalidOperation(_))));
    assert_eq!(*store.snapshot(), *before);
    assert_eq!(ts.all_file_bytes(), files_before);

    let err = store.set_node_parent(s.r, s.a, None).await.unwrap_err();
    assert!(matches!(err.tree_error(), Some(TreeError::InvalidOperation(_))));
    assert_eq!(ts.all_file_bytes(), files_before);
}

#[tokio::test]
async fn test_draft_child_stops_contributing() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let s = build_scenario(&store).await;

    store
        .update_node(s.d, NodeUpdates::node_state(NodeState::Draft))
        .await
        .unwrap();
    let nodes = store.snapshot();
    assert_eq!(readiness(&nodes, &s.b), 3);
    assert_eq!(readiness(&nodes, &s.r), 2);
}

#[tokio::test]
async fn test_title_change_keeps_filename() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let id = create(&store, NodeType::User, "Alice", None).await;
    let filename = store.get_node(id).await.unwrap().filename;

    let updates = NodeUpdates {
        title: Some("Alice Smith".to_string()),
        description: Some("Owns the launch.".to_string()),
        ..NodeUpdates::default()
    };
    store.update_node(id, updates).await.unwrap();

    assert_eq!(store.get_node(id).await.unwrap().filename, filename);
    assert_eq!(ts.document_count(NodeType::User), 1);
    let text = ts.read_document(NodeType::User, &filename);
    assert!(text.contains("title: Alice Smith"));
    assert!(text.ends_with("---\nOwns the launch."));
    assert!(!text.contains("description:"));
}

#[tokio::test]
async fn test_cross_type_parent_rejected() {
    let ts = TestStore::new();
    let (store, _) = ts.open().await;
    let map_root = create(&store, NodeType::Map, "Map", None).await;

    let err = store
        .create_node(
            NodeType::User,
            trellis::NodeProperties::titled("Bob"),
            Some(map_root),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err.tree_error(), Some(TreeError::InvalidOperation(_))));
    assert_eq!(ts.document_count(NodeType::User), 0);
}
