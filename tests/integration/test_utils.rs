//! Shared test utilities for integration tests

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use trellis::store::FileStore;
use trellis::tree::heal::RootTemplates;
use trellis::tree::{NodeProperties, TreeNodeSet, TreeNodeSetDelta};
use trellis::types::{NodeId, NodeType};
use trellis::TreeStore;

/// Serializes tests that touch process environment variables.
pub static ENV_MUTEX: Mutex<()> = Mutex::new(());

/// A temporary storage root.
pub struct TestStore {
    pub dir: TempDir,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub async fn open(&self) -> (FileStore, trellis::store::LoadReport) {
        FileStore::open(self.root(), RootTemplates::default())
            .await
            .unwrap()
    }

    pub fn document_path(&self, node_type: NodeType, filename: &str) -> PathBuf {
        self.root().join(node_type.plural()).join(filename)
    }

    /// Write a raw document, creating the type directory.
    pub fn write_document(&self, node_type: NodeType, filename: &str, content: impl AsRef<[u8]>) {
        let dir = self.root().join(node_type.plural());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(filename), content).unwrap();
    }

    pub fn read_document(&self, node_type: NodeType, filename: &str) -> String {
        std::fs::read_to_string(self.document_path(node_type, filename)).unwrap()
    }

    pub fn document_count(&self, node_type: NodeType) -> usize {
        std::fs::read_dir(self.root().join(node_type.plural()))
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .filter(|e| e.path().extension().map(|x| x == "md").unwrap_or(false))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Raw bytes of every file under the storage root, keyed by path.
    pub fn all_file_bytes(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        for node_type in NodeType::ALL {
            let Ok(entries) = std::fs::read_dir(self.root().join(node_type.plural())) else {
                continue;
            };
            for entry in entries.filter_map(Result::ok) {
                let path = entry.path();
                if path.is_file() {
                    files.insert(path.clone(), std::fs::read(&path).unwrap());
                }
            }
        }
        files
    }
}

/// Front matter for a hand-written document.
pub fn document(
    id: &NodeId,
    node_type: NodeType,
    title: &str,
    parent: Option<&NodeId>,
    children: &[NodeId],
) -> String {
    let parent = parent
        .map(|p| p.to_string())
        .unwrap_or_else(|| "null".to_string());
    let children = children
        .iter()
        .map(|c| format!("\n  - {}", c))
        .collect::<String>();
    let children = if children.is_empty() {
        " []".to_string()
    } else {
        children
    };
    format!(
        "---\nid: {}\ntype: {}\ntitle: {}\nnodeState: active\nparentId: {}\nchildrenIds:{}\ncalculatedMetrics:\n  readinessLevel: 0\n---\n",
        id, node_type, title, parent, children
    )
}

/// The single node a creation delta added to `before`.
pub fn created_id(before: &TreeNodeSet, delta: &TreeNodeSetDelta) -> NodeId {
    let mut created = delta.updated.keys().filter(|id| !before.contains_key(id));
    let id = *created.next().expect("delta creates a node");
    assert!(created.next().is_none(), "delta creates exactly one node");
    id
}

/// Create a node and return its id.
pub async fn create(
    store: &FileStore,
    node_type: NodeType,
    title: &str,
    parent: Option<NodeId>,
) -> NodeId {
    let before = store.snapshot();
    let delta = store
        .create_node(node_type, NodeProperties::titled(title), parent, None)
        .await
        .unwrap();
    created_id(&before, &delta)
}

pub fn readiness(nodes: &TreeNodeSet, id: &NodeId) -> u32 {
    nodes[id].calculated_metrics.readiness_level
}
