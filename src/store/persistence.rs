//! File-backed tree store.
//!
//! Layout: `<root>/<type-plural>/<filename>`, one markdown document per node.

use crate::error::{StorageError, TreeError};
use crate::store::document::{self, ParsedNode};
use crate::store::TreeStore;
use crate::tree::delta::DeltaBuilder;
use crate::tree::heal::{heal, RootTemplates};
use crate::tree::metrics::recompute_all;
use crate::tree::{
    apply_delta, merge_deltas, NodeLookup, NodeProperties, NodeUpdates, TreeNode, TreeNodeSet,
    TreeNodeSetDelta,
};
use crate::types::{new_node_id, NodeId, NodeType};
use crate::waypoint;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Extension of node documents.
const DOCUMENT_EXTENSION: &str = "md";

/// What loading had to do to bring the directory into a consistent state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub documents_read: usize,
    /// Documents whose front matter had missing or malformed fields.
    pub documents_repaired: usize,
    /// Documents whose front matter could not be parsed at all.
    pub documents_corrupt: usize,
    /// Documents whose id collided with an earlier one and got a fresh id.
    pub duplicate_ids: usize,
    /// Nodes changed by healing.
    pub nodes_healed: usize,
    /// Nodes whose calculated metrics were out of date.
    pub nodes_recomputed: usize,
    pub documents_written: usize,
}

/// Tree store persisted as front-matter documents.
pub struct FileStore {
    root: PathBuf,
    templates: RootTemplates,
    snapshot: RwLock<Arc<TreeNodeSet>>,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at `root`, creating the type directories as needed.
    ///
    /// Every document is read, repaired, healed and recomputed; each node
    /// changed along the way is written back before the store is returned.
    #[instrument(skip(root, templates), fields(root = %root.as_ref().display()))]
    pub async fn open<P: AsRef<Path>>(
        root: P,
        templates: RootTemplates,
    ) -> Result<(Self, LoadReport), StorageError> {
        let root = root.as_ref().to_path_buf();
        let mut report = LoadReport::default();
        let mut nodes = TreeNodeSet::new();
        let mut dirty: HashSet<NodeId> = HashSet::new();

        for node_type in NodeType::ALL {
            let dir = root.join(node_type.plural());
            fs::create_dir_all(&dir).await.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory {:?}: {}", dir, e),
                ))
            })?;

            for path in list_documents(&dir).await? {
                let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
                    continue;
                };
                let bytes = fs::read(&path).await?;
                let content = String::from_utf8_lossy(&bytes);
                let ParsedNode {
                    mut node,
                    mut repairs,
                    mut corrupt,
                } = document::parse_node(&content, node_type, filename, &path);
                report.documents_read += 1;

                if std::str::from_utf8(&bytes).is_err() {
                    corrupt = true;
                    repairs.push("invalid UTF-8 replaced".to_string());
                }
                if corrupt {
                    report.documents_corrupt += 1;
                    warn!(path = %path.display(), "Recovering corrupt document");
                    let backup = path.with_extension("md.bak");
                    fs::write(&backup, &bytes).await?;
                }
                if !repairs.is_empty() {
                    report.documents_repaired += 1;
                    debug!(path = %path.display(), ?repairs, "Repaired document");
                    dirty.insert(node.id);
                }
                if nodes.contains_key(&node.id) {
                    let fresh = new_node_id();
                    warn!(
                        path = %path.display(),
                        duplicate = %node.id,
                        fresh = %fresh,
                        "Duplicate node id, assigning a fresh one"
                    );
                    node.id = fresh;
                    report.duplicate_ids += 1;
                    dirty.insert(fresh);
                }
                nodes.insert(node.id, node);
            }
        }

        let healed = heal(&nodes, &templates);
        report.nodes_healed = healed.updated.len() + healed.removed.len();
        let nodes = apply_delta(&nodes, &healed);
        let recomputed = recompute_all(&nodes);
        report.nodes_recomputed = recomputed.updated.len();
        let nodes = apply_delta(&nodes, &recomputed);

        let settled = merge_deltas(&healed, &recomputed);
        dirty.extend(settled.updated.keys().copied());

        let store = Self {
            root,
            templates,
            snapshot: RwLock::new(Arc::new(TreeNodeSet::new())),
            write_lock: Mutex::new(()),
        };

        for node in settled.removed.values() {
            store.delete_document(node).await?;
        }
        for id in &dirty {
            if let Some(node) = nodes.get(id) {
                store.write_document(node).await?;
                report.documents_written += 1;
            }
        }
        *store.snapshot.write() = Arc::new(nodes);

        info!(
            documents = report.documents_read,
            repaired = report.documents_repaired,
            corrupt = report.documents_corrupt,
            healed = report.nodes_healed,
            written = report.documents_written,
            "Tree store loaded"
        );
        Ok((store, report))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates(&self) -> &RootTemplates {
        &self.templates
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<TreeNodeSet> {
        self.snapshot.read().clone()
    }

    /// Path of the document holding `node`.
    pub fn document_path(&self, node: &TreeNode) -> PathBuf {
        self.root.join(node.node_type.plural()).join(&node.filename)
    }

    /// Compute a delta against the current snapshot, persist it, then swap
    /// the snapshot. Mutations are serialized; a rejected operation touches
    /// neither disk nor snapshot.
    async fn commit<F>(&self, operation: F) -> Result<TreeNodeSetDelta, StorageError>
    where
        F: FnOnce(&TreeNodeSet) -> Result<TreeNodeSetDelta, TreeError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();
        let delta = operation(&current)?;
        if delta.is_empty() {
            return Ok(delta);
        }

        self.persist(&delta).await?;
        let next = apply_delta(&current, &delta);
        *self.snapshot.write() = Arc::new(next);
        debug!(
            updated = delta.updated.len(),
            removed = delta.removed.len(),
            "Committed delta"
        );
        Ok(delta)
    }

    async fn persist(&self, delta: &TreeNodeSetDelta) -> Result<(), StorageError> {
        for node in delta.updated.values() {
            self.write_document(node).await?;
        }
        for node in delta.removed.values() {
            self.delete_document(node).await?;
        }
        Ok(())
    }

    /// Write a document atomically: temp file, then rename over the target.
    async fn write_document(&self, node: &TreeNode) -> Result<(), StorageError> {
        let path = self.document_path(node);
        let temp_path = path.with_extension("md.tmp");
        let content = document::stringify(node)?;

        fs::write(&temp_path, content.as_bytes()).await.map_err(|e| {
            StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to write document to {:?}: {}", temp_path, e),
            ))
        })?;

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to rename temp file to {:?}: {}", path, e),
            )));
        }
        Ok(())
    }

    async fn delete_document(&self, node: &TreeNode) -> Result<(), StorageError> {
        let path = self.document_path(node);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to delete document {:?}: {}", path, e),
            ))),
        }
    }
}

/// Documents directly inside `dir`, sorted by filename so load order is
/// stable across platforms.
async fn list_documents(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut entries = fs::read_dir(dir).await?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_document = path
            .extension()
            .map(|ext| ext == DOCUMENT_EXTENSION)
            .unwrap_or(false);
        if is_document && entry.file_type().await?.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Heal the set, then recompute every metric on the healed result.
fn heal_and_recompute(nodes: &TreeNodeSet, templates: &RootTemplates) -> TreeNodeSetDelta {
    let healed = heal(nodes, templates);
    let after = apply_delta(nodes, &healed);
    let recomputed = recompute_all(&after);
    merge_deltas(&healed, &recomputed)
}

#[async_trait]
impl TreeStore for FileStore {
    async fn get_all_nodes(&self) -> Result<Arc<TreeNodeSet>, StorageError> {
        Ok(self.snapshot())
    }

    async fn get_node(&self, node_id: NodeId) -> Result<TreeNode, StorageError> {
        self.snapshot()
            .get(&node_id)
            .cloned()
            .ok_or(StorageError::Tree(TreeError::NotFound(node_id)))
    }

    #[instrument(skip(self, properties), fields(title = %properties.title))]
    async fn create_node(
        &self,
        node_type: NodeType,
        properties: NodeProperties,
        parent_id: Option<NodeId>,
        index: Option<isize>,
    ) -> Result<TreeNodeSetDelta, StorageError> {
        let node = TreeNode::from_properties(node_type, properties);
        self.commit(move |nodes| {
            let mut builder = DeltaBuilder::new(nodes);
            match parent_id.or_else(|| nodes.root_of(node_type)) {
                Some(parent_id) => builder.add(node, parent_id, index)?,
                None => builder.add_root(node)?,
            }
            Ok(builder.finish())
        })
        .await
    }

    #[instrument(skip(self, updates))]
    async fn update_node(
        &self,
        node_id: NodeId,
        updates: NodeUpdates,
    ) -> Result<TreeNodeSetDelta, StorageError> {
        self.commit(move |nodes| crate::tree::delta::update_node(nodes, node_id, &updates))
            .await
    }

    #[instrument(skip(self))]
    async fn remove_node(&self, node_id: NodeId) -> Result<TreeNodeSetDelta, StorageError> {
        self.commit(move |nodes| crate::tree::delta::remove_node(nodes, node_id))
            .await
    }

    #[instrument(skip(self))]
    async fn set_node_parent(
        &self,
        node_id: NodeId,
        parent_id: NodeId,
        index: Option<isize>,
    ) -> Result<TreeNodeSetDelta, StorageError> {
        self.commit(move |nodes| {
            crate::tree::delta::reparent_node(nodes, node_id, parent_id, index, None)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn sync_waypoints(&self, waypoint_id: NodeId) -> Result<TreeNodeSetDelta, StorageError> {
        self.commit(move |nodes| waypoint::sync_waypoints(nodes, waypoint_id))
            .await
    }

    #[instrument(skip(self))]
    async fn heal(&self) -> Result<TreeNodeSetDelta, StorageError> {
        let templates = self.templates.clone();
        self.commit(move |nodes| Ok(heal_and_recompute(nodes, &templates)))
            .await
    }
}
