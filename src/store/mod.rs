//! Tree Store
//!
//! Owns the current [`TreeNodeSet`] snapshot and mirrors it to disk. Every
//! mutation is computed as a delta by the pure tree engine, persisted, and
//! only then swapped in as the new snapshot.

pub mod document;
pub mod persistence;

pub use persistence::{FileStore, LoadReport};

use crate::error::StorageError;
use crate::tree::{NodeProperties, NodeUpdates, TreeNode, TreeNodeSet, TreeNodeSetDelta};
use crate::types::{NodeId, NodeType};
use async_trait::async_trait;
use std::sync::Arc;

/// Tree Store interface
///
/// Mutations return the delta that was applied; reads return the snapshot
/// current at the time of the call.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// The whole current snapshot.
    async fn get_all_nodes(&self) -> Result<Arc<TreeNodeSet>, StorageError>;

    async fn get_node(&self, node_id: NodeId) -> Result<TreeNode, StorageError>;

    /// Create a node. Without a parent the node goes under the root of its
    /// type, or becomes that root if the type has none yet.
    async fn create_node(
        &self,
        node_type: NodeType,
        properties: NodeProperties,
        parent_id: Option<NodeId>,
        index: Option<isize>,
    ) -> Result<TreeNodeSetDelta, StorageError>;

    async fn update_node(
        &self,
        node_id: NodeId,
        updates: NodeUpdates,
    ) -> Result<TreeNodeSetDelta, StorageError>;

    /// Remove a node and its whole subtree.
    async fn remove_node(&self, node_id: NodeId) -> Result<TreeNodeSetDelta, StorageError>;

    async fn set_node_parent(
        &self,
        node_id: NodeId,
        parent_id: NodeId,
        index: Option<isize>,
    ) -> Result<TreeNodeSetDelta, StorageError>;

    /// Mirror the referenced map subtree under a waypoint.
    async fn sync_waypoints(&self, waypoint_id: NodeId) -> Result<TreeNodeSetDelta, StorageError>;

    /// Run healing and a full metrics recomputation on the current snapshot.
    async fn heal(&self) -> Result<TreeNodeSetDelta, StorageError>;
}
