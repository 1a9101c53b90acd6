//! Tree node records and the update payloads that modify them.

use crate::tree::metrics::{CalculatedMetrics, MetricUpdate, SetMetrics, SetMetricsUpdate};
use crate::types::{new_node_id, NodeId, NodeState, NodeType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key holding a weak cross-reference to a node of type map.
pub const REFERENCE_MAP_NODE_ID: &str = "referenceMapNodeId";

/// Free-form scalar metadata attached to a node.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One entry in the tree.
///
/// Relations (`parent_id`, `children_ids`, `referenceMapNodeId`) are ids
/// resolved through the owning [`TreeNodeSet`](crate::tree::TreeNodeSet),
/// never direct references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub children_ids: Vec<NodeId>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub set_metrics: SetMetrics,
    #[serde(default)]
    pub calculated_metrics: CalculatedMetrics,
    pub filename: String,
    #[serde(default)]
    pub node_state: NodeState,
}

impl TreeNode {
    /// Create a detached node with a fresh id and an id-based filename.
    pub fn new(node_type: NodeType, title: impl Into<String>) -> Self {
        let id = new_node_id();
        Self {
            id,
            node_type,
            parent_id: None,
            children_ids: Vec::new(),
            title: title.into(),
            description: String::new(),
            metadata: Metadata::new(),
            set_metrics: SetMetrics::default(),
            calculated_metrics: CalculatedMetrics::default(),
            filename: filename_for(&id),
            node_state: NodeState::Active,
        }
    }

    /// Build a detached node from creation properties.
    pub fn from_properties(node_type: NodeType, properties: NodeProperties) -> Self {
        let mut node = Self::new(node_type, properties.title);
        node.description = properties.description;
        node.metadata = properties.metadata;
        node.set_metrics = properties.set_metrics;
        node.node_state = properties.node_state;
        node
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_active(&self) -> bool {
        self.node_state.is_active()
    }

    /// The map node this node mirrors, if the metadata names a valid id.
    pub fn reference_map_node_id(&self) -> Option<NodeId> {
        self.metadata
            .get(REFERENCE_MAP_NODE_ID)
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }

    pub fn set_reference_map_node_id(&mut self, id: NodeId) {
        self.metadata.insert(
            REFERENCE_MAP_NODE_ID.to_string(),
            serde_json::Value::String(id.to_string()),
        );
    }
}

/// Filename assigned at creation. Never changes afterwards, so title
/// renames do not churn the storage directory.
pub fn filename_for(id: &NodeId) -> String {
    format!("{}.md", id)
}

/// User-supplied properties for a node being created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeProperties {
    pub title: String,
    pub description: String,
    pub metadata: Metadata,
    pub set_metrics: SetMetrics,
    pub node_state: NodeState,
}

impl NodeProperties {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Partial update of a node. Absent fields are left unchanged.
///
/// Structural fields (`parent_id`, `children_ids`) are not updatable here;
/// moves go through reparenting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub set_metrics: SetMetricsUpdate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_state: Option<NodeState>,
}

impl NodeUpdates {
    pub fn readiness_level(update: MetricUpdate<u32>) -> Self {
        Self {
            set_metrics: SetMetricsUpdate {
                readiness_level: update,
            },
            ..Self::default()
        }
    }

    pub fn node_state(state: NodeState) -> Self {
        Self {
            node_state: Some(state),
            ..Self::default()
        }
    }

    /// Apply the non-structural fields to `node`. Returns whether the
    /// node's active/draft state changed.
    pub(crate) fn apply_to(&self, node: &mut TreeNode) -> bool {
        if let Some(title) = &self.title {
            node.title = title.clone();
        }
        if let Some(description) = &self.description {
            node.description = description.clone();
        }
        if let Some(metadata) = &self.metadata {
            node.metadata = metadata.clone();
        }
        node.set_metrics = self.set_metrics.apply(&node.set_metrics);
        match self.node_state {
            Some(state) if state != node.node_state => {
                node.node_state = state;
                true
            }
            _ => false,
        }
    }
}
