//! Shared identifiers and enumerations for tree nodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable node identifier. Assigned once at creation and never reused.
pub type NodeId = Uuid;

/// Generate a fresh node identifier.
pub fn new_node_id() -> NodeId {
    Uuid::new_v4()
}

/// The kind of tree a node belongs to. Every type owns exactly one root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Map,
    Waypoint,
    User,
}

impl NodeType {
    /// All declared types, in storage order.
    pub const ALL: [NodeType; 3] = [NodeType::Map, NodeType::Waypoint, NodeType::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Map => "map",
            NodeType::Waypoint => "waypoint",
            NodeType::User => "user",
        }
    }

    /// Directory name holding documents of this type.
    pub fn plural(&self) -> &'static str {
        match self {
            NodeType::Map => "maps",
            NodeType::Waypoint => "waypoints",
            NodeType::User => "users",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "map" | "maps" => Ok(NodeType::Map),
            "waypoint" | "waypoints" => Ok(NodeType::Waypoint),
            "user" | "users" => Ok(NodeType::User),
            other => Err(format!(
                "Unknown node type: {} (must be 'map', 'waypoint', or 'user')",
                other
            )),
        }
    }
}

/// Draft nodes are kept in the tree but never feed their parent's metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Draft,
    #[default]
    Active,
}

impl NodeState {
    pub fn is_active(&self) -> bool {
        matches!(self, NodeState::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeState::Draft => "draft",
            NodeState::Active => "active",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(NodeState::Draft),
            "active" => Ok(NodeState::Active),
            other => Err(format!(
                "Unknown node state: {} (must be 'draft' or 'active')",
                other
            )),
        }
    }
}
