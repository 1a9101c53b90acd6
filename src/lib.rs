//! Trellis: a status tree of maps, waypoints and users
//!
//! Nodes live in an immutable snapshot; every edit is a pure function that
//! returns a minimal delta, with derived metrics propagated up the tree and
//! across map references. The file store mirrors the snapshot as markdown
//! documents with YAML front matter and heals damage on load.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod tree;
pub mod types;
pub mod waypoint;

pub use error::{ApiError, StorageError, TreeError};
pub use store::{FileStore, TreeStore};
pub use tree::{NodeProperties, NodeUpdates, TreeNode, TreeNodeSet, TreeNodeSetDelta};
pub use types::{NodeId, NodeState, NodeType};
