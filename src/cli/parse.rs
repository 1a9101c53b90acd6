//! CLI parse: clap types for Trellis. No behavior; definitions only.

use crate::types::{NodeId, NodeState, NodeType};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Trellis CLI - status tree of maps, waypoints and users
#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Maintain a status tree of maps, waypoints and users stored as markdown")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, global = true, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long, global = true)]
    pub log_output: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Create a node; without --parent it goes under the root of its type
    Create {
        /// Node type (map, waypoint, user)
        node_type: NodeType,
        /// Node title
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Parent node id
        #[arg(long)]
        parent: Option<NodeId>,
        /// Position among the parent's children; negative appends
        #[arg(long, allow_hyphen_values = true)]
        index: Option<isize>,
        /// draft or active
        #[arg(long, default_value = "active")]
        state: NodeState,
        /// Readiness level override
        #[arg(long)]
        readiness: Option<u32>,
        /// Map node this node mirrors
        #[arg(long)]
        reference: Option<NodeId>,
    },
    /// Update fields of a node
    Update {
        id: NodeId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// draft or active
        #[arg(long)]
        state: Option<NodeState>,
        /// Set the readiness level override
        #[arg(long, conflicts_with = "clear_readiness")]
        readiness: Option<u32>,
        /// Remove the readiness level override
        #[arg(long)]
        clear_readiness: bool,
    },
    /// Remove a node and its subtree
    Remove { id: NodeId },
    /// Move a node under a new parent
    Move {
        id: NodeId,
        parent: NodeId,
        #[arg(long, allow_hyphen_values = true)]
        index: Option<isize>,
    },
    /// List nodes as an indented tree
    List {
        /// Restrict to one node type
        #[arg(long = "type")]
        node_type: Option<NodeType>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Show one node
    Show {
        id: NodeId,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Mirror the referenced map subtree under a waypoint
    Sync { waypoint: NodeId },
    /// Repair structure and recompute metrics
    Heal,
}

/// Rendering of `list` and `show` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    Json,
}
