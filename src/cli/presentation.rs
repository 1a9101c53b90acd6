//! CLI presentation: text and json formatters for nodes and deltas.

use crate::cli::parse::OutputFormat;
use crate::error::{ApiError, StorageError};
use crate::tree::walker;
use crate::tree::{NodeLookup, TreeNode, TreeNodeSet, TreeNodeSetDelta};
use crate::types::NodeType;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use serde::Serialize;

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::StorageError(StorageError::Serialization(e.to_string())))
}

/// Nodes in tree order with their depth below the root, roots first by type.
fn tree_rows<'a>(nodes: &'a TreeNodeSet, node_type: Option<NodeType>) -> Vec<(usize, &'a TreeNode)> {
    let types: Vec<NodeType> = match node_type {
        Some(t) => vec![t],
        None => NodeType::ALL.to_vec(),
    };
    let mut rows = Vec::new();
    for t in types {
        for root in nodes.roots_of(t) {
            for id in walker::descendants(nodes, &root) {
                if let Some(node) = nodes.get(&id) {
                    rows.push((walker::ancestors(nodes, &id).len(), node));
                }
            }
        }
    }
    rows
}

fn readiness_cell(node: &TreeNode) -> String {
    match node.set_metrics.readiness_level {
        Some(set) => format!("{} (set {})", node.calculated_metrics.readiness_level, set),
        None => node.calculated_metrics.readiness_level.to_string(),
    }
}

pub fn format_node_list(
    nodes: &TreeNodeSet,
    node_type: Option<NodeType>,
    format: OutputFormat,
) -> Result<String, ApiError> {
    let rows = tree_rows(nodes, node_type);
    if format == OutputFormat::Json {
        let listed: Vec<&TreeNode> = rows.iter().map(|(_, node)| *node).collect();
        return to_json(&listed);
    }
    if rows.is_empty() {
        return Ok("No nodes.".to_string());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Title", "Type", "State", "Readiness", "Id"]);
    for (depth, node) in rows {
        table.add_row(vec![
            format!("{}{}", "  ".repeat(depth), node.title),
            node.node_type.to_string(),
            node.node_state.to_string(),
            readiness_cell(node),
            node.id.to_string(),
        ]);
    }
    Ok(table.to_string())
}

pub fn format_node(node: &TreeNode, format: OutputFormat) -> Result<String, ApiError> {
    if format == OutputFormat::Json {
        return to_json(node);
    }

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.add_row(vec!["Id".to_string(), node.id.to_string()]);
    table.add_row(vec!["Type".to_string(), node.node_type.to_string()]);
    table.add_row(vec!["Title".to_string(), node.title.clone()]);
    table.add_row(vec!["State".to_string(), node.node_state.to_string()]);
    table.add_row(vec!["Readiness".to_string(), readiness_cell(node)]);
    table.add_row(vec![
        "Parent".to_string(),
        node.parent_id.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec!["Children".to_string(), node.children_ids.len().to_string()]);
    for (key, value) in &node.metadata {
        table.add_row(vec![format!("metadata.{}", key), value.to_string()]);
    }

    let mut out = table.to_string();
    if !node.description.is_empty() {
        out.push_str("\n\n");
        out.push_str(node.description.trim_end());
    }
    Ok(out)
}

pub fn format_delta(delta: &TreeNodeSetDelta) -> Result<String, ApiError> {
    to_json(delta)
}
