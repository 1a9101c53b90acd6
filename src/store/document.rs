//! Node documents: YAML front matter followed by a markdown body.
//!
//! ```text
//! ---
//! id: 6f1c...
//! type: map
//! title: Launch
//! nodeState: active
//! parentId: null
//! childrenIds: []
//! calculatedMetrics:
//!   readinessLevel: 0
//! ---
//! Body text is the node description.
//! ```
//!
//! Parsing is tolerant: each front matter field is read on its own, and a
//! missing or malformed field is synthesized and reported as a repair so the
//! caller can rewrite the document.

use crate::error::StorageError;
use crate::tree::metrics::{CalculatedMetrics, SetMetrics};
use crate::tree::{Metadata, TreeNode};
use crate::types::{new_node_id, NodeId, NodeState, NodeType};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Front matter delimiter line.
pub const DELIMITER: &str = "---";

/// Title given to documents that have none.
pub const UNTITLED: &str = "Untitled";

/// A document split into its raw front matter and body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument<'a> {
    pub front_matter: Option<&'a str>,
    pub body: &'a str,
}

/// Split `content` at its `---` delimiters.
///
/// A leading BOM and CRLF line endings are tolerated. Content that does not
/// open with a delimiter line, or never closes it, has no front matter.
pub fn split(content: &str) -> RawDocument<'_> {
    let stripped = content.trim_start_matches('\u{feff}');
    let no_front_matter = RawDocument {
        front_matter: None,
        body: stripped,
    };

    let Some(first_line_end) = stripped.find('\n') else {
        return no_front_matter;
    };
    if stripped[..first_line_end].trim_end() != DELIMITER {
        return no_front_matter;
    }

    let rest = &stripped[first_line_end + 1..];
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == DELIMITER {
            let front_matter = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return RawDocument {
                front_matter: Some(front_matter),
                body,
            };
        }
        offset += line.len();
    }
    no_front_matter
}

/// Parse front matter YAML into a mapping.
///
/// Empty front matter is an empty mapping. Anything that is not a mapping is
/// corruption.
pub fn parse_front_matter(yaml: &str, path: &Path) -> Result<serde_yaml::Mapping, StorageError> {
    if yaml.trim().is_empty() {
        return Ok(serde_yaml::Mapping::new());
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(yaml).map_err(|e| StorageError::Corruption {
            path: path.to_path_buf(),
            reason: format!("unparsable front matter: {}", e),
        })?;
    match value {
        serde_yaml::Value::Mapping(map) => Ok(map),
        serde_yaml::Value::Null => Ok(serde_yaml::Mapping::new()),
        other => Err(StorageError::Corruption {
            path: path.to_path_buf(),
            reason: format!("front matter is not a mapping: {:?}", other),
        }),
    }
}

/// Front matter as written to disk. Field order is the on-disk order.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrontMatterOut<'a> {
    id: &'a NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    title: &'a str,
    node_state: NodeState,
    parent_id: Option<&'a NodeId>,
    children_ids: &'a [NodeId],
    #[serde(skip_serializing_if = "Metadata::is_empty")]
    metadata: &'a Metadata,
    #[serde(skip_serializing_if = "SetMetrics::is_empty")]
    set_metrics: &'a SetMetrics,
    calculated_metrics: &'a CalculatedMetrics,
}

/// Render `node` as a front-matter document.
pub fn stringify(node: &TreeNode) -> Result<String, StorageError> {
    let front = FrontMatterOut {
        id: &node.id,
        node_type: node.node_type,
        title: &node.title,
        node_state: node.node_state,
        parent_id: node.parent_id.as_ref(),
        children_ids: &node.children_ids,
        metadata: &node.metadata,
        set_metrics: &node.set_metrics,
        calculated_metrics: &node.calculated_metrics,
    };
    let yaml = serde_yaml::to_string(&front)
        .map_err(|e| StorageError::Serialization(format!("Failed to render front matter: {}", e)))?;

    let mut out = String::with_capacity(yaml.len() + node.description.len() + 16);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&node.description);
    Ok(out)
}

/// A node read from disk plus everything that had to be synthesized.
#[derive(Debug, Clone)]
pub struct ParsedNode {
    pub node: TreeNode,
    /// Human-readable repairs; non-empty means the document must be rewritten.
    pub repairs: Vec<String>,
    /// The front matter could not be parsed at all.
    pub corrupt: bool,
}

impl ParsedNode {
    pub fn needs_rewrite(&self) -> bool {
        !self.repairs.is_empty()
    }
}

/// Read one field, recording a repair when it is present but malformed.
fn field<T: DeserializeOwned>(
    map: &serde_yaml::Mapping,
    key: &str,
    repairs: &mut Vec<String>,
) -> Option<T> {
    let value = map.get(serde_yaml::Value::String(key.to_string()))?;
    match serde_yaml::from_value::<T>(value.clone()) {
        Ok(v) => Some(v),
        Err(e) => {
            repairs.push(format!("invalid {}: {}", key, e));
            None
        }
    }
}

fn has_key(map: &serde_yaml::Mapping, key: &str) -> bool {
    map.contains_key(serde_yaml::Value::String(key.to_string()))
}

fn parse_id(raw: Option<String>, key: &str, repairs: &mut Vec<String>) -> Option<NodeId> {
    let raw = raw?;
    match raw.trim().parse::<NodeId>() {
        Ok(id) => Some(id),
        Err(_) => {
            repairs.push(format!("invalid {}: {:?}", key, raw));
            None
        }
    }
}

/// Build a node from document `content` stored as `filename` in the
/// directory of `node_type`.
///
/// The directory decides the type. Never fails: unparsable front matter is
/// reported through [`ParsedNode::corrupt`] and everything is synthesized.
pub fn parse_node(content: &str, node_type: NodeType, filename: &str, path: &Path) -> ParsedNode {
    let raw = split(content);
    let mut repairs = Vec::new();
    let mut corrupt = false;

    let map = match raw.front_matter {
        None => {
            repairs.push("missing front matter".to_string());
            serde_yaml::Mapping::new()
        }
        Some(yaml) => match parse_front_matter(yaml, path) {
            Ok(map) => map,
            Err(e) => {
                corrupt = true;
                repairs.push(e.to_string());
                serde_yaml::Mapping::new()
            }
        },
    };

    let id = match parse_id(field::<String>(&map, "id", &mut repairs), "id", &mut repairs) {
        Some(id) => id,
        None => {
            if !has_key(&map, "id") {
                repairs.push("missing id".to_string());
            }
            new_node_id()
        }
    };

    let title = match field::<String>(&map, "title", &mut repairs) {
        Some(t) if !t.trim().is_empty() => t,
        _ => {
            repairs.push("missing title".to_string());
            UNTITLED.to_string()
        }
    };

    if let Some(declared) = field::<NodeType>(&map, "type", &mut repairs) {
        if declared != node_type {
            repairs.push(format!(
                "type {} does not match directory type {}",
                declared, node_type
            ));
        }
    } else if !has_key(&map, "type") {
        repairs.push("missing type".to_string());
    }

    let node_state = field::<NodeState>(&map, "nodeState", &mut repairs).unwrap_or_else(|| {
        if !has_key(&map, "nodeState") {
            repairs.push("missing nodeState".to_string());
        }
        NodeState::Active
    });

    if !has_key(&map, "parentId") {
        repairs.push("missing parentId".to_string());
    }
    let parent_id = parse_id(
        field::<Option<String>>(&map, "parentId", &mut repairs).flatten(),
        "parentId",
        &mut repairs,
    );

    let children_ids = match field::<Vec<String>>(&map, "childrenIds", &mut repairs) {
        Some(raw_ids) => {
            let parsed: Vec<NodeId> = raw_ids.iter().filter_map(|s| s.trim().parse().ok()).collect();
            if parsed.len() != raw_ids.len() {
                repairs.push("dropped malformed childrenIds entries".to_string());
            }
            parsed
        }
        None => {
            if !has_key(&map, "childrenIds") {
                repairs.push("missing childrenIds".to_string());
            }
            Vec::new()
        }
    };

    let metadata = field::<Metadata>(&map, "metadata", &mut repairs).unwrap_or_default();
    let set_metrics = field::<SetMetrics>(&map, "setMetrics", &mut repairs).unwrap_or_default();
    let calculated_metrics =
        field::<CalculatedMetrics>(&map, "calculatedMetrics", &mut repairs).unwrap_or_default();

    let mut description = raw.body.to_string();
    if description.trim().is_empty() {
        if let Some(front_description) = field::<String>(&map, "description", &mut repairs) {
            if !front_description.is_empty() {
                repairs.push("moved description into body".to_string());
                description = front_description;
            }
        }
    }

    ParsedNode {
        node: TreeNode {
            id,
            node_type,
            parent_id,
            children_ids,
            title,
            description,
            metadata,
            set_metrics,
            calculated_metrics,
            filename: filename.to_string(),
            node_state,
        },
        repairs,
        corrupt,
    }
}
