//! Configuration System
//!
//! Layered configuration: built-in defaults, the global file, workspace files
//! and environment overrides, merged by the `config` crate.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::tree::heal::RootTemplates;
use crate::types::NodeType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrellisConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    /// Title and description of roots synthesized by healing
    #[serde(default)]
    pub node_types: RootTemplates,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the `maps/`, `waypoints/` and `users/` folders.
    /// Relative paths resolve against the workspace root.
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl StorageConfig {
    pub fn resolve(&self, workspace_root: &Path) -> PathBuf {
        if self.root.is_absolute() {
            self.root.clone()
        } else {
            workspace_root.join(&self.root)
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    Storage(String),
    NodeType(NodeType, String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::NodeType(node_type, msg) => {
                write!(f, "Node type '{}': {}", node_type, msg)
            }
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl TrellisConfig {
    /// Validate the entire configuration, reporting every problem found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.root.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Storage root cannot be empty".to_string(),
            ));
        }

        for node_type in NodeType::ALL {
            if self.node_types.for_type(node_type).title.trim().is_empty() {
                errors.push(ValidationError::NodeType(
                    node_type,
                    "Root title cannot be empty".to_string(),
                ));
            }
        }

        errors.extend(
            self.logging
                .validate()
                .into_iter()
                .map(ValidationError::Logging),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Load and validate in one step, flattening failures into an `ApiError`.
    pub fn load_validated(workspace_root: &Path, config_path: Option<&Path>) -> Result<Self, ApiError> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load(workspace_root)?,
        };
        config.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })?;
        Ok(config)
    }
}
