//! Error types for the Trellis tree engine and its persistence boundary.

use crate::types::NodeId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the pure tree operations.
///
/// A failed operation never produces a partial delta: the caller's snapshot
/// is left exactly as it was.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("Node not found: {0}")]
    NotFound(NodeId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Storage-related errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Corrupt document {path:?}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StorageError {
    /// The underlying tree error, if this failure came from the engine.
    pub fn tree_error(&self) -> Option<&TreeError> {
        match self {
            StorageError::Tree(e) => Some(e),
            _ => None,
        }
    }
}

/// Errors surfaced to the CLI and configuration layers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<TreeError> for ApiError {
    fn from(err: TreeError) -> Self {
        ApiError::StorageError(StorageError::Tree(err))
    }
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
