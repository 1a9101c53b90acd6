//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, StorageError, TreeError};

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::StorageError(StorageError::Tree(TreeError::NotFound(id))) => {
            format!("not found: {}", id)
        }
        ApiError::StorageError(StorageError::Tree(TreeError::InvalidOperation(msg))) => {
            format!("invalid operation: {}", msg)
        }
        ApiError::ConfigError(msg) => format!("configuration error: {}", msg),
        ApiError::InvalidArgument(msg) => format!("invalid argument: {}", msg),
        ApiError::StorageError(other) => format!("storage error: {}", other),
    }
}
