//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ApiError, BootError};

/// Map domain/service errors to a string for CLI output. Boot failures carry their per-node
/// report in the error's own message.
pub fn map_error(e: &ApiError) -> String {
    match e {
        ApiError::BootError(BootError::Load(_)) => format!("Boot failed during load.\n{}", e),
        ApiError::BootError(BootError::Launch(_)) => format!("Boot failed during launch.\n{}", e),
        _ => e.to_string(),
    }
}
