//! # Skirmish Development Tools
//!
//! Command-line helpers for content and replay work:
//! - Catalog and scenario validation
//! - Replay playback with desync and skip reports
//! - Command log dumps

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod dump;
pub mod playback;
pub mod validate;

use skirmish_core::error::GameError;
use thiserror::Error;

/// Failures of a tool run.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The core rejected a file or state.
    #[error(transparent)]
    Game(#[from] GameError),
    /// A file could not be read or written.
    #[error("{path}: {source}")]
    Io {
        /// File involved.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// A report could not be encoded.
    #[error("Failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for tool operations.
pub type Result<T> = std::result::Result<T, ToolError>;

pub(crate) fn read_text(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| ToolError::Io {
        path: path.display().to_string(),
        source,
    })
}
