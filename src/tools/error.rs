//! Tool infrastructure errors.
//!
//! These never cross the turn loop as exceptions; they are rendered into the
//! tool-result text so the model can react.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path {path} is outside the workspace and not in the allowed external paths")]
    SandboxViolation { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}
