//! write_file tool.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Write content to a file, creating parent directories as needed.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a file. Creates parent directories if needed."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };

        let content = match input["content"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("content is required"),
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = full_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!("Failed to create directories: {}", e));
            }
        }

        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return ToolResult::error(format!("Failed to write file: {}", e));
        }

        // Mark as read so edit_file works immediately after write.
        ctx.track_read(&full_path).await;

        debug!(%path, bytes = content.len(), "WriteFileTool: wrote");
        ToolResult::success(format!("Wrote {} bytes to {}", content.len(), path))
    }
}
