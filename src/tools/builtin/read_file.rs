//! read_file tool.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

const MAX_OUTPUT_CHARS: usize = 50_000;

/// Read a file from the workspace.
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a file. Path is relative to the workspace."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        match tokio::fs::read_to_string(&full_path).await {
            Ok(content) => {
                ctx.track_read(&full_path).await;
                debug!(%path, bytes = content.len(), "ReadFileTool: read");
                if content.len() > MAX_OUTPUT_CHARS {
                    ToolResult::success(format!(
                        "{}...\n[truncated, {} chars total]",
                        &content[..MAX_OUTPUT_CHARS],
                        content.len()
                    ))
                } else {
                    ToolResult::success(content)
                }
            }
            Err(e) => ToolResult::error(format!("Failed to read {}: {}", path, e)),
        }
    }
}
