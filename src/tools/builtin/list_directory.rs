//! list_directory tool.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// List files and directories in a workspace path.
pub struct ListDirectoryTool;

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "List files and directories in a path. Directories end with '/'."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the workspace (default: .)"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = input["path"].as_str().unwrap_or(".");

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut dir = match tokio::fs::read_dir(&full_path).await {
            Ok(d) => d,
            Err(e) => return ToolResult::error(format!("Failed to read directory: {}", e)),
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let suffix = if metadata.is_dir() { "/" } else { "" };
            entries.push(format!("{}{}", name, suffix));
        }

        entries.sort();

        if entries.is_empty() {
            ToolResult::success("(empty directory)")
        } else {
            ToolResult::success(entries.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_list_directory() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("file.txt"), "x").unwrap();
        fs::create_dir(temp.path().join("subdir")).unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ListDirectoryTool.execute(serde_json::json!({}), &ctx).await;

        assert!(!result.is_error);
        assert_eq!(result.content, "file.txt\nsubdir/");
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ListDirectoryTool.execute(serde_json::json!({}), &ctx).await;
        assert_eq!(result.content, "(empty directory)");
    }

    #[tokio::test]
    async fn test_list_missing_directory() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = ListDirectoryTool
            .execute(serde_json::json!({"path": "missing"}), &ctx)
            .await;
        assert!(result.is_error);
    }
}
