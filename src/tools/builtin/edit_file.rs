//! edit_file tool - string replacement with read-before-edit validation.

use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;

use crate::tools::{Tool, ToolContext, ToolResult};

/// Replace an exact string in a file. Requires a prior read this turn.
pub struct EditFileTool;

#[async_trait]
impl Tool for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Replace an exact string in a file. Requires a prior read_file call."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "File path relative to the workspace"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact string to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement string"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let path = match input["file_path"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("file_path is required"),
        };
        let old_string = match input["old_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("old_string is required"),
        };
        let new_string = match input["new_string"].as_str() {
            Some(s) => s,
            None => return ToolResult::error("new_string is required"),
        };
        let replace_all = input["replace_all"].as_bool().unwrap_or(false);

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if !ctx.was_read(&full_path).await {
            return ToolResult::error(format!("Read {} before editing it", path));
        }

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to read {}: {}", path, e)),
        };

        let occurrences = content.matches(old_string).count();
        if occurrences == 0 {
            return ToolResult::error(format!("old_string not found in {}", path));
        }
        if occurrences > 1 && !replace_all {
            return ToolResult::error(format!(
                "old_string occurs {} times in {}; pass replace_all or make it unique",
                occurrences, path
            ));
        }

        let updated = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        if let Err(e) = tokio::fs::write(&full_path, &updated).await {
            return ToolResult::error(format!("Failed to write {}: {}", path, e));
        }

        let replaced = if replace_all { occurrences } else { 1 };
        ToolResult::success(format!("Replaced {} occurrence(s) in {}", replaced, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    async fn ctx_with_file(content: &str) -> (tempfile::TempDir, ToolContext) {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("code.rs"), content).unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");
        ctx.track_read(Path::new("code.rs")).await;
        (temp, ctx)
    }

    #[tokio::test]
    async fn test_edit_replaces_single_occurrence() {
        let (temp, ctx) = ctx_with_file("fn old() {}").await;

        let result = EditFileTool
            .execute(
                serde_json::json!({
                    "file_path": "code.rs",
                    "old_string": "old",
                    "new_string": "renamed"
                }),
                &ctx,
            )
            .await;

        assert!(!result.is_error);
        assert_eq!(
            fs::read_to_string(temp.path().join("code.rs")).unwrap(),
            "fn renamed() {}"
        );
    }

    #[tokio::test]
    async fn test_edit_requires_prior_read() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("code.rs"), "x").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = EditFileTool
            .execute(
                serde_json::json!({
                    "file_path": "code.rs",
                    "old_string": "x",
                    "new_string": "y"
                }),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("before editing"));
    }

    #[tokio::test]
    async fn test_ambiguous_match_needs_replace_all() {
        let (temp, ctx) = ctx_with_file("a a a").await;

        let result = EditFileTool
            .execute(
                serde_json::json!({
                    "file_path": "code.rs",
                    "old_string": "a",
                    "new_string": "b"
                }),
                &ctx,
            )
            .await;
        assert!(result.is_error);

        let result = EditFileTool
            .execute(
                serde_json::json!({
                    "file_path": "code.rs",
                    "old_string": "a",
                    "new_string": "b",
                    "replace_all": true
                }),
                &ctx,
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(fs::read_to_string(temp.path().join("code.rs")).unwrap(), "b b b");
    }

    #[tokio::test]
    async fn test_missing_old_string_reported() {
        let (_temp, ctx) = ctx_with_file("nothing here").await;

        let result = EditFileTool
            .execute(
                serde_json::json!({
                    "file_path": "code.rs",
                    "old_string": "absent",
                    "new_string": "x"
                }),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("not found"));
    }
}
