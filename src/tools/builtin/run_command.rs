//! run_command tool - shell execution inside the workspace.

use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::time::Duration;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

const DEFAULT_TIMEOUT_MS: u64 = 120_000;
const MAX_OUTPUT_CHARS: usize = 30_000;

/// Execute a shell command in the workspace.
pub struct RunCommandTool;

#[async_trait]
impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_command"
    }

    fn description(&self) -> &'static str {
        "Execute a shell command in the workspace. Use for builds, tests, git."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                },
                "timeout_ms": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 120000)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let command = match input["command"].as_str() {
            Some(c) => c,
            None => return ToolResult::error("command is required"),
        };
        let timeout_ms = input["timeout_ms"].as_u64().unwrap_or(DEFAULT_TIMEOUT_MS);

        debug!(agent = %ctx.agent_id, %command, "RunCommandTool: spawning");
        let mut child = match tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("Failed to spawn command: {}", e)),
        };

        let output = tokio::select! {
            result = child.wait_with_output() => match result {
                Ok(o) => o,
                Err(e) => return ToolResult::error(format!("Failed to execute command: {}", e)),
            },
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                return ToolResult::error(format!("Command timed out after {}ms", timeout_ms));
            }
            _ = ctx.cancel.cancelled() => {
                return ToolResult::error("Command cancelled");
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let combined = if stdout.is_empty() && !stderr.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{}\n\nSTDERR:\n{}", stdout, stderr)
        };

        let truncated = if combined.len() > MAX_OUTPUT_CHARS {
            format!(
                "{}...\n[truncated, {} chars total]",
                &combined[..MAX_OUTPUT_CHARS],
                combined.len()
            )
        } else {
            combined
        };

        if output.status.success() {
            ToolResult::success(truncated)
        } else {
            ToolResult::error(format!(
                "Exit code: {}\n{}",
                output.status.code().unwrap_or(-1),
                truncated
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_run_command_success() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = RunCommandTool
            .execute(serde_json::json!({"command": "echo hello"}), &ctx)
            .await;

        assert!(!result.is_error);
        assert_eq!(result.content.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_command_nonzero_exit_is_tool_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = RunCommandTool
            .execute(serde_json::json!({"command": "exit 3"}), &ctx)
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("Exit code: 3"));
    }

    #[tokio::test]
    async fn test_run_command_timeout() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = RunCommandTool
            .execute(
                serde_json::json!({"command": "sleep 5", "timeout_ms": 50}),
                &ctx,
            )
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_command_cancelled() {
        let temp = tempdir().unwrap();
        let cancel = CancelToken::new();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test").with_cancel(cancel.clone());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = RunCommandTool
            .execute(serde_json::json!({"command": "sleep 5"}), &ctx)
            .await;

        assert!(result.is_error);
        assert!(result.content.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_runs_in_workspace() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("marker.txt"), "x").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = RunCommandTool
            .execute(serde_json::json!({"command": "ls"}), &ctx)
            .await;
        assert!(result.content.contains("marker.txt"));
    }
}
