//! Tool trait definition.

use async_trait::async_trait;
use serde_json::Value;

use super::context::ToolContext;

/// A tool callable by the model.
///
/// Tools expose a unique name, a description, and a declarative JSON-schema
/// argument contract. Execution failures are reported through
/// [`ToolResult::error`], never as Rust errors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the tool_use name on the wire).
    fn name(&self) -> &'static str;

    /// Human-readable description for the model.
    fn description(&self) -> &'static str;

    /// JSON Schema for the input arguments.
    fn input_schema(&self) -> Value;

    /// Execute with the given arguments in the context's workspace.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Result of one tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_constructors() {
        let ok = ToolResult::success("wrote file");
        assert!(!ok.is_error);
        assert_eq!(ok.content, "wrote file");

        let err = ToolResult::error("file not found");
        assert!(err.is_error);
    }
}
