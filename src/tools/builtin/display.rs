//! display_text tool - push text to the user without ending the turn.

use async_trait::async_trait;
use serde_json::Value;

use crate::agent::AgentEvent;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Show text to the user mid-turn.
pub struct DisplayTextTool;

#[async_trait]
impl Tool for DisplayTextTool {
    fn name(&self) -> &'static str {
        "display_text"
    }

    fn description(&self) -> &'static str {
        "Display text to the user without waiting for a response."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Text to display"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let text = match input["text"].as_str() {
            Some(t) => t,
            None => return ToolResult::error("text is required"),
        };

        ctx.emit(AgentEvent::Display { text: text.to_string() });
        ToolResult::success("displayed")
    }
}
