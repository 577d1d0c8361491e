//! ask_user tool - pause the worker until the human answers.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::agent::AgentEvent;
use crate::prompt::PromptOutcome;
use crate::tools::{Tool, ToolContext, ToolResult};

/// Sentinel returned when no answer arrives before the deadline. An
/// error-shaped string, not an exception: the model sees it and adapts.
pub const PROMPT_TIMEOUT_SENTINEL: &str = "[no response: prompt timed out]";

/// Ask the user a question mid-task and wait for the response.
pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &'static str {
        "ask_user"
    }

    fn description(&self) -> &'static str {
        "Ask the user a question and wait for their answer. Use sparingly, only when blocked."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask"
                },
                "context": {
                    "type": "string",
                    "description": "Optional context shown alongside the question"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let question = match input["question"].as_str() {
            Some(q) => q,
            None => return ToolResult::error("question is required"),
        };
        let context = input["context"].as_str().map(|s| s.to_string());

        if !ctx.interactive {
            return match &ctx.default_prompt_response {
                Some(response) => {
                    debug!(agent = %ctx.agent_id, "AskUserTool: non-interactive, using default response");
                    ToolResult::success(response.clone())
                }
                None => ToolResult::error("[no response: agent is non-interactive and has no default response]"),
            };
        }

        let broker = match &ctx.prompts {
            Some(b) => b.clone(),
            None => return ToolResult::error("[no response: no prompt channel attached]"),
        };

        let (prompt_id, rx) = broker.register().await;
        ctx.emit(AgentEvent::Prompt {
            prompt_id: prompt_id.clone(),
            question: question.to_string(),
            context,
        });

        debug!(agent = %ctx.agent_id, %prompt_id, "AskUserTool: waiting for response");
        match broker.wait(&prompt_id, rx, ctx.prompt_timeout).await {
            PromptOutcome::Answered(data) => ToolResult::success(data),
            PromptOutcome::TimedOut => ToolResult::error(PROMPT_TIMEOUT_SENTINEL),
        }
    }
}
