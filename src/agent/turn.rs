//! The agent turn loop.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::llm::{
    complete_with_retry, CompletionRequest, CompletionResponse, ContentBlock, LlmError, LlmProvider, Message,
    RetryPolicy, StopReason, TokenUsage,
};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};

use super::events::AgentEvent;

/// Per-agent options.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// LLM round-trip cap per turn.
    pub max_turn_iterations: u32,

    /// Response token cap per call.
    pub max_tokens: u32,

    /// Adapter retry policy.
    pub retry: RetryPolicy,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            max_turn_iterations: 25,
            max_tokens: 16384,
            retry: RetryPolicy::default(),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Final assistant text, if the model produced any.
    pub final_text: Option<String>,

    /// LLM round-trips consumed.
    pub iterations: u32,

    /// True when the turn was cut off at the iteration cap.
    pub hit_cap: bool,

    /// Token usage accumulated over the turn.
    pub usage: TokenUsage,
}

/// A stateful conversational actor: one per active role instance.
pub struct Agent {
    pub id: String,
    system_prompt: String,
    provider: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    history: Vec<Message>,
    options: AgentOptions,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        system_prompt: impl Into<String>,
        provider: Arc<dyn LlmProvider>,
        tools: ToolRegistry,
        options: AgentOptions,
    ) -> Self {
        Self {
            id: id.into(),
            system_prompt: system_prompt.into(),
            provider,
            tools,
            history: Vec::new(),
            options,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Execute one turn with `user_text` as the fresh user message.
    ///
    /// Tool failures are captured as tool-result text so the model can react;
    /// only LLM infrastructure failures (after adapter retries) error out.
    pub async fn run_turn(&mut self, user_text: &str, ctx: &ToolContext) -> Result<TurnOutcome, LlmError> {
        debug!(agent = %self.id, "run_turn: starting");
        self.history.push(Message::user(user_text));

        let tool_defs = self.tools.definitions();
        let mut iterations = 0u32;
        let mut usage = TokenUsage::default();
        let mut final_text = None;

        loop {
            if iterations >= self.options.max_turn_iterations {
                warn!(agent = %self.id, cap = self.options.max_turn_iterations, "run_turn: iteration cap reached");
                self.history
                    .push(Message::assistant("[turn ended: iteration cap reached]"));
                ctx.emit(AgentEvent::Warning(format!(
                    "Turn ended after {} iterations (cap reached)",
                    iterations
                )));
                return Ok(TurnOutcome {
                    final_text,
                    iterations,
                    hit_cap: true,
                    usage,
                });
            }

            iterations += 1;

            let request = CompletionRequest {
                system_prompt: self.system_prompt.clone(),
                messages: self.history.clone(),
                tools: tool_defs.clone(),
                max_tokens: self.options.max_tokens,
            };

            let response = complete_with_retry(&self.provider, request, &self.options.retry, &ctx.cancel).await?;
            usage.add(response.usage);

            if let Some(text) = &response.content {
                ctx.emit(AgentEvent::Assistant { text: text.clone() });
                final_text = Some(text.clone());
            }

            self.history.push(build_assistant_message(&response));

            match response.stop_reason {
                StopReason::ToolUse if !response.tool_calls.is_empty() => {
                    let mut result_blocks = Vec::with_capacity(response.tool_calls.len());

                    for call in &response.tool_calls {
                        ctx.emit(AgentEvent::ToolCall {
                            tool: call.name.clone(),
                            args: call.input.to_string(),
                        });

                        let result = self.tools.execute(call, ctx).await;

                        ctx.emit(AgentEvent::ToolResult {
                            tool: call.name.clone(),
                            output: result.content.clone(),
                            is_error: result.is_error,
                        });

                        result_blocks.push(tool_result_block(&call.id, &result));
                    }

                    self.history.push(Message::user_blocks(result_blocks));
                }
                StopReason::MaxTokens => {
                    debug!(agent = %self.id, "run_turn: truncated response, asking to continue");
                    self.history.push(Message::user(
                        "Continue from where you left off. Your previous response was truncated.",
                    ));
                }
                _ => {
                    info!(agent = %self.id, iterations, "run_turn: complete");
                    return Ok(TurnOutcome {
                        final_text,
                        iterations,
                        hit_cap: false,
                        usage,
                    });
                }
            }
        }
    }
}

fn build_assistant_message(response: &CompletionResponse) -> Message {
    let mut blocks = Vec::new();

    if let Some(text) = &response.content {
        blocks.push(ContentBlock::text(text));
    }

    for call in &response.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });
    }

    if blocks.is_empty() {
        Message::assistant(String::new())
    } else {
        Message::assistant_blocks(blocks)
    }
}

fn tool_result_block(tool_use_id: &str, result: &ToolResult) -> ContentBlock {
    ContentBlock::tool_result(tool_use_id, &result.content, result.is_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::event_channel;
    use crate::llm::provider::mock::MockProvider;
    use std::time::Duration;
    use tempfile::tempdir;

    fn agent_with(responses: Vec<CompletionResponse>, tools: ToolRegistry) -> Agent {
        let options = AgentOptions {
            retry: RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            ..Default::default()
        };
        Agent::new("test-agent", "You are a test agent", Arc::new(MockProvider::new(responses)), tools, options)
    }

    #[tokio::test]
    async fn test_plain_text_turn() {
        let mut agent = agent_with(vec![CompletionResponse::text("hello there")], ToolRegistry::empty());
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let outcome = agent.run_turn("hi", &ctx).await.unwrap();

        assert_eq!(outcome.final_text.as_deref(), Some("hello there"));
        assert_eq!(outcome.iterations, 1);
        assert!(!outcome.hit_cap);
        // History: user + assistant.
        assert_eq!(agent.history().len(), 2);
    }

    #[tokio::test]
    async fn test_tool_call_then_completion() {
        let responses = vec![
            CompletionResponse::tool_use(
                "call_1",
                "write_file",
                serde_json::json!({"file_path": "main.txt", "content": "hi"}),
            ),
            CompletionResponse::text("File written."),
        ];
        let mut agent = agent_with(responses, ToolRegistry::worker());
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let outcome = agent.run_turn("write hi to main.txt", &ctx).await.unwrap();

        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.final_text.as_deref(), Some("File written."));
        assert_eq!(
            std::fs::read_to_string(temp.path().join("main.txt")).unwrap(),
            "hi"
        );
        // user, assistant(tool_use), user(tool_result), assistant.
        assert_eq!(agent.history().len(), 4);
    }

    #[tokio::test]
    async fn test_tool_failure_flows_into_conversation() {
        let responses = vec![
            CompletionResponse::tool_use("call_1", "read_file", serde_json::json!({"file_path": "missing.txt"})),
            CompletionResponse::text("Could not read it."),
        ];
        let mut agent = agent_with(responses, ToolRegistry::worker());
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let outcome = agent.run_turn("read missing.txt", &ctx).await.unwrap();
        assert_eq!(outcome.final_text.as_deref(), Some("Could not read it."));

        // The error is a tool_result block in history, flagged is_error.
        let tool_result_msg = &agent.history()[2];
        match &tool_result_msg.content {
            crate::llm::MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { is_error, .. } => assert!(is_error),
                other => panic!("expected tool result, got {:?}", other),
            },
            other => panic!("expected blocks, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_iteration_cap_appends_note() {
        // The model asks for a tool forever; cap at 3 iterations.
        let responses: Vec<CompletionResponse> = (0..5)
            .map(|i| {
                CompletionResponse::tool_use(
                    format!("call_{}", i),
                    "list_directory",
                    serde_json::json!({}),
                )
            })
            .collect();
        let mut agent = agent_with(responses, ToolRegistry::worker());
        agent.options.max_turn_iterations = 3;

        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let outcome = agent.run_turn("loop forever", &ctx).await.unwrap();
        assert!(outcome.hit_cap);
        assert_eq!(outcome.iterations, 3);

        let last = agent.history().last().unwrap();
        assert!(matches!(
            last.content.as_text(),
            Some(text) if text.contains("iteration cap reached")
        ));
    }

    #[tokio::test]
    async fn test_llm_failure_surfaces() {
        let provider = MockProvider::with_results(vec![Err(LlmError::InvalidResponse("broken".to_string()))]);
        let mut agent = Agent::new(
            "test-agent",
            "prompt",
            Arc::new(provider),
            ToolRegistry::empty(),
            AgentOptions::default(),
        );
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test");

        let result = agent.run_turn("hi", &ctx).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_events_emitted_in_order() {
        let responses = vec![
            CompletionResponse::tool_use(
                "call_1",
                "write_file",
                serde_json::json!({"file_path": "x.txt", "content": "x"}),
            ),
            CompletionResponse::text("done"),
        ];
        let mut agent = agent_with(responses, ToolRegistry::worker());
        let temp = tempdir().unwrap();
        let (tx, mut rx) = event_channel();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test").with_events(tx);

        agent.run_turn("go", &ctx).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.message_type());
        }
        assert_eq!(kinds, vec!["tool_call", "tool_result", "assistant"]);
    }
}
