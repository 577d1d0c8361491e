//! OpenAI-compatible Chat Completions adapter.
//!
//! Used for any provider in the catalogue declaring `type: openai`; the
//! endpoint may point at OpenAI itself or at a compatible gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;

use super::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmError, LlmProvider, Message, MessageContent, Role,
    StopReason, TokenUsage, ToolCall,
};

/// Client for OpenAI-compatible chat-completions endpoints.
pub struct OpenAiProvider {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl OpenAiProvider {
    /// Build from a resolved provider configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, LlmError> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            LlmError::InvalidResponse(format!("No API key configured for provider model {}", config.model))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(LlmError::Network)?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.endpoint.clone(),
            http,
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, request: &CompletionRequest) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(convert_messages(&request.messages));

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": request.max_tokens.min(self.max_tokens),
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect::<Vec<_>>());
            body["tool_choice"] = serde_json::json!("auto");
        }

        body
    }

    fn parse_response(&self, api_response: ApiResponse) -> CompletionResponse {
        let choice = api_response.choices.into_iter().next();

        let (content, tool_calls, stop_reason) = match choice {
            Some(c) => {
                let tool_calls = c
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| ToolCall {
                        id: tc.id,
                        name: tc.function.name,
                        input: serde_json::from_str(&tc.function.arguments).unwrap_or(serde_json::json!({})),
                    })
                    .collect();
                let stop_reason = match c.finish_reason.as_deref() {
                    Some("stop") => StopReason::EndTurn,
                    Some("tool_calls") => StopReason::ToolUse,
                    Some("length") => StopReason::MaxTokens,
                    _ => StopReason::EndTurn,
                };
                (c.message.content, tool_calls, stop_reason)
            }
            None => (None, vec![], StopReason::EndTurn),
        };

        CompletionResponse {
            content,
            tool_calls,
            stop_reason,
            usage: TokenUsage {
                input_tokens: api_response.usage.prompt_tokens,
                output_tokens: api_response.usage.completion_tokens,
            },
        }
    }
}

/// Convert internal messages to the OpenAI shape.
///
/// OpenAI requires one message per tool result, so an internal block message
/// holding several tool results fans out into several wire messages.
fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut result = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        match &msg.content {
            MessageContent::Text(text) => {
                result.push(serde_json::json!({
                    "role": role,
                    "content": text,
                }));
            }
            MessageContent::Blocks(blocks) => {
                let mut tool_calls = Vec::new();
                let mut tool_results = Vec::new();
                let mut text_content = String::new();

                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => text_content.push_str(text),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(serde_json::json!({
                                "id": id,
                                "type": "function",
                                "function": {
                                    "name": name,
                                    "arguments": input.to_string(),
                                }
                            }));
                        }
                        ContentBlock::ToolResult {
                            tool_use_id, content, ..
                        } => {
                            tool_results.push((tool_use_id.clone(), content.clone()));
                        }
                    }
                }

                if !tool_results.is_empty() {
                    for (tool_call_id, content) in tool_results {
                        result.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": tool_call_id,
                            "content": content,
                        }));
                    }
                    continue;
                }

                if !tool_calls.is_empty() {
                    let mut msg = serde_json::json!({
                        "role": "assistant",
                        "tool_calls": tool_calls,
                    });
                    if !text_content.is_empty() {
                        msg["content"] = serde_json::json!(text_content);
                    }
                    result.push(msg);
                    continue;
                }

                result.push(serde_json::json!({
                    "role": role,
                    "content": text_content,
                }));
            }
        }
    }

    result
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(&request);
        debug!(model = %self.model, messages = request.messages.len(), "OpenAiProvider::complete: sending");

        let response = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status().as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);

            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiError { status, message: text });
        }

        let api_response: ApiResponse = response.json().await?;
        Ok(self.parse_response(api_response))
    }
}

// OpenAI API response types

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
