//! Anthropic Messages API adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;

use super::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmError, LlmProvider, Message, MessageContent, StopReason,
    TokenUsage, ToolCall,
};

/// Client for the Anthropic Messages API.
pub struct AnthropicProvider {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    max_tokens: u32,
}

impl AnthropicProvider {
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
        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.max_tokens),
            "system": request.system_prompt,
            "messages": convert_messages(&request.messages),
        });

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.input_schema,
                    })
                })
                .collect::<Vec<_>>());
        }

        body
    }

    fn parse_response(&self, api_response: ApiResponse) -> CompletionResponse {
        let mut content = None;
        let mut tool_calls = Vec::new();

        for block in api_response.content {
            match block {
                ApiContentBlock::Text { text } => {
                    content = Some(text);
                }
                ApiContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, input });
                }
            }
        }

        CompletionResponse {
            content,
            tool_calls,
            stop_reason: StopReason::from_api(&api_response.stop_reason),
            usage: TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            },
        }
    }
}

fn convert_messages(messages: &[Message]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|msg| {
            let content = match &msg.content {
                MessageContent::Text(text) => serde_json::json!(text),
                MessageContent::Blocks(blocks) => {
                    serde_json::json!(blocks.iter().map(convert_content_block).collect::<Vec<_>>())
                }
            };

            serde_json::json!({
                "role": msg.role,
                "content": content,
            })
        })
        .collect()
}

fn convert_content_block(block: &ContentBlock) -> serde_json::Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({
            "type": "text",
            "text": text,
        }),
        ContentBlock::ToolUse { id, name, input } => serde_json::json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
            "is_error": is_error,
        }),
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_request_body(&request);
        debug!(model = %self.model, messages = request.messages.len(), "AnthropicProvider::complete: sending");

        let response = self
            .http
            .post(url)
            .header("x-api-key", self.api_key.clone())
            .header("anthropic-version", "2023-06-01")
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

// Anthropic API response types

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    stop_reason: String,
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ApiContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolDefinition;

    fn test_provider() -> AnthropicProvider {
        AnthropicProvider {
            model: "claude-sonnet-4-20250514".to_string(),
            api_key: "test-key".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            http: Client::new(),
            max_tokens: 8192,
        }
    }

    #[test]
    fn test_build_request_body_basic() {
        let provider = test_provider();
        let request = CompletionRequest {
            system_prompt: "You orchestrate tasks".to_string(),
            messages: vec![Message::user("Hello")],
            tools: vec![],
            max_tokens: 1000,
        };

        let body = provider.build_request_body(&request);

        assert_eq!(body["model"], "claude-sonnet-4-20250514");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["system"], "You orchestrate tasks");
        assert!(body["messages"].is_array());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_build_request_body_with_tools() {
        let provider = test_provider();
        let request = CompletionRequest {
            system_prompt: "Test".to_string(),
            messages: vec![Message::user("Write a file")],
            tools: vec![ToolDefinition::new(
                "write_file",
                "Write a file",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string" }
                    }
                }),
            )],
            max_tokens: 1000,
        };

        let body = provider.build_request_body(&request);

        assert!(body["tools"].is_array());
        assert_eq!(body["tools"][0]["name"], "write_file");
    }

    #[test]
    fn test_max_tokens_capped_by_provider() {
        let mut provider = test_provider();
        provider.max_tokens = 1000;

        let request = CompletionRequest {
            system_prompt: "Test".to_string(),
            messages: vec![],
            tools: vec![],
            max_tokens: 5000,
        };

        let body = provider.build_request_body(&request);
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn test_convert_tool_result_blocks() {
        let message = Message::user_blocks(vec![ContentBlock::tool_result("toolu_1", "done", false)]);
        let converted = convert_messages(&[message]);

        assert_eq!(converted[0]["role"], "user");
        assert_eq!(converted[0]["content"][0]["type"], "tool_result");
        assert_eq!(converted[0]["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn test_parse_response_with_tool_use() {
        let provider = test_provider();
        let api_response = ApiResponse {
            content: vec![
                ApiContentBlock::Text {
                    text: "Writing now".to_string(),
                },
                ApiContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "write_file".to_string(),
                    input: serde_json::json!({"file_path": "main.txt"}),
                },
            ],
            stop_reason: "tool_use".to_string(),
            usage: ApiUsage {
                input_tokens: 10,
                output_tokens: 20,
            },
        };

        let response = provider.parse_response(api_response);
        assert_eq!(response.content.as_deref(), Some("Writing now"));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "write_file");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.usage.output_tokens, 20);
    }
}
