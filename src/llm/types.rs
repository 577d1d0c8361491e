//! Provider-agnostic conversation and completion types.
//!
//! The shapes follow the Anthropic Messages API closely (system prompt carried
//! on the request, tool results as user-role blocks) but are neutral enough
//! for any chat-completion provider with tool calling.

use serde::{Deserialize, Serialize};

/// Everything needed for one LLM round-trip.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt for the agent role.
    pub system_prompt: String,

    /// Conversation so far (user/assistant alternation).
    pub messages: Vec<Message>,

    /// Tool catalogue offered to the model for this call.
    pub tools: Vec<ToolDefinition>,

    /// Response token cap.
    pub max_tokens: u32,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// Create a user message with plain text content.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Create an assistant message with plain text content.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Create a user message from content blocks (tool results).
    pub fn user_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Create an assistant message from content blocks (text + tool use).
    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message content: plain text or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Text content, if this is a plain-text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(_) => None,
        }
    }
}

/// A typed content block within a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    /// Create a text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Create a tool-result block referencing a tool-use id.
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

/// Response to a completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Assistant text, if any.
    pub content: Option<String>,

    /// Tool invocations requested by the model, in order.
    pub tool_calls: Vec<ToolCall>,

    /// Why the model stopped.
    pub stop_reason: StopReason,

    /// Token usage for accounting.
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// An end-of-turn text response (used by tests and synthetic replies).
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage::default(),
        }
    }

    /// A response consisting of a single tool call.
    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.into(),
                name: name.into(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
        }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    /// Parse from the Anthropic API stop_reason string.
    pub fn from_api(s: &str) -> Self {
        match s {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage for a single completion.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Accumulate usage from another completion.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// Tool definition advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert!(matches!(msg.content, MessageContent::Text(ref s) if s == "hello"));

        let msg = Message::assistant("hi");
        assert_eq!(msg.role, Role::Assistant);
    }

    #[test]
    fn test_tool_result_references_tool_use() {
        let block = ContentBlock::tool_result("toolu_1", "ok", false);
        match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                assert_eq!(tool_use_id, "toolu_1");
                assert_eq!(content, "ok");
                assert!(!is_error);
            }
            _ => panic!("expected ToolResult block"),
        }
    }

    #[test]
    fn test_content_block_serde_tagging() {
        let block = ContentBlock::ToolUse {
            id: "toolu_1".to_string(),
            name: "write_file".to_string(),
            input: serde_json::json!({"file_path": "main.txt"}),
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["name"], "write_file");
    }

    #[test]
    fn test_stop_reason_from_api() {
        assert_eq!(StopReason::from_api("end_turn"), StopReason::EndTurn);
        assert_eq!(StopReason::from_api("tool_use"), StopReason::ToolUse);
        assert_eq!(StopReason::from_api("max_tokens"), StopReason::MaxTokens);
        assert_eq!(StopReason::from_api("anything-else"), StopReason::EndTurn);
    }

    #[test]
    fn test_token_usage_add() {
        let mut usage = TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        };
        usage.add(TokenUsage {
            input_tokens: 3,
            output_tokens: 2,
        });
        assert_eq!(usage.input_tokens, 13);
        assert_eq!(usage.output_tokens, 7);
    }
}
