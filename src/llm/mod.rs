//! LLM adapter layer.
//!
//! The orchestration core talks to language models through the single
//! [`LlmProvider`] capability; concrete adapters cover the Anthropic Messages
//! API and OpenAI-compatible chat-completions endpoints.

use std::sync::Arc;

mod anthropic;
mod error;
mod openai;
pub mod provider;
mod types;

pub use anthropic::AnthropicProvider;
pub use error::LlmError;
pub use openai::OpenAiProvider;
pub use provider::{complete_with_retry, LlmProvider, RetryPolicy};
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, TokenUsage,
    ToolCall, ToolDefinition,
};

use crate::config::ProviderConfig;

/// Build a provider from a catalogue entry.
///
/// Supports `anthropic` and `openai` provider types.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider_type.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::from_config(config)?)),
        "openai" => Ok(Arc::new(OpenAiProvider::from_config(config)?)),
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown provider type: '{}'. Supported: anthropic, openai",
            other
        ))),
    }
}
