//! Streaming events emitted during an agent turn.
//!
//! Observers (the transport session, tests) receive one event per tool call,
//! tool result, and assistant message so progress is visible while a turn is
//! still running.

use tokio::sync::mpsc;

/// One observable step inside an agent turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The model requested a tool invocation.
    ToolCall { tool: String, args: String },

    /// A tool finished (errors included; they are data, not faults).
    ToolResult {
        tool: String,
        output: String,
        is_error: bool,
    },

    /// Assistant text content.
    Assistant { text: String },

    /// Text the agent explicitly asked to show the user.
    Display { text: String },

    /// A worker is waiting on the user; carries the rendezvous id.
    Prompt {
        prompt_id: String,
        question: String,
        context: Option<String>,
    },

    Info(String),
    Warning(String),
    Error(String),
}

impl AgentEvent {
    /// Wire discriminator for transport stream messages.
    pub fn message_type(&self) -> &'static str {
        match self {
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::Assistant { .. } => "assistant",
            AgentEvent::Display { .. } => "display",
            AgentEvent::Prompt { .. } => "prompt",
            AgentEvent::Info(_) => "info",
            AgentEvent::Warning(_) => "warning",
            AgentEvent::Error(_) => "error",
        }
    }
}

/// Sender half for agent events. Emission never blocks the turn.
pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

/// Create an event channel pair.
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<AgentEvent>) {
    mpsc::unbounded_channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_types() {
        assert_eq!(
            AgentEvent::ToolCall {
                tool: "read_file".to_string(),
                args: "{}".to_string()
            }
            .message_type(),
            "tool_call"
        );
        assert_eq!(AgentEvent::Info("x".to_string()).message_type(), "info");
        assert_eq!(
            AgentEvent::Prompt {
                prompt_id: "prompt_1".to_string(),
                question: "color?".to_string(),
                context: None
            }
            .message_type(),
            "prompt"
        );
    }
}
