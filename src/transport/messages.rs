//! Wire message types.
//!
//! The transport is a JSON-lines duplex channel: one JSON object per line,
//! tagged unions discriminated by `command` (client to server) and `type`
//! (server to client). Any stream-oriented bidirectional protocol can carry
//! these.

use serde::{Deserialize, Serialize};

/// Commands accepted from the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Enumerate configured provider descriptors.
    List,

    /// Create a per-session agent bound to a provider.
    Connect { agent_id: String, config: ConnectConfig },

    /// Dispose the agent; pending prompts are rejected.
    Disconnect { agent_id: String },

    /// Rebuild the agent preserving its identifier.
    Reset { agent_id: String, config: ConnectConfig },

    /// Run one agent turn with `data` as user input.
    Send { agent_id: String, data: String },

    /// Complete a pending prompt rendezvous.
    PromptResponse {
        agent_id: String,
        prompt_id: String,
        data: String,
    },
}

/// Agent configuration supplied on connect/reset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConnectConfig {
    /// Provider catalogue name.
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,

    /// Session this agent belongs to; defaults to the agent id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Project to attach worker streaming and prompts to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// One provider catalogue entry as reported to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    pub model: String,
}

/// Events pushed to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },

    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        message: String,
    },

    /// A turn started.
    Processing { agent_id: String },

    /// A turn finished; `data` carries the final assistant text.
    Completed {
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },

    /// Intermediate tool and assistant content.
    Stream {
        agent_id: String,
        message_type: String,
        data: String,
        #[serde(default)]
        replay: bool,
    },

    /// A worker is waiting on the user.
    Prompt {
        agent_id: String,
        prompt_id: String,
        question: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },

    Reset { agent_id: String },

    Disconnected { agent_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_command_wire_format() {
        let json = r#"{"command":"send","agent_id":"a1","data":"hello"}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd,
            ClientCommand::Send {
                agent_id: "a1".to_string(),
                data: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_prompt_response_wire_format() {
        let json = r#"{"command":"prompt_response","agent_id":"a1","prompt_id":"prompt_x","data":"blue"}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, ClientCommand::PromptResponse { ref data, .. } if data == "blue"));
    }

    #[test]
    fn test_connect_with_config() {
        let json = r#"{"command":"connect","agent_id":"a1","config":{"provider":"main","working_directory":"/tmp/ws"}}"#;
        let cmd: ClientCommand = serde_json::from_str(json).unwrap();
        match cmd {
            ClientCommand::Connect { agent_id, config } => {
                assert_eq!(agent_id, "a1");
                assert_eq!(config.provider, "main");
                assert_eq!(config.working_directory.as_deref(), Some("/tmp/ws"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::Stream {
            agent_id: "a1".to_string(),
            message_type: "tool_call".to_string(),
            data: "write_file".to_string(),
            replay: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"stream""#));
        assert!(json.contains(r#""message_type":"tool_call""#));

        let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_event_round_trips() {
        let events = vec![
            ServerEvent::Processing {
                agent_id: "a".to_string(),
            },
            ServerEvent::Completed {
                agent_id: "a".to_string(),
                data: Some("done".to_string()),
            },
            ServerEvent::Prompt {
                agent_id: "a".to_string(),
                prompt_id: "prompt_1".to_string(),
                question: "color?".to_string(),
                context: None,
            },
            ServerEvent::Disconnected {
                agent_id: "a".to_string(),
            },
        ];

        for event in events {
            let json = serde_json::to_string(&event).unwrap();
            let parsed: ServerEvent = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, event);
        }
    }
}
