//! Transport command handling, independent of the wire.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent::{event_channel, AgentEvent, AgentOptions};
use crate::cancel::CancelToken;
use crate::config::{Config, ProviderConfig};
use crate::council::{build_dragon, CouncilState};
use crate::llm::{LlmError, LlmProvider};
use crate::pipeline::AttachmentRegistry;
use crate::store::ProjectStore;
use crate::supervisor::SessionHooks;
use crate::tools::ToolContext;

use super::messages::{ClientCommand, ConnectConfig, ProviderDescriptor, ServerEvent};
use super::session::{SessionAgent, SessionEntry, SessionManager, StoredEvent};

/// Builds providers from catalogue entries; swapped out in tests.
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderConfig) -> Result<Arc<dyn LlmProvider>, LlmError> + Send + Sync>;

/// Shared command handler behind every transport connection.
#[derive(Clone)]
pub struct TransportCore {
    config: Config,
    store: ProjectStore,
    pub sessions: SessionManager,
    attachments: AttachmentRegistry,
    provider_factory: ProviderFactory,
    cancel: CancelToken,
}

impl TransportCore {
    pub fn new(
        config: Config,
        store: ProjectStore,
        attachments: AttachmentRegistry,
        cancel: CancelToken,
    ) -> Self {
        let sessions = SessionManager::new(config.session.clone());
        Self {
            config,
            store,
            sessions,
            attachments,
            provider_factory: Arc::new(|provider_config| crate::llm::create_provider(provider_config)),
            cancel,
        }
    }

    /// Replace the provider factory (tests use scripted providers).
    pub fn with_provider_factory(mut self, factory: ProviderFactory) -> Self {
        self.provider_factory = factory;
        self
    }

    /// Handle one client command, pushing events to `out`.
    ///
    /// Returns the session id the command touched, so the connection can
    /// mark it disconnected when the stream ends.
    pub async fn handle(&self, cmd: ClientCommand, out: mpsc::Sender<ServerEvent>) -> Option<String> {
        match cmd {
            ClientCommand::List => {
                let providers: Vec<ProviderDescriptor> = self
                    .config
                    .providers
                    .iter()
                    .map(|(name, p)| ProviderDescriptor {
                        name: name.clone(),
                        provider_type: p.provider_type.clone(),
                        model: p.model.clone(),
                    })
                    .collect();

                let _ = out
                    .send(ServerEvent::Success {
                        agent_id: None,
                        message: format!("{} providers configured", providers.len()),
                        data: serde_json::to_value(providers).ok(),
                    })
                    .await;
                None
            }

            ClientCommand::Connect { agent_id, config } => Some(self.connect(agent_id, config, out, false).await),

            ClientCommand::Reset { agent_id, config } => {
                let _ = out
                    .send(ServerEvent::Reset {
                        agent_id: agent_id.clone(),
                    })
                    .await;
                Some(self.connect(agent_id, config, out, true).await)
            }

            ClientCommand::Disconnect { agent_id } => {
                let session = self.sessions.session_for_agent(&agent_id).await;
                if let Some(entry) = &session {
                    entry.agents.lock().await.remove(&agent_id);
                    entry.prompts.reject_all().await;
                    self.sessions.unindex_agent(&agent_id).await;
                    info!(%agent_id, "transport: agent disconnected");
                }
                let _ = out
                    .send(ServerEvent::Disconnected {
                        agent_id: agent_id.clone(),
                    })
                    .await;
                session.map(|s| s.id)
            }

            ClientCommand::Send { agent_id, data } => {
                let Some(entry) = self.sessions.session_for_agent(&agent_id).await else {
                    let _ = out
                        .send(ServerEvent::Error {
                            agent_id: Some(agent_id),
                            message: "No such agent; connect first".to_string(),
                        })
                        .await;
                    return None;
                };

                let session_id = entry.id.clone();
                let core = self.clone();
                // Turns run in their own task so this connection can keep
                // receiving commands (prompt responses in particular).
                tokio::spawn(async move {
                    core.run_turn(entry, agent_id, data, out).await;
                });
                Some(session_id)
            }

            ClientCommand::PromptResponse {
                agent_id,
                prompt_id,
                data,
            } => {
                let Some(entry) = self.sessions.session_for_agent(&agent_id).await else {
                    let _ = out
                        .send(ServerEvent::Error {
                            agent_id: Some(agent_id),
                            message: "No such agent".to_string(),
                        })
                        .await;
                    return None;
                };

                let completed = entry.prompts.complete(&prompt_id, data).await;
                let event = if completed {
                    ServerEvent::Success {
                        agent_id: Some(agent_id),
                        message: format!("Prompt {} completed", prompt_id),
                        data: None,
                    }
                } else {
                    ServerEvent::Error {
                        agent_id: Some(agent_id),
                        message: format!("No pending prompt {}", prompt_id),
                    }
                };
                let _ = out.send(event).await;
                Some(entry.id.clone())
            }
        }
    }

    async fn connect(
        &self,
        agent_id: String,
        config: ConnectConfig,
        out: mpsc::Sender<ServerEvent>,
        rebuild: bool,
    ) -> String {
        let session_id = config.session_id.clone().unwrap_or_else(|| agent_id.clone());
        let entry = self.sessions.get_or_create(&session_id).await;

        // Reconnecting to a known session replays retained messages first.
        if !rebuild {
            for stored in entry.replay_events().await {
                let _ = out.send(stored.to_replay_event()).await;
            }
        }

        let provider_config = match self.resolve_provider_config(&config) {
            Ok(p) => p,
            Err(message) => {
                let _ = out
                    .send(ServerEvent::Error {
                        agent_id: Some(agent_id),
                        message,
                    })
                    .await;
                return session_id;
            }
        };

        let provider = match (self.provider_factory)(&provider_config) {
            Ok(p) => p,
            Err(e) => {
                let _ = out
                    .send(ServerEvent::Error {
                        agent_id: Some(agent_id),
                        message: format!("Provider setup failed: {}", e),
                    })
                    .await;
                return session_id;
            }
        };

        let options = AgentOptions {
            max_turn_iterations: self.config.limits.max_turn_iterations,
            max_tokens: self.config.limits.max_tokens,
            ..Default::default()
        };

        let state = CouncilState::new(self.store.clone());
        let agent = build_dragon(agent_id.clone(), state, provider, options);

        let workspace = config
            .working_directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.store.root().to_path_buf());

        // Forward agent events to this connection and the replay buffer.
        let (events_tx, events_rx) = event_channel();
        tokio::spawn(forward_events(
            events_rx,
            out.clone(),
            entry.clone(),
            agent_id.clone(),
        ));

        // Binding to a project routes that project's worker events and
        // prompts through this session.
        if let Some(project_ref) = &config.project {
            let state = CouncilState::new(self.store.clone());
            match state.resolve_project(project_ref).await {
                Ok(project) => {
                    self.attachments
                        .attach(
                            &project.id,
                            SessionHooks {
                                events: events_tx.clone(),
                                prompts: entry.prompts.clone(),
                            },
                        )
                        .await;
                    debug!(%agent_id, project_id = %project.id, "transport: attached session to project");
                }
                Err(e) => {
                    warn!(%agent_id, error = %e, "transport: project attach failed");
                }
            }
        }

        entry.agents.lock().await.insert(
            agent_id.clone(),
            SessionAgent {
                agent,
                workspace,
                events: events_tx,
                verbose: config.verbose.unwrap_or(false),
            },
        );
        self.sessions.index_agent(&agent_id, &session_id).await;

        let _ = out
            .send(ServerEvent::Success {
                agent_id: Some(agent_id.clone()),
                message: format!("Agent connected to session {}", session_id),
                data: None,
            })
            .await;
        info!(%agent_id, %session_id, "transport: agent connected");
        session_id
    }

    fn resolve_provider_config(&self, config: &ConnectConfig) -> Result<ProviderConfig, String> {
        let mut provider_config = self
            .config
            .provider(&config.provider)
            .cloned()
            .ok_or_else(|| format!("Unknown provider '{}'", config.provider))?;

        if let Some(model) = &config.model {
            provider_config.model = model.clone();
        }
        if let Some(api_key) = &config.api_key {
            provider_config.api_key = api_key.clone();
        }
        Ok(provider_config)
    }

    async fn run_turn(&self, entry: SessionEntry, agent_id: String, data: String, out: mpsc::Sender<ServerEvent>) {
        let _ = out
            .send(ServerEvent::Processing {
                agent_id: agent_id.clone(),
            })
            .await;

        let mut agents = entry.agents.lock().await;
        let Some(session_agent) = agents.get_mut(&agent_id) else {
            let _ = out
                .send(ServerEvent::Error {
                    agent_id: Some(agent_id),
                    message: "No such agent; connect first".to_string(),
                })
                .await;
            return;
        };

        let ctx = ToolContext::new(session_agent.workspace.clone(), agent_id.clone())
            .with_events(session_agent.events.clone())
            .with_prompts(
                entry.prompts.clone(),
                Duration::from_secs(self.config.limits.prompt_timeout_secs),
            )
            .with_cancel(self.cancel.clone());

        match session_agent.agent.run_turn(&data, &ctx).await {
            Ok(outcome) => {
                let _ = out
                    .send(ServerEvent::Completed {
                        agent_id,
                        data: outcome.final_text,
                    })
                    .await;
            }
            Err(e) => {
                let _ = out
                    .send(ServerEvent::Error {
                        agent_id: Some(agent_id),
                        message: format!("Turn failed: {}", e),
                    })
                    .await;
            }
        }
    }
}

/// Translate agent events to wire events, recording streams for replay.
async fn forward_events(
    mut rx: tokio::sync::mpsc::UnboundedReceiver<AgentEvent>,
    out: mpsc::Sender<ServerEvent>,
    entry: SessionEntry,
    agent_id: String,
) {
    while let Some(event) = rx.recv().await {
        let wire = match &event {
            AgentEvent::Prompt {
                prompt_id,
                question,
                context,
            } => ServerEvent::Prompt {
                agent_id: agent_id.clone(),
                prompt_id: prompt_id.clone(),
                question: question.clone(),
                context: context.clone(),
            },
            _ => {
                let data = match &event {
                    AgentEvent::ToolCall { tool, args } => format!("{} {}", tool, args),
                    AgentEvent::ToolResult { output, .. } => output.clone(),
                    AgentEvent::Assistant { text } | AgentEvent::Display { text } => text.clone(),
                    AgentEvent::Info(text) | AgentEvent::Warning(text) | AgentEvent::Error(text) => text.clone(),
                    AgentEvent::Prompt { .. } => unreachable!(),
                };

                entry
                    .record(StoredEvent {
                        agent_id: agent_id.clone(),
                        message_type: event.message_type().to_string(),
                        data: data.clone(),
                    })
                    .await;

                ServerEvent::Stream {
                    agent_id: agent_id.clone(),
                    message_type: event.message_type().to_string(),
                    data,
                    replay: false,
                }
            }
        };

        // The connection may be gone; replay still has the events.
        if out.send(wire).await.is_err() {
            debug!(%agent_id, "forward_events: connection closed, buffering only");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::mock::MockProvider;
    use crate::llm::CompletionResponse;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    fn scripted_factory(responses: Vec<Vec<CompletionResponse>>) -> ProviderFactory {
        let queue = Arc::new(StdMutex::new(responses));
        Arc::new(move |_config| {
            let mut queue = queue.lock().unwrap();
            let responses = if queue.is_empty() { vec![] } else { queue.remove(0) };
            Ok(Arc::new(MockProvider::new(responses)) as Arc<dyn LlmProvider>)
        })
    }

    async fn core_with(responses: Vec<Vec<CompletionResponse>>) -> (tempfile::TempDir, TransportCore) {
        let temp = tempdir().unwrap();
        let store = ProjectStore::open(temp.path()).await.unwrap();

        let mut config = Config::default();
        config.providers.insert("main".to_string(), ProviderConfig::default());

        let core = TransportCore::new(config, store, AttachmentRegistry::new(), CancelToken::new())
            .with_provider_factory(scripted_factory(responses));
        (temp, core)
    }

    async fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_list_reports_providers() {
        let (_temp, core) = core_with(vec![]).await;
        let (tx, mut rx) = mpsc::channel(16);

        core.handle(ClientCommand::List, tx).await;

        let events = drain(&mut rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::Success { data: Some(data), .. } => {
                assert_eq!(data.as_array().unwrap().len(), 1);
                assert_eq!(data[0]["name"], "main");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_send_complete() {
        let (_temp, core) = core_with(vec![vec![CompletionResponse::text("Hello from the Dragon")]]).await;
        let (tx, mut rx) = mpsc::channel(64);

        core.handle(
            ClientCommand::Connect {
                agent_id: "a1".to_string(),
                config: ConnectConfig {
                    provider: "main".to_string(),
                    ..Default::default()
                },
            },
            tx.clone(),
        )
        .await;

        core.handle(
            ClientCommand::Send {
                agent_id: "a1".to_string(),
                data: "hi".to_string(),
            },
            tx.clone(),
        )
        .await;

        // The turn runs in a spawned task.
        let completed = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(event) = rx.recv().await {
                    if let ServerEvent::Completed { data, .. } = event {
                        return data;
                    }
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(completed.as_deref(), Some("Hello from the Dragon"));
    }

    #[tokio::test]
    async fn test_send_without_connect_errors() {
        let (_temp, core) = core_with(vec![]).await;
        let (tx, mut rx) = mpsc::channel(16);

        core.handle(
            ClientCommand::Send {
                agent_id: "ghost".to_string(),
                data: "hi".to_string(),
            },
            tx,
        )
        .await;

        let events = drain(&mut rx).await;
        assert!(matches!(events[0], ServerEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_unknown_provider_errors() {
        let (_temp, core) = core_with(vec![]).await;
        let (tx, mut rx) = mpsc::channel(16);

        core.handle(
            ClientCommand::Connect {
                agent_id: "a1".to_string(),
                config: ConnectConfig {
                    provider: "nope".to_string(),
                    ..Default::default()
                },
            },
            tx,
        )
        .await;

        let events = drain(&mut rx).await;
        assert!(matches!(
            &events[0],
            ServerEvent::Error { message, .. } if message.contains("Unknown provider")
        ));
    }

    #[tokio::test]
    async fn test_disconnect_rejects_prompts() {
        let (_temp, core) = core_with(vec![vec![]]).await;
        let (tx, mut rx) = mpsc::channel(64);

        core.handle(
            ClientCommand::Connect {
                agent_id: "a1".to_string(),
                config: ConnectConfig {
                    provider: "main".to_string(),
                    ..Default::default()
                },
            },
            tx.clone(),
        )
        .await;

        let entry = core.sessions.session_for_agent("a1").await.unwrap();
        let (_prompt_id, _rx_slot) = entry.prompts.register().await;
        assert_eq!(entry.prompts.len().await, 1);

        core.handle(
            ClientCommand::Disconnect {
                agent_id: "a1".to_string(),
            },
            tx,
        )
        .await;

        assert!(entry.prompts.is_empty().await);
        assert!(core.sessions.session_for_agent("a1").await.is_none());

        let events = drain(&mut rx).await;
        assert!(events.iter().any(|e| matches!(e, ServerEvent::Disconnected { .. })));
    }

    #[tokio::test]
    async fn test_prompt_response_completes_rendezvous() {
        let (_temp, core) = core_with(vec![vec![]]).await;
        let (tx, mut rx) = mpsc::channel(64);

        core.handle(
            ClientCommand::Connect {
                agent_id: "a1".to_string(),
                config: ConnectConfig {
                    provider: "main".to_string(),
                    ..Default::default()
                },
            },
            tx.clone(),
        )
        .await;

        let entry = core.sessions.session_for_agent("a1").await.unwrap();
        let (prompt_id, rx_slot) = entry.prompts.register().await;

        core.handle(
            ClientCommand::PromptResponse {
                agent_id: "a1".to_string(),
                prompt_id: prompt_id.clone(),
                data: "blue".to_string(),
            },
            tx,
        )
        .await;

        let outcome = entry
            .prompts
            .wait(&prompt_id, rx_slot, Duration::from_secs(1))
            .await;
        assert_eq!(outcome, crate::prompt::PromptOutcome::Answered("blue".to_string()));

        let events = drain(&mut rx).await;
        assert!(events
            .iter()
            .any(|e| matches!(e, ServerEvent::Success { message, .. } if message.contains("completed"))));
    }

    #[tokio::test]
    async fn test_reconnect_replays_stream_events() {
        let (_temp, core) = core_with(vec![
            vec![CompletionResponse::text("first answer")],
            vec![],
        ])
        .await;
        let (tx, mut rx) = mpsc::channel(64);

        let config = ConnectConfig {
            provider: "main".to_string(),
            session_id: Some("s1".to_string()),
            ..Default::default()
        };

        core.handle(
            ClientCommand::Connect {
                agent_id: "a1".to_string(),
                config: config.clone(),
            },
            tx.clone(),
        )
        .await;
        core.handle(
            ClientCommand::Send {
                agent_id: "a1".to_string(),
                data: "hi".to_string(),
            },
            tx.clone(),
        )
        .await;

        // Wait for the turn to finish and the event forwarder to record it.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Some(ServerEvent::Completed { .. }) = rx.recv().await {
                    break;
                }
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Reconnect with the same session id on a fresh connection.
        let (tx2, mut rx2) = mpsc::channel(64);
        core.handle(
            ClientCommand::Connect {
                agent_id: "a2".to_string(),
                config: ConnectConfig {
                    session_id: Some("s1".to_string()),
                    ..config
                },
            },
            tx2,
        )
        .await;

        let events = drain(&mut rx2).await;
        let replayed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::Stream { replay: true, .. }))
            .collect();
        assert!(!replayed.is_empty(), "expected replayed stream events, got {:?}", events);
    }
}
