//! Session registry: per-session agents, prompt brokers, replay buffers.
//!
//! A session is keyed by a client-supplied identifier, retains a bounded
//! window of recent stream events for replay, and survives disconnects for a
//! configurable linger before garbage collection.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::agent::{Agent, EventSender};
use crate::config::SessionConfig;
use crate::prompt::PromptBroker;

use super::messages::ServerEvent;

/// An agent bound into a session, with its turn context.
pub struct SessionAgent {
    pub agent: Agent,
    pub workspace: PathBuf,
    pub events: EventSender,
    pub verbose: bool,
}

/// A stored stream event, replayed on reconnect.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub agent_id: String,
    pub message_type: String,
    pub data: String,
}

impl StoredEvent {
    pub fn to_replay_event(&self) -> ServerEvent {
        ServerEvent::Stream {
            agent_id: self.agent_id.clone(),
            message_type: self.message_type.clone(),
            data: self.data.clone(),
            replay: true,
        }
    }
}

/// Clonable handle to one session's state.
///
/// The pieces are individually locked so a long-running turn (holding the
/// agents lock) never blocks prompt completion or replay.
#[derive(Clone)]
pub struct SessionEntry {
    pub id: String,
    pub agents: Arc<Mutex<HashMap<String, SessionAgent>>>,
    pub prompts: PromptBroker,
    replay: Arc<Mutex<VecDeque<StoredEvent>>>,
    last_seen: Arc<Mutex<Instant>>,
    connected: Arc<AtomicBool>,
    retained: usize,
}

impl SessionEntry {
    fn new(id: String, retained: usize) -> Self {
        Self {
            id,
            agents: Arc::new(Mutex::new(HashMap::new())),
            prompts: PromptBroker::new(),
            replay: Arc::new(Mutex::new(VecDeque::new())),
            last_seen: Arc::new(Mutex::new(Instant::now())),
            connected: Arc::new(AtomicBool::new(true)),
            retained,
        }
    }

    /// Record a stream event for replay, dropping the oldest past the cap.
    pub async fn record(&self, event: StoredEvent) {
        let mut replay = self.replay.lock().await;
        if replay.len() >= self.retained {
            replay.pop_front();
        }
        replay.push_back(event);
    }

    /// Retained events, oldest first.
    pub async fn replay_events(&self) -> Vec<StoredEvent> {
        self.replay.lock().await.iter().cloned().collect()
    }

    pub async fn touch(&self) {
        *self.last_seen.lock().await = Instant::now();
        self.connected.store(true, Ordering::SeqCst);
    }

    pub async fn mark_disconnected(&self) {
        *self.last_seen.lock().await = Instant::now();
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn expired(&self, linger: Duration) -> bool {
        !self.is_connected() && self.last_seen.lock().await.elapsed() > linger
    }
}

/// Process-wide session registry.
#[derive(Clone)]
pub struct SessionManager {
    config: SessionConfig,
    sessions: Arc<Mutex<HashMap<String, SessionEntry>>>,

    /// agent id -> session id, so commands that carry only an agent id
    /// resolve their session without a scan.
    agent_index: Arc<Mutex<HashMap<String, String>>>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            agent_index: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Fetch or create the session, marking it connected.
    pub async fn get_or_create(&self, session_id: &str) -> SessionEntry {
        let mut sessions = self.sessions.lock().await;
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "SessionManager: creating session");
                SessionEntry::new(session_id.to_string(), self.config.retained_messages)
            })
            .clone();
        drop(sessions);
        entry.touch().await;
        entry
    }

    pub async fn get(&self, session_id: &str) -> Option<SessionEntry> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Bind an agent id to a session.
    pub async fn index_agent(&self, agent_id: &str, session_id: &str) {
        self.agent_index
            .lock()
            .await
            .insert(agent_id.to_string(), session_id.to_string());
    }

    pub async fn unindex_agent(&self, agent_id: &str) {
        self.agent_index.lock().await.remove(agent_id);
    }

    /// Resolve the session owning an agent.
    pub async fn session_for_agent(&self, agent_id: &str) -> Option<SessionEntry> {
        let session_id = self.agent_index.lock().await.get(agent_id).cloned()?;
        self.get(&session_id).await
    }

    /// Drop sessions disconnected longer than the linger window. Pending
    /// prompts of dropped sessions are rejected.
    pub async fn gc_sweep(&self) -> usize {
        let linger = Duration::from_secs(self.config.linger_secs);

        let mut expired = Vec::new();
        {
            let sessions = self.sessions.lock().await;
            for (id, entry) in sessions.iter() {
                if entry.expired(linger).await {
                    expired.push(id.clone());
                }
            }
        }

        let mut removed = 0;
        for id in expired {
            let entry = self.sessions.lock().await.remove(&id);
            if let Some(entry) = entry {
                entry.prompts.reject_all().await;
                let agent_ids: Vec<String> = entry.agents.lock().await.keys().cloned().collect();
                let mut index = self.agent_index.lock().await;
                for agent_id in agent_ids {
                    index.remove(&agent_id);
                }
                info!(session_id = %id, "SessionManager: garbage-collected session");
                removed += 1;
            }
        }
        removed
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(linger_secs: u64, retained: usize) -> SessionManager {
        SessionManager::new(SessionConfig {
            retained_messages: retained,
            linger_secs,
            socket_path: std::path::PathBuf::from("/tmp/test.sock"),
        })
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_session() {
        let manager = manager(600, 100);
        let a = manager.get_or_create("s1").await;
        let b = manager.get_or_create("s1").await;
        assert_eq!(a.id, b.id);
        assert_eq!(manager.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_replay_buffer_caps_at_retained() {
        let manager = manager(600, 3);
        let session = manager.get_or_create("s1").await;

        for i in 0..5 {
            session
                .record(StoredEvent {
                    agent_id: "a1".to_string(),
                    message_type: "assistant".to_string(),
                    data: format!("msg {}", i),
                })
                .await;
        }

        let events = session.replay_events().await;
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].data, "msg 2");
        assert_eq!(events[2].data, "msg 4");
        assert!(matches!(
            events[0].to_replay_event(),
            ServerEvent::Stream { replay: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_gc_removes_lingering_disconnected_sessions() {
        let manager = manager(0, 100);
        let session = manager.get_or_create("s1").await;
        let (_prompt_id, _rx) = session.prompts.register().await;

        // Connected sessions survive.
        assert_eq!(manager.gc_sweep().await, 0);

        session.mark_disconnected().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(manager.gc_sweep().await, 1);
        assert_eq!(manager.session_count().await, 0);
        assert!(session.prompts.is_empty().await);
    }

    #[tokio::test]
    async fn test_agent_index_resolution() {
        let manager = manager(600, 100);
        manager.get_or_create("s1").await;
        manager.index_agent("agent-1", "s1").await;

        let session = manager.session_for_agent("agent-1").await.unwrap();
        assert_eq!(session.id, "s1");

        manager.unindex_agent("agent-1").await;
        assert!(manager.session_for_agent("agent-1").await.is_none());
    }
}
