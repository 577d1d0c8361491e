//! ToolContext - execution context shared by all tools in one agent.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::agent::{AgentEvent, EventSender};
use crate::cancel::CancelToken;
use crate::prompt::PromptBroker;

use super::ToolError;

/// Execution context for tools, scoped to one agent.
///
/// File tools are sandboxed to the workspace plus the project's allowed
/// external paths; containment is decided after normalising and resolving
/// symlinks.
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace root. All relative paths resolve against it.
    pub workspace: PathBuf,

    /// Extra path prefixes tools may touch.
    pub allowed_paths: Vec<PathBuf>,

    /// Owning agent id, for event labels and logs.
    pub agent_id: String,

    /// Event sink; None when nobody observes (tests, council internals).
    events: Option<EventSender>,

    /// Prompt rendezvous for ask_user; None when detached from a session.
    pub prompts: Option<PromptBroker>,

    /// Deadline for interactive prompts.
    pub prompt_timeout: Duration,

    /// Whether a human is reachable. Non-interactive agents answer prompts
    /// with the default response instead of contacting the transport.
    pub interactive: bool,

    /// Canned answer for ask_user when non-interactive.
    pub default_prompt_response: Option<String>,

    /// Cancellation signal for long-running tools.
    pub cancel: CancelToken,

    /// Files read this turn; edit_file requires a prior read.
    read_files: Arc<Mutex<HashSet<PathBuf>>>,
}

impl ToolContext {
    pub fn new(workspace: PathBuf, agent_id: impl Into<String>) -> Self {
        Self {
            workspace,
            allowed_paths: Vec::new(),
            agent_id: agent_id.into(),
            events: None,
            prompts: None,
            prompt_timeout: Duration::from_secs(300),
            interactive: false,
            default_prompt_response: None,
            cancel: CancelToken::new(),
            read_files: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptBroker, timeout: Duration) -> Self {
        self.prompts = Some(prompts);
        self.prompt_timeout = timeout;
        self.interactive = true;
        self
    }

    pub fn with_allowed_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.allowed_paths = paths;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_default_prompt_response(mut self, response: Option<String>) -> Self {
        self.default_prompt_response = response;
        self
    }

    /// Emit an event to the observing session, if any.
    pub fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }

    /// Track that a file was read (enables edit validation).
    pub async fn track_read(&self, path: &Path) {
        let mut read_files = self.read_files.lock().await;
        read_files.insert(self.normalize_path(path));
    }

    /// Whether a file was read this turn.
    pub async fn was_read(&self, path: &Path) -> bool {
        let read_files = self.read_files.lock().await;
        read_files.contains(&self.normalize_path(path))
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Validate containment in the workspace or an allowed external path.
    ///
    /// Existing paths are canonicalized so symlinks cannot escape; for new
    /// files the deepest existing ancestor is canonicalized instead.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let normalized = self.normalize_path(path);

        let canonical = if normalized.exists() {
            normalized.canonicalize().unwrap_or_else(|_| normalized.clone())
        } else if let Some(parent) = normalized.parent() {
            if parent.exists() {
                let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
                canonical_parent.join(normalized.file_name().unwrap_or_default())
            } else {
                normalized.clone()
            }
        } else {
            normalized.clone()
        };

        let mut roots = Vec::with_capacity(1 + self.allowed_paths.len());
        roots.push(self.workspace.clone());
        roots.extend(self.allowed_paths.iter().cloned());

        for root in roots {
            let canonical_root = root.canonicalize().unwrap_or(root);
            if canonical.starts_with(&canonical_root) {
                return Ok(canonical);
            }
        }

        Err(ToolError::SandboxViolation {
            path: path.to_path_buf(),
        })
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("workspace", &self.workspace)
            .field("agent_id", &self.agent_id)
            .field("interactive", &self.interactive)
            .finish()
    }
}
