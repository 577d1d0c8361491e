//! Concurrency governor: per-project active-worker caps.
//!
//! `active(project)` counts workers in Assigned or Working. A supervisor may
//! start a new worker iff `active(project) < limit(project)`. The
//! check-and-increment is atomic under one mutex over the counter map, so
//! concurrent supervisors of the same project cannot both take the last slot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

struct GovernorInner {
    /// Active worker count per project.
    active: HashMap<String, usize>,

    /// Per-project limit overrides.
    limits: HashMap<String, usize>,
}

/// Process-wide worker admission control.
#[derive(Clone)]
pub struct Governor {
    default_limit: usize,
    inner: Arc<Mutex<GovernorInner>>,
}

/// A held worker slot. Release it back with [`Governor::release`].
#[derive(Debug)]
pub struct WorkerPermit {
    pub project_id: String,
}

impl Governor {
    pub fn new(default_limit: usize) -> Self {
        Self {
            default_limit,
            inner: Arc::new(Mutex::new(GovernorInner {
                active: HashMap::new(),
                limits: HashMap::new(),
            })),
        }
    }

    /// Override the limit for one project (from its agent configuration).
    pub async fn set_limit(&self, project_id: &str, limit: usize) {
        let mut inner = self.inner.lock().await;
        inner.limits.insert(project_id.to_string(), limit);
    }

    /// The effective limit for a project.
    pub async fn limit(&self, project_id: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.limits.get(project_id).copied().unwrap_or(self.default_limit)
    }

    /// Current active count for a project.
    pub async fn active(&self, project_id: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.active.get(project_id).copied().unwrap_or(0)
    }

    /// Atomically check the limit and claim a slot.
    ///
    /// Returns None when the project is at its cap.
    pub async fn try_acquire(&self, project_id: &str) -> Option<WorkerPermit> {
        let mut inner = self.inner.lock().await;
        let limit = inner.limits.get(project_id).copied().unwrap_or(self.default_limit);
        let active = inner.active.entry(project_id.to_string()).or_insert(0);

        if *active >= limit {
            debug!(project_id, active = *active, limit, "Governor: at capacity");
            return None;
        }

        *active += 1;
        debug!(project_id, active = *active, limit, "Governor: slot acquired");
        Some(WorkerPermit {
            project_id: project_id.to_string(),
        })
    }

    /// Release a slot when a worker leaves the active set.
    pub async fn release(&self, permit: WorkerPermit) {
        let mut inner = self.inner.lock().await;
        if let Some(active) = inner.active.get_mut(&permit.project_id) {
            *active = active.saturating_sub(1);
            debug!(project_id = %permit.project_id, active = *active, "Governor: slot released");
        }
    }
}
