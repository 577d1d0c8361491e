//! The Drake: drives a single area's task file to completion.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{AgentOptions, EventSender};
use crate::cancel::CancelToken;
use crate::domain::{TaskRecord, TaskStatus, WorkerRecord, WorkerStatus};
use crate::governor::{Governor, WorkerPermit};
use crate::llm::LlmProvider;
use crate::prompt::PromptBroker;
use crate::store::{ProjectStore, StoreError};
use crate::tools::ToolContext;
use crate::worker::Kobold;

/// Observer hooks wired in when a transport session is attached to the
/// project: workers stream events and can reach the user via ask_user.
#[derive(Clone)]
pub struct SessionHooks {
    pub events: EventSender,
    pub prompts: PromptBroker,
}

/// Supervisor tuning, taken from runtime configuration and the project's
/// agent configuration snapshot.
#[derive(Clone)]
pub struct DrakeConfig {
    pub stuck_deadline: Duration,
    pub retry_limit: u32,
    pub planning_enabled: bool,
    pub prompt_timeout: Duration,
    pub agent_options: AgentOptions,
    pub allowed_paths: Vec<PathBuf>,
}

impl Default for DrakeConfig {
    fn default() -> Self {
        Self {
            stuck_deadline: Duration::from_secs(600),
            retry_limit: 2,
            planning_enabled: false,
            prompt_timeout: Duration::from_secs(300),
            agent_options: AgentOptions::default(),
            allowed_paths: Vec::new(),
        }
    }
}

/// What one tick did, for the driver and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct TickReport {
    pub assigned: usize,
    pub completed: usize,
    pub failed: usize,
    pub demoted_orphans: usize,
}

struct WorkerHandle {
    record: Arc<Mutex<WorkerRecord>>,
    permit: Option<WorkerPermit>,
    join: JoinHandle<()>,
    cancel: CancelToken,
}

/// Supervisor for one (project, area) pair. At most one exists per pair.
pub struct Drake {
    project_id: String,
    area: String,
    store: ProjectStore,
    provider: Arc<dyn LlmProvider>,
    governor: Governor,
    config: DrakeConfig,
    hooks: Option<SessionHooks>,
    workers: HashMap<String, WorkerHandle>,
    structure: Option<String>,
}

impl Drake {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: impl Into<String>,
        area: impl Into<String>,
        store: ProjectStore,
        provider: Arc<dyn LlmProvider>,
        governor: Governor,
        config: DrakeConfig,
        hooks: Option<SessionHooks>,
        structure: Option<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            area: area.into(),
            store,
            provider,
            governor,
            config,
            hooks,
            workers: HashMap::new(),
            structure,
        }
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    /// Number of workers this Drake currently owns.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// One supervisor tick.
    ///
    /// `dep_status` carries task statuses across all areas (cross-area
    /// dependencies are permitted); `blocks_assignment` reflects the
    /// project's execution-control state.
    pub async fn tick(
        &mut self,
        dep_status: &HashMap<String, TaskStatus>,
        blocks_assignment: bool,
    ) -> Result<TickReport, StoreError> {
        let mut report = TickReport::default();

        // 1. Reload the tracker from disk; it is the source of truth.
        let mut tracker = self.store.load_tracker(&self.project_id, &self.area).await?;

        // 2. Sync owned workers back into task status.
        self.sync_workers(&mut tracker, &mut report).await;

        // 2b. Restart recovery: claimed tasks whose worker this Drake does
        // not own are orphans from a previous process; demote them.
        self.demote_orphans(&mut tracker, &mut report);

        // 3-5. Select and assign eligible tasks under the governor cap.
        if !blocks_assignment {
            self.assign_eligible(&mut tracker, dep_status, &mut report).await;
        } else {
            debug!(project = %self.project_id, area = %self.area, "tick: assignment blocked by execution control");
        }

        // Persist before the tick returns; partial progress without
        // persistence is a bug.
        self.store.save_tracker(&self.project_id, &tracker).await?;

        Ok(report)
    }

    async fn sync_workers(&mut self, tracker: &mut crate::tracker::TrackerFile, report: &mut TickReport) {
        let mut finished: Vec<String> = Vec::new();

        for (task_id, handle) in self.workers.iter_mut() {
            let mut record = handle.record.lock().await.clone();

            // A worker whose tokio task died without reaching a terminal
            // status failed in infrastructure.
            if handle.join.is_finished() && record.status.is_active() {
                record.status = WorkerStatus::Failed;
                record.error = Some("worker terminated unexpectedly".to_string());
            }

            // Stuck detection: Working with no transition for too long.
            if record.status == WorkerStatus::Working {
                let age = Utc::now().signed_duration_since(record.updated_at);
                if age.to_std().unwrap_or_default() > self.config.stuck_deadline {
                    warn!(worker = %record.id, task = %task_id, "tick: worker stuck, cancelling");
                    handle.cancel.cancel();
                    record.status = WorkerStatus::Failed;
                    record.error = Some(format!("worker stuck for more than {:?}", self.config.stuck_deadline));
                }
            }

            let Some(task) = tracker.task_mut(task_id) else {
                continue;
            };

            match record.status {
                WorkerStatus::Working => {
                    if task.status != TaskStatus::Working {
                        task.set_status(TaskStatus::Working);
                    }
                }
                WorkerStatus::Done => {
                    task.error = None;
                    task.set_status(TaskStatus::Done);
                    report.completed += 1;
                    finished.push(task_id.clone());
                }
                WorkerStatus::Failed => {
                    let error = record.error.clone().unwrap_or_else(|| "unknown failure".to_string());
                    if task.retries < self.config.retry_limit {
                        info!(task = %task_id, retries = task.retries, "tick: returning failed task for retry");
                        task.release_for_retry(error);
                    } else {
                        warn!(task = %task_id, "tick: retry limit reached, task failed");
                        task.error = Some(error);
                        task.set_status(TaskStatus::Failed);
                        report.failed += 1;
                    }
                    finished.push(task_id.clone());
                }
                WorkerStatus::Unassigned | WorkerStatus::Assigned => {}
            }
        }

        for task_id in finished {
            if let Some(mut handle) = self.workers.remove(&task_id) {
                if let Some(permit) = handle.permit.take() {
                    self.governor.release(permit).await;
                }
                handle.join.abort();
            }
        }
    }

    fn demote_orphans(&self, tracker: &mut crate::tracker::TrackerFile, report: &mut TickReport) {
        for task in tracker.tasks.iter_mut() {
            if task.status.is_claimed() && !self.workers.contains_key(&task.id) {
                warn!(task = %task.id, "tick: demoting orphaned task to unassigned");
                task.worker = None;
                task.set_status(TaskStatus::Unassigned);
                report.demoted_orphans += 1;
            }
        }
    }

    async fn assign_eligible(
        &mut self,
        tracker: &mut crate::tracker::TrackerFile,
        dep_status: &HashMap<String, TaskStatus>,
        report: &mut TickReport,
    ) {
        let mut eligible: Vec<(crate::domain::Priority, u32, String)> = tracker
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Unassigned)
            .filter(|t| {
                t.deps.iter().all(|dep| {
                    dep_status
                        .get(dep)
                        .or_else(|| tracker.task(dep).map(|d| &d.status))
                        .map(|s| *s == TaskStatus::Done)
                        .unwrap_or(false)
                })
            })
            .map(|t| (t.priority, t.level, t.id.clone()))
            .collect();

        // Total order: priority descending, level ascending, id ascending.
        eligible.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        for (_, _, task_id) in eligible {
            let Some(permit) = self.governor.try_acquire(&self.project_id).await else {
                debug!(project = %self.project_id, area = %self.area, "tick: governor at capacity");
                break;
            };

            let Some(task) = tracker.task_mut(&task_id) else {
                self.governor.release(permit).await;
                continue;
            };

            self.spawn_worker(task, permit).await;
            report.assigned += 1;
        }
    }

    async fn spawn_worker(&mut self, task: &mut TaskRecord, permit: WorkerPermit) {
        let specialization = task.specialization.clone().unwrap_or_else(|| "general".to_string());
        let mut record = WorkerRecord::new(&self.project_id, &specialization);
        record.assign(&task.id);
        let worker_id = record.id.clone();

        task.assign(worker_id.clone());
        info!(
            project = %self.project_id,
            area = %self.area,
            task = %task.id,
            worker = %record.id,
            "tick: assigned task"
        );

        let worker_cancel = CancelToken::new();
        let mut kobold = Kobold::new(
            record,
            self.provider.clone(),
            self.store.clone(),
            self.config.agent_options.clone(),
            self.config.planning_enabled,
            self.structure.clone(),
        );
        let shared_record = kobold.record.clone();

        let workspace = self.store.workspace_path(&self.project_id);
        let mut ctx = ToolContext::new(workspace, worker_id)
            .with_cancel(worker_cancel.clone())
            .with_allowed_paths(self.config.allowed_paths.clone());
        if let Some(hooks) = &self.hooks {
            ctx = ctx
                .with_events(hooks.events.clone())
                .with_prompts(hooks.prompts.clone(), self.config.prompt_timeout);
        }

        let task_snapshot = task.clone();
        let join = tokio::spawn(async move {
            let _ = kobold.run(&task_snapshot, &ctx).await;
        });

        self.workers.insert(
            task.id.clone(),
            WorkerHandle {
                record: shared_record,
                permit: Some(permit),
                join,
                cancel: worker_cancel,
            },
        );
    }

    /// Cancel all owned workers (project cancel / process shutdown).
    pub async fn shutdown(&mut self) {
        for handle in self.workers.values() {
            handle.cancel.cancel();
        }
        for (_, mut handle) in self.workers.drain() {
            if let Some(permit) = handle.permit.take() {
                self.governor.release(permit).await;
            }
        }
    }
}
