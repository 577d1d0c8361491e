//! Periodic pipeline drivers.
//!
//! Two loops run for the lifetime of the process: the analyzer driver picks
//! up approved (New) projects and runs the Wyvern; the supervisor driver
//! ticks a Drake per area for every executing project. One project's failure
//! never blocks the others, and both loops observe the cancellation signal
//! between projects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::analyzer::Wyvern;
use crate::cancel::CancelToken;
use crate::config::LimitsConfig;
use crate::domain::{ProjectStatus, TaskStatus};
use crate::governor::Governor;
use crate::llm::LlmProvider;
use crate::store::ProjectStore;
use crate::supervisor::{sync_features, Drake, DrakeConfig, ProjectRollup, SessionHooks};

/// Per-project session attachments: when a transport session binds to a
/// project, its workers stream events and can reach the user.
#[derive(Clone, Default)]
pub struct AttachmentRegistry {
    inner: Arc<Mutex<HashMap<String, SessionHooks>>>,
}

impl AttachmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, project_id: &str, hooks: SessionHooks) {
        self.inner.lock().await.insert(project_id.to_string(), hooks);
    }

    pub async fn detach(&self, project_id: &str) {
        self.inner.lock().await.remove(project_id);
    }

    pub async fn get(&self, project_id: &str) -> Option<SessionHooks> {
        self.inner.lock().await.get(project_id).cloned()
    }
}

/// Driver that turns approved specifications into task graphs.
pub struct AnalyzerDriver {
    store: ProjectStore,
    provider: Arc<dyn LlmProvider>,
    limits: LimitsConfig,
    interval: Duration,
    cancel: CancelToken,
}

impl AnalyzerDriver {
    pub fn new(
        store: ProjectStore,
        provider: Arc<dyn LlmProvider>,
        limits: LimitsConfig,
        interval: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            store,
            provider,
            limits,
            interval,
            cancel,
        }
    }

    /// Run until cancelled.
    pub async fn run(self) {
        info!(interval = ?self.interval, "AnalyzerDriver: started");
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "AnalyzerDriver: tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.cancelled() => {
                    info!("AnalyzerDriver: stopped");
                    return;
                }
            }
        }
    }

    /// One pass over all New projects. Returns how many were analyzed.
    pub async fn tick(&self) -> eyre::Result<usize> {
        let pending = self.store.list_projects(Some(ProjectStatus::New)).await;
        let mut analyzed = 0;

        for project in pending {
            if self.cancel.is_cancelled() {
                break;
            }

            debug!(project_id = %project.id, "AnalyzerDriver: picking up project");
            if let Err(e) = self
                .store
                .transition_project(&project.id, ProjectStatus::AnalyzerAssigned)
                .await
            {
                warn!(project_id = %project.id, error = %e, "AnalyzerDriver: could not claim project");
                continue;
            }

            let wyvern = Wyvern::new(self.store.clone(), self.provider.clone(), &self.limits);
            match wyvern.analyze(&project.id, &self.cancel).await {
                Ok(_) => {
                    self.store
                        .transition_project(&project.id, ProjectStatus::Analyzed)
                        .await?;
                    info!(project_id = %project.id, "AnalyzerDriver: project analyzed");
                    analyzed += 1;
                }
                Err(e) => {
                    // This project fails; the loop moves on to the next one.
                    warn!(project_id = %project.id, error = %e, "AnalyzerDriver: analysis failed");
                    let detail = format!("{:#}", e);
                    self.store
                        .update_project(&project.id, |p| p.fail("analysis failed", detail))
                        .await?;
                }
            }
        }

        Ok(analyzed)
    }
}

/// Driver that ticks a Drake per (project, area).
pub struct SupervisorDriver {
    store: ProjectStore,
    provider: Arc<dyn LlmProvider>,
    governor: Governor,
    limits: LimitsConfig,
    attachments: AttachmentRegistry,
    interval: Duration,
    cancel: CancelToken,
    drakes: HashMap<(String, String), Drake>,
    rr_offset: usize,
}

impl SupervisorDriver {
    pub fn new(
        store: ProjectStore,
        provider: Arc<dyn LlmProvider>,
        governor: Governor,
        limits: LimitsConfig,
        attachments: AttachmentRegistry,
        interval: Duration,
        cancel: CancelToken,
    ) -> Self {
        Self {
            store,
            provider,
            governor,
            limits,
            attachments,
            interval,
            cancel,
            drakes: HashMap::new(),
            rr_offset: 0,
        }
    }

    /// Run until cancelled.
    pub async fn run(mut self) {
        info!(interval = ?self.interval, "SupervisorDriver: started");
        loop {
            if let Err(e) = self.tick().await {
                error!(error = %e, "SupervisorDriver: tick failed");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.cancel.cancelled() => {
                    for drake in self.drakes.values_mut() {
                        drake.shutdown().await;
                    }
                    info!("SupervisorDriver: stopped");
                    return;
                }
            }
        }
    }

    /// One pass over all executing projects, in round-robin order.
    pub async fn tick(&mut self) -> eyre::Result<()> {
        let mut projects = Vec::new();
        for status in [
            ProjectStatus::Analyzed,
            ProjectStatus::InProgress,
            ProjectStatus::Paused,
            ProjectStatus::Suspended,
        ] {
            projects.extend(self.store.list_projects(Some(status)).await);
        }
        projects.sort_by(|a, b| a.id.cmp(&b.id));

        // Round-robin: rotate the visit order so no project monopolises the
        // worker-creation budget.
        if !projects.is_empty() {
            let offset = self.rr_offset % projects.len();
            projects.rotate_left(offset);
            self.rr_offset = self.rr_offset.wrapping_add(1);
        }

        for project in &projects {
            if self.cancel.is_cancelled() {
                break;
            }
            if let Err(e) = self.tick_project(project.id.clone()).await {
                // One failing project never blocks the driver.
                error!(project_id = %project.id, error = %e, "SupervisorDriver: project tick failed");
            }
        }

        self.reap_terminal_drakes().await;
        Ok(())
    }

    async fn tick_project(&mut self, project_id: String) -> eyre::Result<()> {
        let project = self.store.get_project(&project_id).await?;

        if let Some(limit) = project.agent_config.parallel_workers {
            self.governor.set_limit(&project_id, limit).await;
        }

        let areas = self.store.list_areas(&project_id).await?;
        if areas.is_empty() {
            return Ok(());
        }

        // Cross-area dependency snapshot.
        let mut dep_status: HashMap<String, TaskStatus> = HashMap::new();
        for area in &areas {
            let tracker = self.store.load_tracker(&project_id, area).await?;
            for task in &tracker.tasks {
                dep_status.insert(task.id.clone(), task.status);
            }
        }

        let structure = self
            .store
            .load_analysis(&project_id)
            .await?
            .and_then(|a| a.structure);
        let hooks = self.attachments.get(&project_id).await;

        let mut assigned_any = false;
        for area in &areas {
            let key = (project_id.clone(), area.clone());
            if !self.drakes.contains_key(&key) {
                let config = DrakeConfig {
                    stuck_deadline: Duration::from_secs(self.limits.stuck_deadline_secs),
                    retry_limit: self.limits.worker_retry_limit,
                    planning_enabled: project.agent_config.planning_enabled,
                    prompt_timeout: Duration::from_secs(self.limits.prompt_timeout_secs),
                    agent_options: crate::agent::AgentOptions {
                        max_turn_iterations: self.limits.max_turn_iterations,
                        max_tokens: self.limits.max_tokens,
                        ..Default::default()
                    },
                    allowed_paths: project.allowed_paths.clone(),
                };
                self.drakes.insert(
                    key.clone(),
                    Drake::new(
                        project_id.clone(),
                        area.clone(),
                        self.store.clone(),
                        self.provider.clone(),
                        self.governor.clone(),
                        config,
                        hooks.clone(),
                        structure.clone(),
                    ),
                );
            }

            let drake = self.drakes.get_mut(&key).expect("just inserted");
            let report = drake.tick(&dep_status, project.status.blocks_assignment()).await?;
            assigned_any = assigned_any || report.assigned > 0;
        }

        // First assignment moves the project into execution.
        if assigned_any && project.status == ProjectStatus::Analyzed {
            self.store
                .transition_project(&project_id, ProjectStatus::InProgress)
                .await?;
        }

        // Roll features up and close out the project when everything landed.
        match sync_features(&self.store, &project_id).await? {
            ProjectRollup::Completed => {
                let current = self.store.get_project(&project_id).await?;
                if current.status == ProjectStatus::InProgress {
                    info!(project_id = %project_id, "SupervisorDriver: project completed");
                    self.store
                        .transition_project(&project_id, ProjectStatus::Completed)
                        .await?;
                }
            }
            ProjectRollup::AllFailed => {
                let current = self.store.get_project(&project_id).await?;
                if current.status == ProjectStatus::InProgress {
                    warn!(project_id = %project_id, "SupervisorDriver: every task failed");
                    self.store
                        .update_project(&project_id, |p| {
                            p.fail("all tasks failed", "every task in every area reached Failed")
                        })
                        .await?;
                }
            }
            ProjectRollup::InFlight => {}
        }

        Ok(())
    }

    /// Drop Drakes whose projects left the executing states; their workers
    /// are signalled to abort.
    async fn reap_terminal_drakes(&mut self) {
        let mut stale = Vec::new();
        for (key, _) in self.drakes.iter() {
            let executing = match self.store.get_project(&key.0).await {
                Ok(p) => {
                    p.status.is_executing()
                        || matches!(p.status, ProjectStatus::Paused | ProjectStatus::Suspended)
                }
                Err(_) => false,
            };
            if !executing {
                stale.push(key.clone());
            }
        }

        for key in stale {
            if let Some(mut drake) = self.drakes.remove(&key) {
                debug!(project_id = %key.0, area = %key.1, "SupervisorDriver: reaping drake");
                drake.shutdown().await;
            }
        }
    }
}
