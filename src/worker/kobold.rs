//! The Kobold: drives one task from Assigned to Done or Failed.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agent::{Agent, AgentOptions};
use crate::cancel::CancelToken;
use crate::domain::{TaskRecord, WorkerRecord, WorkerStatus};
use crate::llm::{complete_with_retry, CompletionRequest, LlmProvider, Message, RetryPolicy};
use crate::prompts;
use crate::store::ProjectStore;
use crate::tools::{ToolContext, ToolRegistry};

use super::plan::{parse_plan_steps, Plan};

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KoboldOutcome {
    Done,
    Failed { error: String },
    Cancelled,
}

/// A task-scoped worker agent.
pub struct Kobold {
    /// Shared record; the owning Drake reads it for status sync.
    pub record: Arc<Mutex<WorkerRecord>>,

    agent: Agent,
    provider: Arc<dyn LlmProvider>,
    store: ProjectStore,
    project_id: String,
    planning_enabled: bool,
    max_tokens: u32,
}

impl Kobold {
    pub fn new(
        record: WorkerRecord,
        provider: Arc<dyn LlmProvider>,
        store: ProjectStore,
        options: AgentOptions,
        planning_enabled: bool,
        structure: Option<String>,
    ) -> Self {
        let mut context = HashMap::new();
        context.insert("specialization".to_string(), record.specialization.clone());
        context.insert(
            "structure".to_string(),
            structure.unwrap_or_else(|| "(no conventions recorded)".to_string()),
        );
        let system_prompt = prompts::render(prompts::KOBOLD, &context);

        let max_tokens = options.max_tokens;
        let project_id = record.project_id.clone();
        let agent = Agent::new(
            record.id.clone(),
            system_prompt,
            provider.clone(),
            ToolRegistry::worker(),
            options,
        );

        Self {
            record: Arc::new(Mutex::new(record)),
            agent,
            provider,
            store,
            project_id,
            planning_enabled,
            max_tokens,
        }
    }

    /// Drive the assigned task to a terminal state.
    ///
    /// LLM and tool-infrastructure failures become `Failed` with the error
    /// text; tool-level failures stay inside the conversation.
    pub async fn run(&mut self, task: &TaskRecord, ctx: &ToolContext) -> KoboldOutcome {
        {
            let mut record = self.record.lock().await;
            record.set_status(WorkerStatus::Working);
        }
        info!(worker = %self.agent.id, task = %task.id, "Kobold: starting task");

        let task_brief = format!(
            "Task {}: {}\n\nDependencies already completed: {}",
            task.id,
            task.title,
            if task.deps.is_empty() {
                "none".to_string()
            } else {
                task.deps.join(", ")
            }
        );

        let plan = if self.planning_enabled {
            match self.load_or_create_plan(task, &task_brief, ctx).await {
                Some(plan) => Some(plan),
                None => {
                    warn!(worker = %self.agent.id, task = %task.id, "Kobold: planning failed, executing directly");
                    None
                }
            }
        } else {
            None
        };

        let outcome = match plan {
            Some(plan) => self.run_planned(task, plan, ctx).await,
            None => self.run_single(&task_brief, ctx).await,
        };

        let mut record = self.record.lock().await;
        match &outcome {
            KoboldOutcome::Done => {
                record.set_status(WorkerStatus::Done);
                info!(worker = %record.id, task = %task.id, "Kobold: task done");
            }
            KoboldOutcome::Failed { error } => {
                record.error = Some(error.clone());
                record.set_status(WorkerStatus::Failed);
                warn!(worker = %record.id, task = %task.id, error = %error, "Kobold: task failed");
            }
            KoboldOutcome::Cancelled => {
                record.error = Some("cancelled".to_string());
                record.set_status(WorkerStatus::Failed);
            }
        }

        outcome
    }

    /// Single-turn execution: one task brief, one turn.
    async fn run_single(&mut self, task_brief: &str, ctx: &ToolContext) -> KoboldOutcome {
        match self.agent.run_turn(task_brief, ctx).await {
            Ok(_) => KoboldOutcome::Done,
            Err(crate::llm::LlmError::Cancelled) => KoboldOutcome::Cancelled,
            Err(e) => KoboldOutcome::Failed { error: e.to_string() },
        }
    }

    /// Planned execution: resume from the first incomplete step, persisting
    /// each completion marker.
    async fn run_planned(&mut self, task: &TaskRecord, mut plan: Plan, ctx: &ToolContext) -> KoboldOutcome {
        while let Some(index) = plan.next_step() {
            if ctx.cancel.is_cancelled() {
                return KoboldOutcome::Cancelled;
            }

            let step = plan.steps[index].description.clone();
            debug!(worker = %self.agent.id, task = %task.id, step = index + 1, total = plan.steps.len(), "Kobold: executing step");

            let prompt = format!(
                "Task {}: {}\n\nStep {} of {}: {}",
                task.id,
                task.title,
                index + 1,
                plan.steps.len(),
                step
            );

            match self.agent.run_turn(&prompt, ctx).await {
                Ok(_) => {
                    plan.steps[index].completed = true;
                    if let Err(e) = self.store.save_plan(&self.project_id, &task.id, &plan).await {
                        warn!(task = %task.id, error = %e, "Kobold: failed to persist plan progress");
                    }
                }
                Err(crate::llm::LlmError::Cancelled) => return KoboldOutcome::Cancelled,
                Err(e) => return KoboldOutcome::Failed { error: e.to_string() },
            }
        }

        KoboldOutcome::Done
    }

    /// Load an existing plan (restart resume) or ask the planner for one.
    async fn load_or_create_plan(&self, task: &TaskRecord, task_brief: &str, ctx: &ToolContext) -> Option<Plan> {
        match self.store.load_plan::<Plan>(&self.project_id, &task.id).await {
            Ok(Some(existing)) if !existing.is_complete() => {
                info!(task = %task.id, "Kobold: resuming persisted plan");
                return Some(existing);
            }
            Ok(Some(_)) | Ok(None) => {}
            Err(e) => warn!(task = %task.id, error = %e, "Kobold: failed to load plan"),
        }

        let mut context = HashMap::new();
        context.insert("task".to_string(), task_brief.to_string());
        let request = CompletionRequest {
            system_prompt: "You break tasks into atomic steps. Output only JSON.".to_string(),
            messages: vec![Message::user(prompts::render(prompts::PLANNER, &context))],
            tools: vec![],
            max_tokens: self.max_tokens,
        };

        let response = complete_with_retry(&self.provider, request, &RetryPolicy::default(), &ctx.cancel)
            .await
            .ok()?;
        let steps = parse_plan_steps(response.content.as_deref()?)?;

        let plan = Plan::new(task.id.clone(), steps);
        if let Err(e) = self.store.save_plan(&self.project_id, &task.id, &plan).await {
            warn!(task = %task.id, error = %e, "Kobold: failed to persist new plan");
        }
        Some(plan)
    }
}
