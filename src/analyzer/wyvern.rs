//! The Wyvern: consumes an approved specification, produces a partitioned,
//! dependency-ordered task graph, and persists it without discarding existing
//! task status.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::LimitsConfig;
use crate::domain::{Analysis, AnalysisError, FeatureStatus, SpecStatus, Specification};
use crate::llm::{complete_with_retry, CompletionRequest, LlmError, LlmProvider, Message, RetryPolicy};
use crate::prompts;
use crate::store::{ProjectStore, StoreError};
use crate::tracker::TrackerFile;

#[derive(Debug, Error)]
pub enum WyvernError {
    #[error("Specification is not approved")]
    SpecNotApproved,

    #[error("LLM failure: {0}")]
    Llm(#[from] LlmError),

    #[error("Unparseable analysis: {0}")]
    Parse(String),

    #[error("Invalid task graph: {0}")]
    Graph(#[from] AnalysisError),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

/// The analyzer agent.
pub struct Wyvern {
    store: ProjectStore,
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    max_tokens: u32,

    /// Run the second LLM pass inferring file-structure conventions.
    pub structure_pass: bool,
}

impl Wyvern {
    pub fn new(store: ProjectStore, provider: Arc<dyn LlmProvider>, limits: &LimitsConfig) -> Self {
        Self {
            store,
            provider,
            retry: RetryPolicy::default(),
            max_tokens: limits.max_tokens,
            structure_pass: false,
        }
    }

    /// Analyze one project end to end: prompt, parse, validate, link
    /// features, persist the analysis, and write/merge the per-area trackers.
    pub async fn analyze(&self, project_id: &str, cancel: &CancelToken) -> Result<Analysis, WyvernError> {
        let mut spec = self.store.load_specification(project_id).await?;
        if spec.status != SpecStatus::Approved {
            return Err(WyvernError::SpecNotApproved);
        }

        // Claim the New features before prompting so a concurrent re-run
        // does not double-consume them.
        let fresh: Vec<String> = spec.new_features().iter().map(|f| f.id.clone()).collect();
        for id in &fresh {
            if let Some(feature) = spec.feature_mut(id) {
                feature.set_status(FeatureStatus::AssignedToAnalyzer);
            }
        }
        self.store.save_specification(project_id, &spec).await?;
        debug!(project_id, features = fresh.len(), "Wyvern: features claimed");

        let prompt = self.build_prompt(&spec);
        let request = CompletionRequest {
            system_prompt: "You decompose software specifications into task graphs. Output only JSON.".to_string(),
            messages: vec![Message::user(prompt)],
            tools: vec![],
            max_tokens: self.max_tokens,
        };

        let response = complete_with_retry(&self.provider, request, &self.retry, cancel).await?;
        let text = response
            .content
            .ok_or_else(|| WyvernError::Parse("empty analyzer response".to_string()))?;

        let mut analysis = parse_analysis(&text)?;
        // Cycles, dangling dependencies and inconsistent levels are
        // rejected outright; only the task count is recomputed.
        analysis.validate()?;
        analysis.total_tasks = analysis.areas.iter().map(|a| a.tasks.len()).sum();
        info!(
            project_id,
            areas = analysis.areas.len(),
            tasks = analysis.total_tasks,
            "Wyvern: analysis parsed"
        );

        if self.structure_pass {
            match self.infer_structure(project_id, &spec, cancel).await {
                Ok(structure) => analysis.structure = Some(structure),
                // The structure pass is advisory; a failure does not fail
                // the analysis.
                Err(e) => warn!(project_id, error = %e, "Wyvern: structure pass failed"),
            }
        }

        link_features(&mut spec, &mut analysis);
        self.store.save_specification(project_id, &spec).await?;
        self.store.save_analysis(project_id, &analysis).await?;

        // Write or merge one tracker per area; existing task status and
        // assigned workers survive re-analysis.
        let mut area_names: Vec<String> = analysis.areas.iter().map(|a| a.name.clone()).collect();
        area_names.extend(self.store.list_areas(project_id).await?);
        area_names.sort();
        area_names.dedup();

        for area in &area_names {
            let mut tracker = match self.store.load_tracker(project_id, area).await {
                Ok(existing) => existing,
                Err(_) => TrackerFile::new(area.clone()),
            };
            tracker.merge_from_analysis(&analysis);
            self.store.save_tracker(project_id, &tracker).await?;
        }

        Ok(analysis)
    }

    fn build_prompt(&self, spec: &Specification) -> String {
        let features_block = spec
            .features
            .iter()
            .map(|f| format!("- {} ({}): {} [priority: {}]", f.name, f.id, f.description, f.priority))
            .collect::<Vec<_>>()
            .join("\n");

        let mut context = HashMap::new();
        context.insert("specification".to_string(), spec.body.clone());
        context.insert("features".to_string(), features_block);
        prompts::render(prompts::WYVERN, &context)
    }

    /// Second pass: infer file-structure conventions from the specification
    /// plus whatever already exists in the workspace.
    async fn infer_structure(
        &self,
        project_id: &str,
        spec: &Specification,
        cancel: &CancelToken,
    ) -> Result<String, WyvernError> {
        let workspace = self.store.workspace_path(project_id);
        let mut listing = Vec::new();
        if workspace.exists() {
            for entry in walkdir::WalkDir::new(&workspace)
                .max_depth(4)
                .into_iter()
                .filter_map(|e| e.ok())
                .take(200)
            {
                if entry.file_type().is_file() {
                    if let Ok(rel) = entry.path().strip_prefix(&workspace) {
                        listing.push(rel.display().to_string());
                    }
                }
            }
        }
        listing.sort();

        let mut context = HashMap::new();
        context.insert("specification".to_string(), spec.body.clone());
        context.insert(
            "workspace_listing".to_string(),
            if listing.is_empty() {
                "(empty workspace)".to_string()
            } else {
                listing.join("\n")
            },
        );

        let request = CompletionRequest {
            system_prompt: "You describe project file layouts concisely.".to_string(),
            messages: vec![Message::user(prompts::render(prompts::STRUCTURE, &context))],
            tools: vec![],
            max_tokens: self.max_tokens,
        };

        let response = complete_with_retry(&self.provider, request, &self.retry, cancel).await?;
        response
            .content
            .ok_or_else(|| WyvernError::Parse("empty structure response".to_string()))
    }
}

/// Parse analyzer output into an [`Analysis`], tolerating code fences and
/// prose around the JSON object.
pub fn parse_analysis(text: &str) -> Result<Analysis, WyvernError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &text[s..=e],
        _ => return Err(WyvernError::Parse("no JSON object in analyzer response".to_string())),
    };

    serde_json::from_str(json).map_err(|e| WyvernError::Parse(e.to_string()))
}

/// Link tasks to features: an explicit feature id wins; otherwise a feature
/// name occurring in the task name or description links it. Populates the
/// feature task lists.
fn link_features(spec: &mut Specification, analysis: &mut Analysis) {
    let feature_index: Vec<(String, String)> = spec
        .features
        .iter()
        .map(|f| (f.id.clone(), f.name.to_lowercase()))
        .collect();

    for area in &mut analysis.areas {
        for task in &mut area.tasks {
            let resolved = match &task.feature_id {
                Some(id) if feature_index.iter().any(|(fid, _)| fid == id) => Some(id.clone()),
                _ => {
                    let haystack = format!("{} {}", task.name, task.description).to_lowercase();
                    feature_index
                        .iter()
                        .find(|(_, name)| haystack.contains(name.as_str()))
                        .map(|(id, _)| id.clone())
                }
            };

            task.feature_id = resolved.clone();

            if let Some(feature_id) = resolved {
                if let Some(feature) = spec.feature_mut(&feature_id) {
                    if !feature.task_ids.contains(&task.id) {
                        feature.task_ids.push(task.id.clone());
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::domain::{Feature, Project, TaskStatus};
    use crate::llm::provider::mock::MockProvider;
    use crate::llm::CompletionResponse;
    use tempfile::tempdir;

    fn analysis_json(feature_id: &str) -> String {
        format!(
            r#"{{
  "project_name": "demo",
  "total_tasks": 2,
  "areas": [
    {{
      "name": "backend",
      "tasks": [
        {{"id": "backend-1", "name": "greet command", "description": "print hi", "deps": [], "level": 0, "specialization": "rust", "priority": "normal", "feature": "{}"}},
        {{"id": "backend-2", "name": "wire up main", "description": "entry point", "deps": ["backend-1"], "level": 1, "specialization": "rust", "priority": "normal"}}
      ]
    }}
  ]
}}"#,
            feature_id
        )
    }

    async fn setup(spec_approved: bool) -> (tempfile::TempDir, ProjectStore, Project, Specification) {
        let temp = tempdir().unwrap();
        let store = ProjectStore::open(temp.path()).await.unwrap();

        let project = Project::new("demo", temp.path().join("ws"));
        let mut spec = Specification::new("Build a CLI that prints 'hi'");
        spec.features.push(Feature::new("greet", "print a greeting"));
        if spec_approved {
            spec.status = SpecStatus::Approved;
        }
        store.create_project(project.clone(), &spec).await.unwrap();

        (temp, store, project, spec)
    }

    #[tokio::test]
    async fn test_analyze_happy_path() {
        let (_temp, store, project, spec) = setup(true).await;
        let feature_id = spec.features[0].id.clone();

        let provider = Arc::new(MockProvider::new(vec![CompletionResponse::text(analysis_json(
            &feature_id,
        ))]));
        let wyvern = Wyvern::new(store.clone(), provider, &LimitsConfig::default());

        let analysis = wyvern.analyze(&project.id, &CancelToken::new()).await.unwrap();

        assert_eq!(analysis.total_tasks, 2);
        assert_eq!(analysis.areas[0].name, "backend");

        // Tracker written with all tasks Unassigned.
        let tracker = store.load_tracker(&project.id, "backend").await.unwrap();
        assert_eq!(tracker.tasks.len(), 2);
        assert!(tracker.tasks.iter().all(|t| t.status == TaskStatus::Unassigned));

        // Feature linked to both tasks (explicit id + name match) and marked
        // assigned to the analyzer.
        let spec = store.load_specification(&project.id).await.unwrap();
        let feature = &spec.features[0];
        assert_eq!(feature.status, FeatureStatus::AssignedToAnalyzer);
        assert!(feature.task_ids.contains(&"backend-1".to_string()));
    }

    #[tokio::test]
    async fn test_analyze_rejects_unapproved_spec() {
        let (_temp, store, project, _spec) = setup(false).await;
        let provider = Arc::new(MockProvider::new(vec![]));
        let wyvern = Wyvern::new(store, provider, &LimitsConfig::default());

        let result = wyvern.analyze(&project.id, &CancelToken::new()).await;
        assert!(matches!(result, Err(WyvernError::SpecNotApproved)));
    }

    #[tokio::test]
    async fn test_analyze_rejects_malformed_output() {
        let (_temp, store, project, _spec) = setup(true).await;
        let provider = Arc::new(MockProvider::new(vec![CompletionResponse::text(
            "I could not produce an analysis, sorry.",
        )]));
        let wyvern = Wyvern::new(store, provider, &LimitsConfig::default());

        let result = wyvern.analyze(&project.id, &CancelToken::new()).await;
        assert!(matches!(result, Err(WyvernError::Parse(_))));
    }

    #[tokio::test]
    async fn test_analyze_rejects_cyclic_graph() {
        let (_temp, store, project, _spec) = setup(true).await;
        let cyclic = r#"{
  "project_name": "demo",
  "total_tasks": 2,
  "areas": [{"name": "backend", "tasks": [
    {"id": "backend-1", "name": "a", "description": "", "deps": ["backend-2"], "level": 1},
    {"id": "backend-2", "name": "b", "description": "", "deps": ["backend-1"], "level": 1}
  ]}]
}"#;
        let provider = Arc::new(MockProvider::new(vec![CompletionResponse::text(cyclic)]));
        let wyvern = Wyvern::new(store, provider, &LimitsConfig::default());

        let result = wyvern.analyze(&project.id, &CancelToken::new()).await;
        assert!(matches!(result, Err(WyvernError::Graph(AnalysisError::Cycle(_)))));
    }

    #[tokio::test]
    async fn test_reanalysis_preserves_task_status() {
        let (_temp, store, project, spec) = setup(true).await;
        let feature_id = spec.features[0].id.clone();

        let provider = Arc::new(MockProvider::new(vec![CompletionResponse::text(analysis_json(
            &feature_id,
        ))]));
        let wyvern = Wyvern::new(store.clone(), provider, &LimitsConfig::default());
        wyvern.analyze(&project.id, &CancelToken::new()).await.unwrap();

        // Simulate execution progress.
        let mut tracker = store.load_tracker(&project.id, "backend").await.unwrap();
        tracker.task_mut("backend-1").unwrap().set_status(TaskStatus::Done);
        let working = tracker.task_mut("backend-2").unwrap();
        working.worker = Some("kobold-x".to_string());
        working.set_status(TaskStatus::Working);
        store.save_tracker(&project.id, &tracker).await.unwrap();
        let before_1 = tracker.task("backend-1").unwrap().clone();
        let before_2 = tracker.task("backend-2").unwrap().clone();

        // Second analysis adds backend-3.
        let extended = r#"{
  "project_name": "demo",
  "total_tasks": 3,
  "areas": [{"name": "backend", "tasks": [
    {"id": "backend-1", "name": "greet command", "description": "print hi", "deps": [], "level": 0},
    {"id": "backend-2", "name": "wire up main", "description": "entry point", "deps": ["backend-1"], "level": 1},
    {"id": "backend-3", "name": "farewell command", "description": "print bye", "deps": ["backend-1"], "level": 1}
  ]}]
}"#;
        let provider = Arc::new(MockProvider::new(vec![CompletionResponse::text(extended)]));
        let wyvern = Wyvern::new(store.clone(), provider, &LimitsConfig::default());
        wyvern.analyze(&project.id, &CancelToken::new()).await.unwrap();

        let tracker = store.load_tracker(&project.id, "backend").await.unwrap();
        assert_eq!(tracker.task("backend-1").unwrap(), &before_1);
        assert_eq!(tracker.task("backend-2").unwrap(), &before_2);
        assert_eq!(tracker.task("backend-3").unwrap().status, TaskStatus::Unassigned);
    }

    #[test]
    fn test_parse_analysis_strips_fences() {
        let fenced = format!("```json\n{}\n```", analysis_json("f-1"));
        let analysis = parse_analysis(&fenced).unwrap();
        assert_eq!(analysis.areas.len(), 1);
    }

    #[test]
    fn test_parse_analysis_no_json() {
        assert!(matches!(parse_analysis("nothing here"), Err(WyvernError::Parse(_))));
    }
}
