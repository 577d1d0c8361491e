//! Council tool implementations.
//!
//! These tools mutate the project store on behalf of the Dragon's council
//! members. Failures are tool-result text, like every other tool.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::{Feature, Priority, Project, ProjectStatus, SpecStatus, Specification};
use crate::tools::{Tool, ToolContext, ToolResult};

use super::state::CouncilState;

fn require_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    input[key]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolResult::error(format!("{} is required", key)))
}

// === Specification manager ===

/// Create a project with a prototype specification.
pub struct CreateProjectTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for CreateProjectTool {
    fn name(&self) -> &'static str {
        "create_project"
    }

    fn description(&self) -> &'static str {
        "Create a new project with a prototype specification. Names are unique."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Unique project name"},
                "body": {"type": "string", "description": "Initial specification markdown"}
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let name = match require_str(&input, "name") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let body = input["body"].as_str().unwrap_or_default();

        let project = Project::new(name, PathBuf::new());
        let workspace = self.state.store.workspace_path(&project.id);
        let project = Project {
            workspace,
            ..project
        };
        let id = project.id.clone();

        match self
            .state
            .store
            .create_project(project, &Specification::new(body))
            .await
        {
            Ok(()) => ToolResult::success(format!("Created project '{}' with id {}", name, id)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Replace a specification body.
pub struct UpdateSpecificationTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for UpdateSpecificationTool {
    fn name(&self) -> &'static str {
        "update_specification"
    }

    fn description(&self) -> &'static str {
        "Replace the specification body of a project (id or name)."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"},
                "body": {"type": "string", "description": "New specification markdown"}
            },
            "required": ["project", "body"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let body = match require_str(&input, "body") {
            Ok(v) => v,
            Err(e) => return e,
        };

        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut spec = match self.state.store.load_specification(&project.id).await {
            Ok(s) => s,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if spec.status == SpecStatus::Approved {
            return ToolResult::error("Specification is already approved; approved specifications are immutable");
        }

        spec.body = body.to_string();
        match self.state.store.save_specification(&project.id, &spec).await {
            Ok(()) => ToolResult::success(format!("Updated specification of {}", project.id)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Add a feature to a specification.
pub struct AddFeatureTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for AddFeatureTool {
    fn name(&self) -> &'static str {
        "add_feature"
    }

    fn description(&self) -> &'static str {
        "Add a feature to a project's specification."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"},
                "name": {"type": "string", "description": "Feature name"},
                "description": {"type": "string", "description": "One-line description"},
                "priority": {"type": "string", "description": "low | normal | high | critical"}
            },
            "required": ["project", "name", "description"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let name = match require_str(&input, "name") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let description = input["description"].as_str().unwrap_or_default();

        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut spec = match self.state.store.load_specification(&project.id).await {
            Ok(s) => s,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut feature = Feature::new(name, description);
        if let Some(priority) = input["priority"].as_str() {
            match priority.parse::<Priority>() {
                Ok(p) => feature.priority = p,
                Err(e) => return ToolResult::error(e),
            }
        }
        let feature_id = feature.id.clone();
        spec.features.push(feature);

        match self.state.store.save_specification(&project.id, &spec).await {
            Ok(()) => ToolResult::success(format!("Added feature '{}' ({}) to {}", name, feature_id, project.id)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// List projects with their statuses.
pub struct ListProjectsTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for ListProjectsTool {
    fn name(&self) -> &'static str {
        "list_projects"
    }

    fn description(&self) -> &'static str {
        "List all projects with id, name and status."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, _ctx: &ToolContext) -> ToolResult {
        let projects = self.state.store.list_projects(None).await;
        if projects.is_empty() {
            return ToolResult::success("No projects");
        }

        let lines: Vec<String> = projects
            .iter()
            .map(|p| format!("{} | {} | {}", p.id, p.name, p.status))
            .collect();
        ToolResult::success(lines.join("\n"))
    }
}

/// Show a project's specification body and features.
pub struct ShowSpecificationTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for ShowSpecificationTool {
    fn name(&self) -> &'static str {
        "show_specification"
    }

    fn description(&self) -> &'static str {
        "Show a project's specification body, status and features."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"}
            },
            "required": ["project"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let spec = match self.state.store.load_specification(&project.id).await {
            Ok(s) => s,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let features: Vec<String> = spec
            .features
            .iter()
            .map(|f| format!("- {} ({:?}): {}", f.name, f.status, f.description))
            .collect();

        ToolResult::success(format!(
            "Specification of {} [{:?}]\n\n{}\n\nFeatures:\n{}",
            project.id,
            spec.status,
            spec.body,
            if features.is_empty() {
                "(none)".to_string()
            } else {
                features.join("\n")
            }
        ))
    }
}

// === Importer ===

/// Read-only scan of an existing directory for the importer.
pub struct ScanDirectoryTool;

#[async_trait]
impl Tool for ScanDirectoryTool {
    fn name(&self) -> &'static str {
        "scan_directory"
    }

    fn description(&self) -> &'static str {
        "List files in an existing directory and preview the first lines of source files."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Absolute path of the directory to scan"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let path = match require_str(&input, "path") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let root = Path::new(path);
        if !root.is_dir() {
            return ToolResult::error(format!("{} is not a directory", path));
        }

        let mut listing = Vec::new();
        let mut previews = Vec::new();

        for entry in walkdir::WalkDir::new(root)
            .max_depth(4)
            .into_iter()
            .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .take(200)
        {
            let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
            listing.push(rel.display().to_string());

            if previews.len() < 20 {
                if let Ok(content) = std::fs::read_to_string(entry.path()) {
                    let head: String = content.lines().take(30).collect::<Vec<_>>().join("\n");
                    previews.push(format!("=== {} ===\n{}", rel.display(), head));
                }
            }
        }
        listing.sort();

        debug!(%path, files = listing.len(), "ScanDirectoryTool: scanned");
        ToolResult::success(format!("Files:\n{}\n\nPreviews:\n{}", listing.join("\n"), previews.join("\n\n")))
    }
}

/// Create a project from an existing code base (prototype specification).
pub struct ImportProjectTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for ImportProjectTool {
    fn name(&self) -> &'static str {
        "import_project"
    }

    fn description(&self) -> &'static str {
        "Create a project with a draft specification summarising an existing code base."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Unique project name"},
                "body": {"type": "string", "description": "Specification body summarising the code"},
                "source_path": {"type": "string", "description": "Directory the code was imported from"}
            },
            "required": ["name", "body"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let name = match require_str(&input, "name") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let body = match require_str(&input, "body") {
            Ok(v) => v,
            Err(e) => return e,
        };

        let mut project = Project::new(name, PathBuf::new());
        project.workspace = self.state.store.workspace_path(&project.id);
        if let Some(source) = input["source_path"].as_str() {
            // The original tree stays readable for workers.
            project.allowed_paths.push(PathBuf::from(source));
        }
        let id = project.id.clone();

        match self
            .state
            .store
            .create_project(project, &Specification::new(body))
            .await
        {
            Ok(()) => ToolResult::success(format!("Imported project '{}' with id {}", name, id)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

// === Git operator ===

/// Run a git command inside a project workspace.
pub struct GitCommandTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for GitCommandTool {
    fn name(&self) -> &'static str {
        "git_command"
    }

    fn description(&self) -> &'static str {
        "Run a git command inside a project's workspace. The command must start with 'git'."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"},
                "command": {"type": "string", "description": "Full git command line, e.g. 'git status'"}
            },
            "required": ["project", "command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let command = match require_str(&input, "command") {
            Ok(v) => v,
            Err(e) => return e,
        };

        if command != "git" && !command.starts_with("git ") {
            return ToolResult::error("Only git commands are allowed");
        }

        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let output = tokio::select! {
            result = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&project.workspace)
                .kill_on_drop(true)
                .output() => match result {
                    Ok(o) => o,
                    Err(e) => return ToolResult::error(format!("Failed to run git: {}", e)),
                },
            _ = ctx.cancel.cancelled() => return ToolResult::error("Command cancelled"),
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            ToolResult::success(if stdout.is_empty() { stderr } else { stdout })
        } else {
            ToolResult::error(format!(
                "Exit code: {}\n{}{}",
                output.status.code().unwrap_or(-1),
                stdout,
                stderr
            ))
        }
    }
}

// === Configuration overseer ===

/// Adjust a project's agent configuration.
pub struct SetAgentConfigTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for SetAgentConfigTool {
    fn name(&self) -> &'static str {
        "set_agent_config"
    }

    fn description(&self) -> &'static str {
        "Set a project's provider override, parallel worker limit, or planning flag."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"},
                "provider": {"type": "string", "description": "Provider catalogue name"},
                "parallel_workers": {"type": "integer", "description": "Worker cap for this project"},
                "planning_enabled": {"type": "boolean", "description": "Run a planning pass before executing tasks"}
            },
            "required": ["project"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let provider = input["provider"].as_str().map(|s| s.to_string());
        let parallel_workers = input["parallel_workers"].as_u64().map(|n| n as usize);
        let planning_enabled = input["planning_enabled"].as_bool();

        let result = self
            .state
            .store
            .update_project(&project.id, |p| {
                if provider.is_some() {
                    p.agent_config.provider = provider.clone();
                }
                if let Some(limit) = parallel_workers {
                    p.agent_config.parallel_workers = Some(limit);
                }
                if let Some(planning) = planning_enabled {
                    p.agent_config.planning_enabled = planning;
                }
            })
            .await;

        match result {
            Ok(updated) => ToolResult::success(format!(
                "Configuration of {}: provider={:?}, parallel_workers={:?}, planning={}",
                updated.id,
                updated.agent_config.provider,
                updated.agent_config.parallel_workers,
                updated.agent_config.planning_enabled
            )),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Grant tools access to a path outside the workspace.
pub struct AllowExternalPathTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for AllowExternalPathTool {
    fn name(&self) -> &'static str {
        "allow_external_path"
    }

    fn description(&self) -> &'static str {
        "Allow a project's tools to read and write one path outside the workspace."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"},
                "path": {"type": "string", "description": "Absolute path to allow"}
            },
            "required": ["project", "path"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let path = match require_str(&input, "path") {
            Ok(v) => v,
            Err(e) => return e,
        };
        if !Path::new(path).is_absolute() {
            return ToolResult::error("path must be absolute");
        }

        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let path_buf = PathBuf::from(path);
        let result = self
            .state
            .store
            .update_project(&project.id, |p| {
                if !p.allowed_paths.contains(&path_buf) {
                    p.allowed_paths.push(path_buf.clone());
                }
            })
            .await;

        match result {
            Ok(_) => ToolResult::success(format!("Allowed {} for {}", path, project.id)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Report a project's effective configuration.
pub struct ShowConfigTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for ShowConfigTool {
    fn name(&self) -> &'static str {
        "show_config"
    }

    fn description(&self) -> &'static str {
        "Show a project's agent configuration and allowed external paths."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"}
            },
            "required": ["project"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let paths: Vec<String> = project
            .allowed_paths
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        ToolResult::success(format!(
            "Project {}: provider={:?}, parallel_workers={:?}, planning={}, verbose={}, allowed paths: {}",
            project.id,
            project.agent_config.provider,
            project.agent_config.parallel_workers,
            project.agent_config.planning_enabled,
            project.agent_config.verbose,
            if paths.is_empty() {
                "(none)".to_string()
            } else {
                paths.join(", ")
            }
        ))
    }
}

// === Dragon-owned tools ===

/// Two-stage approval: advance a prototype specification to New.
pub struct ApproveSpecificationTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for ApproveSpecificationTool {
    fn name(&self) -> &'static str {
        "approve_specification"
    }

    fn description(&self) -> &'static str {
        "Approve a prototype specification so the analyzer may pick the project up."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"}
            },
            "required": ["project"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut spec = match self.state.store.load_specification(&project.id).await {
            Ok(s) => s,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if !spec.is_approvable() {
            return ToolResult::error(
                "Specification cannot be approved: it needs a non-empty body and at least one feature",
            );
        }

        spec.status = SpecStatus::Approved;
        if let Err(e) = self.state.store.save_specification(&project.id, &spec).await {
            return ToolResult::error(e.to_string());
        }

        match self
            .state
            .store
            .transition_project(&project.id, ProjectStatus::New)
            .await
        {
            Ok(_) => ToolResult::success(format!(
                "Approved {}; the analyzer will pick it up shortly",
                project.id
            )),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Pipeline progress summary for the Dragon.
pub struct ProjectStatusTool {
    pub state: CouncilState,
}

#[async_trait]
impl Tool for ProjectStatusTool {
    fn name(&self) -> &'static str {
        "project_status"
    }

    fn description(&self) -> &'static str {
        "Report a project's pipeline status, task counts and any failure message."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project": {"type": "string", "description": "Project id or name"}
            },
            "required": ["project"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let reference = match require_str(&input, "project") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let project = match self.state.resolve_project(reference).await {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let mut task_lines = Vec::new();
        if let Ok(areas) = self.state.store.list_areas(&project.id).await {
            for area in areas {
                if let Ok(tracker) = self.state.store.load_tracker(&project.id, &area).await {
                    let total = tracker.tasks.len();
                    let done = tracker
                        .tasks
                        .iter()
                        .filter(|t| t.status == crate::domain::TaskStatus::Done)
                        .count();
                    task_lines.push(format!("  {}: {}/{} done", area, done, total));
                }
            }
        }

        let mut summary = format!("Project {} ({}): {}", project.id, project.name, project.status);
        if let Some(error) = &project.error_message {
            summary.push_str(&format!("\nError: {}", error));
        }
        if !task_lines.is_empty() {
            summary.push_str("\nAreas:\n");
            summary.push_str(&task_lines.join("\n"));
        }

        ToolResult::success(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ProjectStore;
    use tempfile::tempdir;

    async fn state() -> (tempfile::TempDir, CouncilState) {
        let temp = tempdir().unwrap();
        let store = ProjectStore::open(temp.path()).await.unwrap();
        (temp, CouncilState::new(store))
    }

    fn ctx(temp: &tempfile::TempDir) -> ToolContext {
        ToolContext::new(temp.path().to_path_buf(), "council-test")
    }

    #[tokio::test]
    async fn test_create_then_approve_flow() {
        let (temp, state) = state().await;
        let ctx = ctx(&temp);

        let create = CreateProjectTool { state: state.clone() };
        let result = create
            .execute(
                serde_json::json!({"name": "demo", "body": "Build a CLI that prints 'hi'"}),
                &ctx,
            )
            .await;
        assert!(!result.is_error, "{}", result.content);

        // Approval fails without features.
        let approve = ApproveSpecificationTool { state: state.clone() };
        let result = approve.execute(serde_json::json!({"project": "demo"}), &ctx).await;
        assert!(result.is_error);

        let add = AddFeatureTool { state: state.clone() };
        let result = add
            .execute(
                serde_json::json!({"project": "demo", "name": "greet", "description": "print hi"}),
                &ctx,
            )
            .await;
        assert!(!result.is_error, "{}", result.content);

        let result = approve.execute(serde_json::json!({"project": "demo"}), &ctx).await;
        assert!(!result.is_error, "{}", result.content);

        let project = state.resolve_project("demo").await.unwrap();
        assert_eq!(project.status, ProjectStatus::New);
        let spec = state.store.load_specification(&project.id).await.unwrap();
        assert_eq!(spec.status, SpecStatus::Approved);
    }

    #[tokio::test]
    async fn test_update_specification_rejects_approved() {
        let (temp, state) = state().await;
        let ctx = ctx(&temp);

        let create = CreateProjectTool { state: state.clone() };
        create
            .execute(serde_json::json!({"name": "demo", "body": "body"}), &ctx)
            .await;
        let add = AddFeatureTool { state: state.clone() };
        add.execute(
            serde_json::json!({"project": "demo", "name": "f", "description": "d"}),
            &ctx,
        )
        .await;
        let approve = ApproveSpecificationTool { state: state.clone() };
        approve.execute(serde_json::json!({"project": "demo"}), &ctx).await;

        let update = UpdateSpecificationTool { state: state.clone() };
        let result = update
            .execute(
                serde_json::json!({"project": "demo", "body": "rewritten"}),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("immutable"));
    }

    #[tokio::test]
    async fn test_set_agent_config_and_show() {
        let (temp, state) = state().await;
        let ctx = ctx(&temp);

        CreateProjectTool { state: state.clone() }
            .execute(serde_json::json!({"name": "demo"}), &ctx)
            .await;

        let set = SetAgentConfigTool { state: state.clone() };
        let result = set
            .execute(
                serde_json::json!({"project": "demo", "parallel_workers": 5, "planning_enabled": true}),
                &ctx,
            )
            .await;
        assert!(!result.is_error);

        let project = state.resolve_project("demo").await.unwrap();
        assert_eq!(project.agent_config.parallel_workers, Some(5));
        assert!(project.agent_config.planning_enabled);

        let show = ShowConfigTool { state: state.clone() };
        let result = show.execute(serde_json::json!({"project": "demo"}), &ctx).await;
        assert!(result.content.contains("parallel_workers=Some(5)"));
    }

    #[tokio::test]
    async fn test_allow_external_path_requires_absolute() {
        let (temp, state) = state().await;
        let ctx = ctx(&temp);

        CreateProjectTool { state: state.clone() }
            .execute(serde_json::json!({"name": "demo"}), &ctx)
            .await;

        let allow = AllowExternalPathTool { state: state.clone() };
        let result = allow
            .execute(
                serde_json::json!({"project": "demo", "path": "relative/path"}),
                &ctx,
            )
            .await;
        assert!(result.is_error);

        let result = allow
            .execute(
                serde_json::json!({"project": "demo", "path": "/srv/shared"}),
                &ctx,
            )
            .await;
        assert!(!result.is_error);

        let project = state.resolve_project("demo").await.unwrap();
        assert_eq!(project.allowed_paths, vec![PathBuf::from("/srv/shared")]);
    }

    #[tokio::test]
    async fn test_git_command_restricted_to_git() {
        let (temp, state) = state().await;
        let ctx = ctx(&temp);

        CreateProjectTool { state: state.clone() }
            .execute(serde_json::json!({"name": "demo"}), &ctx)
            .await;

        let git = GitCommandTool { state: state.clone() };
        let result = git
            .execute(
                serde_json::json!({"project": "demo", "command": "rm -rf /"}),
                &ctx,
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("Only git commands"));
    }

    #[tokio::test]
    async fn test_scan_directory() {
        let (temp, _state) = state().await;
        let ctx = ctx(&temp);

        let source = tempdir().unwrap();
        std::fs::write(source.path().join("main.py"), "print('hello')\n").unwrap();

        let result = ScanDirectoryTool
            .execute(
                serde_json::json!({"path": source.path().display().to_string()}),
                &ctx,
            )
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("main.py"));
        assert!(result.content.contains("print('hello')"));
    }
}
