//! Persistent project store.
//!
//! On-disk layout under the configured root:
//!
//! ```text
//! <root>/projects.json                              project registry
//! <root>/<project-id>/specification.md              specification body
//! <root>/<project-id>/specification.features.json   features + spec status
//! <root>/<project-id>/analysis.json                 task graph snapshot
//! <root>/<project-id>/tasks/<area>-tasks.md         per-area tracker
//! <root>/<project-id>/plans/<task-id>.plan.json     worker plans
//! <root>/<project-id>/workspace/                    generated artefacts
//! ```
//!
//! All writes go through a temp-file-then-rename so a crash between any two
//! persisted transitions leaves the last complete snapshot on disk. Disk
//! failures are retried once before surfacing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::{name_taken, Analysis, Project, ProjectStatus, SpecStatus, Specification};
use crate::tracker::{TrackerError, TrackerFile};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Project name already in use: {0}")]
    NameTaken(String),

    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition { from: ProjectStatus, to: ProjectStatus },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

/// Sidecar file carrying everything about a specification except its body.
#[derive(Debug, Serialize, Deserialize)]
struct FeaturesFile {
    status: SpecStatus,
    features: Vec<crate::domain::Feature>,
}

/// The process-wide project store handle.
///
/// The registry is loaded once at start-up; mutations persist before
/// returning. Tracker writes for one project serialize through a per-project
/// lock.
#[derive(Clone)]
pub struct ProjectStore {
    root: PathBuf,
    projects: Arc<RwLock<HashMap<String, Project>>>,
    project_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,

    /// Serializes registry snapshots: concurrent drivers transitioning
    /// different projects would otherwise race on projects.json.tmp.
    registry_lock: Arc<Mutex<()>>,
}

impl ProjectStore {
    /// Open (or initialise) a store at the given root.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await.map_err(|e| StoreError::Io {
            path: root.clone(),
            source: e,
        })?;

        let registry_path = root.join("projects.json");
        let projects = if registry_path.exists() {
            let content = read_file(&registry_path).await?;
            let list: Vec<Project> = serde_json::from_str(&content)?;
            info!(count = list.len(), "ProjectStore: loaded registry");
            list.into_iter().map(|p| (p.id.clone(), p)).collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            root,
            projects: Arc::new(RwLock::new(projects)),
            project_locks: Arc::new(Mutex::new(HashMap::new())),
            registry_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn project_dir(&self, project_id: &str) -> PathBuf {
        self.root.join(project_id)
    }

    /// Workspace directory for generated artefacts.
    pub fn workspace_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("workspace")
    }

    /// Path of one area's tracker file.
    pub fn tracker_path(&self, project_id: &str, area: &str) -> PathBuf {
        self.project_dir(project_id).join("tasks").join(format!("{}-tasks.md", area))
    }

    /// Path of one task's persisted plan.
    pub fn plan_path(&self, project_id: &str, task_id: &str) -> PathBuf {
        self.project_dir(project_id)
            .join("plans")
            .join(format!("{}.plan.json", task_id))
    }

    async fn lock_for(&self, project_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.project_locks.lock().await;
        locks
            .entry(project_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // === Registry ===

    /// Create a project with its specification. Fails when the name is taken
    /// (case-insensitive).
    pub async fn create_project(&self, project: Project, spec: &Specification) -> Result<(), StoreError> {
        {
            let mut projects = self.projects.write().await;
            if name_taken(&projects, &project.name) {
                return Err(StoreError::NameTaken(project.name.clone()));
            }
            projects.insert(project.id.clone(), project.clone());
        }

        let dir = self.project_dir(&project.id);
        for sub in ["tasks", "plans", "workspace"] {
            let path = dir.join(sub);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| StoreError::Io { path, source: e })?;
        }

        self.save_specification(&project.id, spec).await?;
        self.persist_registry().await?;
        info!(project_id = %project.id, name = %project.name, "ProjectStore: created project");
        Ok(())
    }

    pub async fn get_project(&self, project_id: &str) -> Result<Project, StoreError> {
        let projects = self.projects.read().await;
        projects
            .get(project_id)
            .cloned()
            .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))
    }

    /// Find a project by name, case-insensitively.
    pub async fn find_by_name(&self, name: &str) -> Option<Project> {
        let lowered = name.to_lowercase();
        let projects = self.projects.read().await;
        projects.values().find(|p| p.name.to_lowercase() == lowered).cloned()
    }

    /// List projects, optionally filtered by status. Sorted by id for stable
    /// driver iteration.
    pub async fn list_projects(&self, status: Option<ProjectStatus>) -> Vec<Project> {
        let projects = self.projects.read().await;
        let mut list: Vec<Project> = projects
            .values()
            .filter(|p| status.map(|s| p.status == s).unwrap_or(true))
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Mutate a project in place and persist the registry before returning.
    pub async fn update_project<F>(&self, project_id: &str, mutate: F) -> Result<Project, StoreError>
    where
        F: FnOnce(&mut Project),
    {
        let updated = {
            let mut projects = self.projects.write().await;
            let project = projects
                .get_mut(project_id)
                .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))?;
            mutate(project);
            project.clone()
        };
        self.persist_registry().await?;
        Ok(updated)
    }

    /// Apply a validated status transition and persist it.
    pub async fn transition_project(&self, project_id: &str, to: ProjectStatus) -> Result<Project, StoreError> {
        let updated = {
            let mut projects = self.projects.write().await;
            let project = projects
                .get_mut(project_id)
                .ok_or_else(|| StoreError::ProjectNotFound(project_id.to_string()))?;
            let from = project.status;
            if !project.transition(to) {
                return Err(StoreError::IllegalTransition { from, to });
            }
            project.clone()
        };
        self.persist_registry().await?;
        debug!(project_id, status = %to, "ProjectStore: transition persisted");
        Ok(updated)
    }

    async fn persist_registry(&self) -> Result<(), StoreError> {
        // The snapshot and the temp-file write must be one critical section:
        // two concurrent transitions share projects.json.tmp, and an
        // unserialized rename could put a stale snapshot on disk.
        let _guard = self.registry_lock.lock().await;

        let list = {
            let projects = self.projects.read().await;
            let mut list: Vec<Project> = projects.values().cloned().collect();
            list.sort_by(|a, b| a.id.cmp(&b.id));
            list
        };
        let json = serde_json::to_string_pretty(&list)?;
        atomic_write(&self.root.join("projects.json"), json.as_bytes()).await
    }

    // === Specification ===

    pub async fn save_specification(&self, project_id: &str, spec: &Specification) -> Result<(), StoreError> {
        let dir = self.project_dir(project_id);
        atomic_write(&dir.join("specification.md"), spec.body.as_bytes()).await?;

        let features = FeaturesFile {
            status: spec.status,
            features: spec.features.clone(),
        };
        let json = serde_json::to_string_pretty(&features)?;
        atomic_write(&dir.join("specification.features.json"), json.as_bytes()).await
    }

    pub async fn load_specification(&self, project_id: &str) -> Result<Specification, StoreError> {
        let dir = self.project_dir(project_id);
        let body = read_file(&dir.join("specification.md")).await?;
        let features_path = dir.join("specification.features.json");

        let (status, features) = if features_path.exists() {
            let content = read_file(&features_path).await?;
            let file: FeaturesFile = serde_json::from_str(&content)?;
            (file.status, file.features)
        } else {
            (SpecStatus::Prototype, Vec::new())
        };

        Ok(Specification { body, status, features })
    }

    // === Analysis ===

    pub async fn save_analysis(&self, project_id: &str, analysis: &Analysis) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(analysis)?;
        atomic_write(&self.project_dir(project_id).join("analysis.json"), json.as_bytes()).await
    }

    pub async fn load_analysis(&self, project_id: &str) -> Result<Option<Analysis>, StoreError> {
        let path = self.project_dir(project_id).join("analysis.json");
        if !path.exists() {
            return Ok(None);
        }
        let content = read_file(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    // === Trackers ===

    /// Persist a tracker, serialized through the per-project lock.
    pub async fn save_tracker(&self, project_id: &str, tracker: &TrackerFile) -> Result<(), StoreError> {
        let lock = self.lock_for(project_id).await;
        let _guard = lock.lock().await;

        let path = self.tracker_path(project_id, &tracker.area);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        atomic_write(&path, tracker.serialize().as_bytes()).await
    }

    /// Reload a tracker from disk (the source of truth for supervisors).
    pub async fn load_tracker(&self, project_id: &str, area: &str) -> Result<TrackerFile, StoreError> {
        let path = self.tracker_path(project_id, area);
        Ok(TrackerFile::load(&path).await?)
    }

    /// Area names that have tracker files on disk, sorted.
    pub async fn list_areas(&self, project_id: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.project_dir(project_id).join("tasks");
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut areas = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(area) = name.strip_suffix("-tasks.md") {
                areas.push(area.to_string());
            }
        }
        areas.sort();
        Ok(areas)
    }

    // === Plans ===

    pub async fn save_plan<T: Serialize>(&self, project_id: &str, task_id: &str, plan: &T) -> Result<(), StoreError> {
        let path = self.plan_path(project_id, task_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| StoreError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let json = serde_json::to_string_pretty(plan)?;
        atomic_write(&path, json.as_bytes()).await
    }

    pub async fn load_plan<T: for<'de> Deserialize<'de>>(
        &self,
        project_id: &str,
        task_id: &str,
    ) -> Result<Option<T>, StoreError> {
        let path = self.plan_path(project_id, task_id);
        if !path.exists() {
            return Ok(None);
        }
        let content = read_file(&path).await?;
        Ok(Some(serde_json::from_str(&content)?))
    }
}

async fn read_file(path: &Path) -> Result<String, StoreError> {
    tokio::fs::read_to_string(path).await.map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write via temp file + rename; a failed write is retried once.
async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    match try_atomic_write(path, bytes).await {
        Ok(()) => Ok(()),
        Err(first) => {
            warn!(path = %path.display(), error = %first, "atomic_write: retrying after failure");
            try_atomic_write(path, bytes).await.map_err(|e| StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    }
}

async fn try_atomic_write(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}
