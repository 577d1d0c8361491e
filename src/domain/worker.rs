//! Worker (Kobold) records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    #[default]
    Unassigned,
    Assigned,
    Working,
    Done,
    Failed,
}

impl WorkerStatus {
    /// Active workers count against the project's governor limit.
    pub fn is_active(self) -> bool {
        matches!(self, WorkerStatus::Assigned | WorkerStatus::Working)
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unassigned => "unassigned",
            Self::Assigned => "assigned",
            Self::Working => "working",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A task-scoped worker record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub id: String,

    /// Prompt/tool preset tag, e.g. "rust", "react", "python".
    pub specialization: String,

    pub status: WorkerStatus,

    pub project_id: String,

    /// Task currently held, when assigned.
    pub task_id: Option<String>,

    /// Error text from the last failure.
    #[serde(default)]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Last status transition; stuck detection compares against this.
    pub updated_at: DateTime<Utc>,
}

impl WorkerRecord {
    pub fn new(project_id: impl Into<String>, specialization: impl Into<String>) -> Self {
        let specialization = specialization.into();
        let now = Utc::now();
        Self {
            id: generate_id("kobold", &specialization),
            specialization,
            status: WorkerStatus::Unassigned,
            project_id: project_id.into(),
            task_id: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn set_status(&mut self, status: WorkerStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn assign(&mut self, task_id: impl Into<String>) {
        self.task_id = Some(task_id.into());
        self.set_status(WorkerStatus::Assigned);
    }
}
