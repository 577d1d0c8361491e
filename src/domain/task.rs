//! Task execution records, as stored in per-area tracker files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::priority::Priority;

/// Execution status of a tracker task.
///
/// Transitions are monotonic except `Failed -> Unassigned`, which is the
/// retry path (supervisor retry within the cap, or operator reset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker; dependencies may or may not be done.
    #[default]
    Unassigned,
    /// Claimed by a worker that has not started its first turn.
    NotInitialized,
    /// Worker actively executing.
    Working,
    /// Terminal success.
    Done,
    /// Terminal failure (until reset to Unassigned).
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unassigned => "unassigned",
            Self::NotInitialized => "not_initialized",
            Self::Working => "working",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unassigned" => Some(Self::Unassigned),
            "not_initialized" => Some(Self::NotInitialized),
            "working" => Some(Self::Working),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether a worker currently holds (or held) this task.
    pub fn is_claimed(self) -> bool {
        matches!(self, Self::NotInitialized | Self::Working)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One task's execution record in a tracker file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Identifier of the form `<area>-<n>`, assigned by the analyzer.
    pub id: String,

    /// Task title line.
    pub title: String,

    /// Dependency task ids.
    #[serde(default)]
    pub deps: Vec<String>,

    #[serde(default)]
    pub status: TaskStatus,

    /// Identifier of the worker holding or last holding the task.
    #[serde(default)]
    pub worker: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Recommended worker specialization.
    #[serde(default)]
    pub specialization: Option<String>,

    /// Dependency level from the analysis.
    #[serde(default)]
    pub level: u32,

    /// Error text from the last failure.
    #[serde(default)]
    pub error: Option<String>,

    /// Times this task has been returned to Unassigned after failure.
    #[serde(default)]
    pub retries: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            deps: Vec::new(),
            status: TaskStatus::Unassigned,
            worker: None,
            priority: Priority::Normal,
            specialization: None,
            level: 0,
            error: None,
            retries: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new status, stamping updated_at.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Assign to a worker.
    pub fn assign(&mut self, worker_id: impl Into<String>) {
        self.worker = Some(worker_id.into());
        self.set_status(TaskStatus::NotInitialized);
    }

    /// Return the task to the pool after a failure, bumping the retry count.
    pub fn release_for_retry(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.worker = None;
        self.retries += 1;
        self.set_status(TaskStatus::Unassigned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Unassigned,
            TaskStatus::NotInitialized,
            TaskStatus::Working,
            TaskStatus::Done,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("bogus"), None);
    }

    #[test]
    fn test_assign_and_release() {
        let mut task = TaskRecord::new("backend-1", "Set up server");
        task.assign("kobold-1");
        assert_eq!(task.status, TaskStatus::NotInitialized);
        assert_eq!(task.worker.as_deref(), Some("kobold-1"));

        task.release_for_retry("worker stuck");
        assert_eq!(task.status, TaskStatus::Unassigned);
        assert_eq!(task.worker, None);
        assert_eq!(task.retries, 1);
        assert_eq!(task.error.as_deref(), Some("worker stuck"));
    }
}
