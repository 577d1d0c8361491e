//! Project entity and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use super::id::generate_id;

/// Project lifecycle states.
///
/// Status advances only along the permitted transitions; see
/// [`ProjectStatus::can_transition`]. `Failed` is reachable from any state,
/// `Cancelled` is terminal, and the pause/suspend controls apply only while
/// `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Specification still being drafted; analyzer must not touch it.
    #[default]
    Prototype,
    /// Approved and waiting for the analyzer driver.
    New,
    /// Analyzer driver claimed the project.
    AnalyzerAssigned,
    /// Task graph produced and persisted.
    Analyzed,
    /// At least one task has left Unassigned.
    InProgress,
    /// All features completed.
    Completed,
    /// Analyzer or execution failure; error_message is set.
    Failed,
    /// Execution control: no new tasks selected.
    Paused,
    /// Execution control: long-term hold.
    Suspended,
    /// Terminal: no longer visible to drivers.
    Cancelled,
}

impl ProjectStatus {
    /// Whether a transition from `self` to `to` is permitted.
    pub fn can_transition(self, to: ProjectStatus) -> bool {
        use ProjectStatus::*;

        if self == to {
            return false;
        }

        match (self, to) {
            // Terminal states never transition out.
            (Cancelled, _) => false,
            (Completed, _) => false,

            // Failure is reachable from any live state; cancel likewise.
            (_, Failed) => true,
            (_, Cancelled) => true,

            (Prototype, New) => true,
            (New, AnalyzerAssigned) => true,
            (AnalyzerAssigned, Analyzed) => true,
            (Analyzed, InProgress) => true,
            (InProgress, Completed) => true,

            // Execution control is scoped to InProgress.
            (InProgress, Paused) => true,
            (InProgress, Suspended) => true,
            (Paused, InProgress) => true,
            (Suspended, InProgress) => true,

            // Operator retry resets a failed project for re-analysis.
            (Failed, New) => true,

            _ => false,
        }
    }

    /// States in which the supervisor driver ticks the project.
    pub fn is_executing(self) -> bool {
        matches!(self, ProjectStatus::Analyzed | ProjectStatus::InProgress)
    }

    /// States in which no new tasks may be selected.
    pub fn blocks_assignment(self) -> bool {
        matches!(
            self,
            ProjectStatus::Paused | ProjectStatus::Suspended | ProjectStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Prototype => "prototype",
            Self::New => "new",
            Self::AnalyzerAssigned => "analyzer_assigned",
            Self::Analyzed => "analyzed",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Suspended => "suspended",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Per-project agent configuration snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Provider catalogue name override (None = runtime default).
    pub provider: Option<String>,

    /// Parallel worker cap override (None = configured default).
    pub parallel_workers: Option<usize>,

    /// Whether Kobolds run a planning pass before executing.
    pub planning_enabled: bool,

    /// Verbose streaming of intermediate agent output.
    pub verbose: bool,
}

/// A project: the root entity owning a specification, an analysis, and
/// per-area task trackers.
///
/// Projects are never destroyed; cancelled ones remain in the registry for
/// audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Stable identifier.
    pub id: String,

    /// Human name, unique case-insensitively.
    pub name: String,

    /// Output workspace path (generated artefacts land here).
    pub workspace: PathBuf,

    /// Current lifecycle status.
    pub status: ProjectStatus,

    /// Paths outside the workspace that tools may touch.
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,

    /// Agent configuration snapshot.
    #[serde(default)]
    pub agent_config: AgentConfig,

    /// Short human-readable failure message.
    #[serde(default)]
    pub error_message: Option<String>,

    /// Longer failure diagnostic for the user-facing agent.
    #[serde(default)]
    pub error_detail: Option<String>,

    /// Optional verification state recorded by operators.
    #[serde(default)]
    pub verification: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,

    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new Prototype project.
    pub fn new(name: impl Into<String>, workspace: PathBuf) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: generate_id("project", &name),
            name,
            workspace,
            status: ProjectStatus::Prototype,
            allowed_paths: Vec::new(),
            agent_config: AgentConfig::default(),
            error_message: None,
            error_detail: None,
            verification: None,
            created_at: now,
            approved_at: None,
            analyzed_at: None,
            updated_at: now,
        }
    }

    /// Apply a status transition, enforcing the state machine.
    ///
    /// Returns false (and leaves the project untouched) when the transition
    /// is not permitted.
    pub fn transition(&mut self, to: ProjectStatus) -> bool {
        if !self.status.can_transition(to) {
            return false;
        }

        self.status = to;
        self.updated_at = Utc::now();

        match to {
            ProjectStatus::New => {
                self.approved_at.get_or_insert(self.updated_at);
                self.error_message = None;
                self.error_detail = None;
            }
            ProjectStatus::Analyzed => {
                self.analyzed_at = Some(self.updated_at);
            }
            _ => {}
        }

        true
    }

    /// Transition to Failed, recording a short message and a diagnostic.
    pub fn fail(&mut self, message: impl Into<String>, detail: impl Into<String>) {
        if self.transition(ProjectStatus::Failed) {
            self.error_message = Some(message.into());
            self.error_detail = Some(detail.into());
        }
    }
}

/// Case-insensitive name index over projects.
pub fn name_taken(projects: &HashMap<String, Project>, name: &str) -> bool {
    let lowered = name.to_lowercase();
    projects.values().any(|p| p.name.to_lowercase() == lowered)
}
