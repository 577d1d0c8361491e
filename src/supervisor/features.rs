//! Feature and project status roll-up.
//!
//! Feature status is a monotonic function of its linked tasks: any claimed
//! task makes the feature InProgress, all tasks Done makes it Completed, and
//! Completed never regresses.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::{FeatureStatus, TaskStatus};
use crate::store::{ProjectStore, StoreError};

/// Aggregate execution state of one project's tasks and features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectRollup {
    /// Every feature completed.
    Completed,
    /// Every task is terminally failed.
    AllFailed,
    /// Anything else.
    InFlight,
}

/// Recompute feature statuses from tracker state and persist the result.
///
/// Features without linked tasks fall back to project-wide completion: they
/// complete when every task in every tracker is Done.
pub async fn sync_features(store: &ProjectStore, project_id: &str) -> Result<ProjectRollup, StoreError> {
    let mut spec = store.load_specification(project_id).await?;

    let mut statuses: HashMap<String, TaskStatus> = HashMap::new();
    for area in store.list_areas(project_id).await? {
        let tracker = store.load_tracker(project_id, &area).await?;
        for task in &tracker.tasks {
            statuses.insert(task.id.clone(), task.status);
        }
    }

    if statuses.is_empty() {
        return Ok(ProjectRollup::InFlight);
    }

    let all_done = statuses.values().all(|s| *s == TaskStatus::Done);
    let all_failed = statuses.values().all(|s| *s == TaskStatus::Failed);

    let mut changed = false;
    for feature in &mut spec.features {
        let before = feature.status;

        if feature.task_ids.is_empty() {
            if all_done {
                feature.set_status(FeatureStatus::Completed);
            }
        } else {
            let linked: Vec<TaskStatus> = feature
                .task_ids
                .iter()
                .filter_map(|id| statuses.get(id).copied())
                .collect();

            if !linked.is_empty() && linked.iter().all(|s| *s == TaskStatus::Done) {
                feature.set_status(FeatureStatus::Completed);
            } else if linked.iter().any(|s| s.is_claimed()) {
                feature.set_status(FeatureStatus::InProgress);
            }
        }

        if feature.status != before {
            debug!(project_id, feature = %feature.name, status = ?feature.status, "sync_features: updated");
            changed = true;
        }
    }

    if changed {
        store.save_specification(project_id, &spec).await?;
    }

    if !spec.features.is_empty() && spec.features.iter().all(|f| f.status == FeatureStatus::Completed) {
        Ok(ProjectRollup::Completed)
    } else if all_failed {
        Ok(ProjectRollup::AllFailed)
    } else {
        Ok(ProjectRollup::InFlight)
    }
}
