//! Warden-initiated execution control: pause, resume, suspend, cancel, retry.

use tracing::info;

use crate::domain::{FeatureStatus, ProjectStatus, TaskStatus};
use crate::store::{ProjectStore, StoreError};

/// Pause an in-progress project. Already-working workers keep running; the
/// supervisor selects no new tasks until resume.
pub async fn pause(store: &ProjectStore, project_id: &str) -> Result<(), StoreError> {
    store.transition_project(project_id, ProjectStatus::Paused).await?;
    info!(project_id, "execution control: paused");
    Ok(())
}

/// Resume a paused or suspended project.
pub async fn resume(store: &ProjectStore, project_id: &str) -> Result<(), StoreError> {
    store.transition_project(project_id, ProjectStatus::InProgress).await?;
    info!(project_id, "execution control: resumed");
    Ok(())
}

/// Suspend an in-progress project (long-term hold).
pub async fn suspend(store: &ProjectStore, project_id: &str) -> Result<(), StoreError> {
    store.transition_project(project_id, ProjectStatus::Suspended).await?;
    info!(project_id, "execution control: suspended");
    Ok(())
}

/// Cancel a project. Terminal: it stops appearing in driver scans; running
/// workers are signalled at their next suspension point by the supervisor
/// driver dropping their Drake.
pub async fn cancel(store: &ProjectStore, project_id: &str) -> Result<(), StoreError> {
    store.transition_project(project_id, ProjectStatus::Cancelled).await?;
    info!(project_id, "execution control: cancelled");
    Ok(())
}

/// Reset a failed project for re-analysis: back to New, error cleared, and
/// features stuck in AssignedToAnalyzer returned to New so the next run
/// re-collects them.
pub async fn retry(store: &ProjectStore, project_id: &str) -> Result<(), StoreError> {
    store.transition_project(project_id, ProjectStatus::New).await?;

    let mut spec = store.load_specification(project_id).await?;
    let mut changed = false;
    for feature in &mut spec.features {
        if feature.status == FeatureStatus::AssignedToAnalyzer {
            feature.status = FeatureStatus::New;
            changed = true;
        }
    }
    if changed {
        store.save_specification(project_id, &spec).await?;
    }

    info!(project_id, "execution control: reset for retry");
    Ok(())
}

/// Operator action: return failed tasks to the pool with a fresh retry
/// budget.
pub async fn retry_failed_tasks(store: &ProjectStore, project_id: &str) -> Result<usize, StoreError> {
    let mut reset = 0;
    for area in store.list_areas(project_id).await? {
        let mut tracker = store.load_tracker(project_id, &area).await?;
        let mut touched = false;
        for task in tracker.tasks.iter_mut() {
            if task.status == TaskStatus::Failed {
                task.retries = 0;
                task.worker = None;
                task.set_status(TaskStatus::Unassigned);
                touched = true;
                reset += 1;
            }
        }
        if touched {
            store.save_tracker(project_id, &tracker).await?;
        }
    }
    info!(project_id, reset, "execution control: failed tasks reset");
    Ok(reset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Project, Specification, TaskRecord};
    use crate::tracker::TrackerFile;
    use tempfile::tempdir;

    async fn in_progress_project() -> (tempfile::TempDir, ProjectStore, String) {
        let temp = tempdir().unwrap();
        let store = ProjectStore::open(temp.path()).await.unwrap();
        let project = Project::new("demo", temp.path().join("ws"));
        store
            .create_project(project.clone(), &Specification::new("spec"))
            .await
            .unwrap();

        for status in [
            ProjectStatus::New,
            ProjectStatus::AnalyzerAssigned,
            ProjectStatus::Analyzed,
            ProjectStatus::InProgress,
        ] {
            store.transition_project(&project.id, status).await.unwrap();
        }

        (temp, store, project.id)
    }

    #[tokio::test]
    async fn test_pause_resume_cycle() {
        let (_temp, store, project_id) = in_progress_project().await;

        pause(&store, &project_id).await.unwrap();
        assert_eq!(
            store.get_project(&project_id).await.unwrap().status,
            ProjectStatus::Paused
        );

        resume(&store, &project_id).await.unwrap();
        assert_eq!(
            store.get_project(&project_id).await.unwrap().status,
            ProjectStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_pause_requires_in_progress() {
        let temp = tempdir().unwrap();
        let store = ProjectStore::open(temp.path()).await.unwrap();
        let project = Project::new("demo", temp.path().join("ws"));
        store
            .create_project(project.clone(), &Specification::new("spec"))
            .await
            .unwrap();

        assert!(pause(&store, &project.id).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_is_terminal() {
        let (_temp, store, project_id) = in_progress_project().await;

        cancel(&store, &project_id).await.unwrap();
        assert!(resume(&store, &project_id).await.is_err());
    }

    #[tokio::test]
    async fn test_retry_failed_tasks() {
        let (_temp, store, project_id) = in_progress_project().await;

        let mut tracker = TrackerFile::new("backend");
        let mut failed = TaskRecord::new("backend-1", "doomed");
        failed.status = TaskStatus::Failed;
        failed.retries = 2;
        failed.error = Some("boom".to_string());
        tracker.tasks.push(failed);
        store.save_tracker(&project_id, &tracker).await.unwrap();

        let reset = retry_failed_tasks(&store, &project_id).await.unwrap();
        assert_eq!(reset, 1);

        let tracker = store.load_tracker(&project_id, "backend").await.unwrap();
        let task = tracker.task("backend-1").unwrap();
        assert_eq!(task.status, TaskStatus::Unassigned);
        assert_eq!(task.retries, 0);
    }

    #[tokio::test]
    async fn test_retry_tasks_works_where_project_retry_does_not() {
        // An InProgress project with a retry-capped Failed task: the
        // project-level reset is illegal, but the task reset must still
        // apply on its own.
        let (_temp, store, project_id) = in_progress_project().await;

        let mut tracker = TrackerFile::new("backend");
        let mut failed = TaskRecord::new("backend-1", "capped out");
        failed.status = TaskStatus::Failed;
        failed.retries = 2;
        tracker.tasks.push(failed);
        store.save_tracker(&project_id, &tracker).await.unwrap();

        let result = retry(&store, &project_id).await;
        assert!(matches!(
            result,
            Err(StoreError::IllegalTransition { from: ProjectStatus::InProgress, .. })
        ));

        let reset = retry_failed_tasks(&store, &project_id).await.unwrap();
        assert_eq!(reset, 1);

        let tracker = store.load_tracker(&project_id, "backend").await.unwrap();
        assert_eq!(tracker.task("backend-1").unwrap().status, TaskStatus::Unassigned);
        assert_eq!(
            store.get_project(&project_id).await.unwrap().status,
            ProjectStatus::InProgress
        );
    }
}
