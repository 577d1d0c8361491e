//! Shared state handle for council tools.

use crate::domain::Project;
use crate::store::{ProjectStore, StoreError};

/// What council tools operate on: the project store plus lookup helpers.
#[derive(Clone)]
pub struct CouncilState {
    pub store: ProjectStore,
}

impl CouncilState {
    pub fn new(store: ProjectStore) -> Self {
        Self { store }
    }

    /// Resolve a project reference: exact id first, then case-insensitive
    /// name.
    pub async fn resolve_project(&self, reference: &str) -> Result<Project, StoreError> {
        if let Ok(project) = self.store.get_project(reference).await {
            return Ok(project);
        }
        self.store
            .find_by_name(reference)
            .await
            .ok_or_else(|| StoreError::ProjectNotFound(reference.to_string()))
    }
}
