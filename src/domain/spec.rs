//! Specification and feature entities.

use serde::{Deserialize, Serialize};

use super::id::generate_id;
use super::priority::Priority;

/// Specification lifecycle: only Approved specifications reach the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpecStatus {
    #[default]
    Prototype,
    Approved,
}

/// Feature progress, a monotonic function of its linked tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    #[default]
    New,
    AssignedToAnalyzer,
    InProgress,
    Completed,
}

/// A feature within a specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub name: String,
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub status: FeatureStatus,

    /// Optional branch label chosen by the analyzer.
    #[serde(default)]
    pub branch: Option<String>,

    /// Task ids linked to this feature by the analyzer.
    #[serde(default)]
    pub task_ids: Vec<String>,
}

impl Feature {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: generate_id("feature", &name),
            name,
            description: description.into(),
            priority: Priority::Normal,
            status: FeatureStatus::New,
            branch: None,
            task_ids: Vec::new(),
        }
    }

    /// Advance status, never regressing from Completed.
    pub fn set_status(&mut self, status: FeatureStatus) {
        if self.status == FeatureStatus::Completed {
            return;
        }
        self.status = status;
    }
}

/// A project specification: free-form markdown plus a feature list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Specification {
    /// Markdown body (persisted separately as specification.md).
    pub body: String,

    #[serde(default)]
    pub status: SpecStatus,

    #[serde(default)]
    pub features: Vec<Feature>,
}

impl Specification {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            status: SpecStatus::Prototype,
            features: Vec::new(),
        }
    }

    /// Whether the specification can be approved: non-empty body and at least
    /// one feature.
    pub fn is_approvable(&self) -> bool {
        !self.body.trim().is_empty() && !self.features.is_empty()
    }

    /// Features the analyzer has not yet consumed.
    pub fn new_features(&self) -> Vec<&Feature> {
        self.features
            .iter()
            .filter(|f| f.status == FeatureStatus::New)
            .collect()
    }

    pub fn feature_mut(&mut self, id: &str) -> Option<&mut Feature> {
        self.features.iter_mut().find(|f| f.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approvable_requires_body_and_feature() {
        let mut spec = Specification::new("");
        assert!(!spec.is_approvable());

        spec.body = "Build a CLI".to_string();
        assert!(!spec.is_approvable());

        spec.features.push(Feature::new("greet", "print a greeting"));
        assert!(spec.is_approvable());
    }

    #[test]
    fn test_feature_status_never_regresses_from_completed() {
        let mut feature = Feature::new("greet", "print a greeting");
        feature.set_status(FeatureStatus::Completed);
        feature.set_status(FeatureStatus::InProgress);
        assert_eq!(feature.status, FeatureStatus::Completed);
    }

    #[test]
    fn test_new_features_filters_consumed() {
        let mut spec = Specification::new("body");
        spec.features.push(Feature::new("a", "first"));
        let mut consumed = Feature::new("b", "second");
        consumed.set_status(FeatureStatus::AssignedToAnalyzer);
        spec.features.push(consumed);

        let fresh = spec.new_features();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].name, "a");
    }
}
