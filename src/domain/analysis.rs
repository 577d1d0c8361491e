//! Analysis: the dependency-ordered task graph produced by the Wyvern.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::priority::Priority;

/// Graph validation failures. Never retried; the analysis is rejected.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Dependency cycle involving task '{0}'")]
    Cycle(String),

    #[error("Task '{task}' depends on unknown task '{dep}'")]
    DanglingDependency { task: String, dep: String },

    #[error("Task '{task}' has level {actual}, expected {expected}")]
    LevelMismatch { task: String, actual: u32, expected: u32 },

    #[error("Duplicate task id '{0}'")]
    DuplicateTask(String),

    #[error("Analysis has no areas")]
    Empty,
}

/// A task as produced by the analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedTask {
    /// Identifier of the form `<area>-<n>`.
    pub id: String,

    pub name: String,
    pub description: String,

    /// Task ids this task depends on (cross-area permitted).
    #[serde(default)]
    pub deps: Vec<String>,

    /// Longest path from a dependency-less root; 0 for roots.
    #[serde(default)]
    pub level: u32,

    /// Recommended worker specialization tag.
    #[serde(default)]
    pub specialization: Option<String>,

    #[serde(default)]
    pub priority: Priority,

    /// Feature this task implements, when the analyzer says so.
    #[serde(default, rename = "feature")]
    pub feature_id: Option<String>,
}

/// A named partition of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub name: String,
    pub tasks: Vec<AnalyzedTask>,
}

/// One project's task graph snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub project_name: String,

    #[serde(default)]
    pub total_tasks: usize,

    pub areas: Vec<Area>,

    /// File-structure conventions inferred by the optional second pass.
    #[serde(default)]
    pub structure: Option<String>,
}

impl Analysis {
    /// Iterate all tasks across areas.
    pub fn tasks(&self) -> impl Iterator<Item = &AnalyzedTask> {
        self.areas.iter().flat_map(|a| a.tasks.iter())
    }

    /// Look up a task by id.
    pub fn task(&self, id: &str) -> Option<&AnalyzedTask> {
        self.tasks().find(|t| t.id == id)
    }

    /// Validate the graph: unique ids, resolvable dependencies, no cycles,
    /// levels consistent with `level = 1 + max(level(dep))`.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.areas.is_empty() {
            return Err(AnalysisError::Empty);
        }

        let mut ids = HashSet::new();
        for task in self.tasks() {
            if !ids.insert(task.id.as_str()) {
                return Err(AnalysisError::DuplicateTask(task.id.clone()));
            }
        }

        for task in self.tasks() {
            for dep in &task.deps {
                if !ids.contains(dep.as_str()) {
                    return Err(AnalysisError::DanglingDependency {
                        task: task.id.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }

        let levels = self.compute_levels()?;
        for task in self.tasks() {
            let expected = levels[task.id.as_str()];
            if task.level != expected {
                return Err(AnalysisError::LevelMismatch {
                    task: task.id.clone(),
                    actual: task.level,
                    expected,
                });
            }
        }

        Ok(())
    }

    /// Recompute dependency levels, detecting cycles along the way.
    pub fn compute_levels(&self) -> Result<HashMap<&str, u32>, AnalysisError> {
        let by_id: HashMap<&str, &AnalyzedTask> = self.tasks().map(|t| (t.id.as_str(), t)).collect();

        let mut levels: HashMap<&str, u32> = HashMap::new();
        let mut visiting: HashSet<&str> = HashSet::new();

        fn visit<'a>(
            id: &'a str,
            by_id: &HashMap<&'a str, &'a AnalyzedTask>,
            levels: &mut HashMap<&'a str, u32>,
            visiting: &mut HashSet<&'a str>,
        ) -> Result<u32, AnalysisError> {
            if let Some(level) = levels.get(id) {
                return Ok(*level);
            }
            if !visiting.insert(id) {
                return Err(AnalysisError::Cycle(id.to_string()));
            }

            let task = by_id[id];
            let mut level = 0;
            for dep in &task.deps {
                if !by_id.contains_key(dep.as_str()) {
                    return Err(AnalysisError::DanglingDependency {
                        task: task.id.clone(),
                        dep: dep.clone(),
                    });
                }
                let dep_level = visit(dep.as_str(), by_id, levels, visiting)?;
                level = level.max(dep_level + 1);
            }

            visiting.remove(id);
            levels.insert(id, level);
            Ok(level)
        }

        for id in by_id.keys() {
            visit(id, &by_id, &mut levels, &mut visiting)?;
        }

        Ok(levels)
    }

    /// Overwrite levels with recomputed values and fix total_tasks.
    pub fn normalize(&mut self) -> Result<(), AnalysisError> {
        let levels: HashMap<String, u32> = self
            .compute_levels()?
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        for area in &mut self.areas {
            for task in &mut area.tasks {
                task.level = levels[&task.id];
            }
        }
        self.total_tasks = self.areas.iter().map(|a| a.tasks.len()).sum();
        Ok(())
    }
}
