//! Persisted worker plans.
//!
//! When planning is enabled, a Kobold first asks the planner for an ordered
//! list of atomic steps and persists it as `plans/<task-id>.plan.json`. On
//! restart an existing plan resumes from the first step with no completion
//! marker.

use serde::{Deserialize, Serialize};

/// One atomic step of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,

    #[serde(default)]
    pub completed: bool,
}

/// A plan for one task, versioned by task identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub task_id: String,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(task_id: impl Into<String>, steps: Vec<PlanStep>) -> Self {
        Self {
            task_id: task_id.into(),
            steps,
        }
    }

    /// Index of the first step with no completion marker.
    pub fn next_step(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.completed)
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.completed)
    }
}

/// Parse planner output into steps, tolerating fences and prose around the
/// JSON array.
pub fn parse_plan_steps(text: &str) -> Option<Vec<PlanStep>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }

    let steps: Vec<PlanStep> = serde_json::from_str(&text[start..=end]).ok()?;
    if steps.is_empty() {
        None
    } else {
        Some(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_step_and_completion() {
        let mut plan = Plan::new(
            "backend-1",
            vec![
                PlanStep {
                    description: "step one".to_string(),
                    completed: true,
                },
                PlanStep {
                    description: "step two".to_string(),
                    completed: false,
                },
            ],
        );

        assert_eq!(plan.next_step(), Some(1));
        assert!(!plan.is_complete());

        plan.steps[1].completed = true;
        assert_eq!(plan.next_step(), None);
        assert!(plan.is_complete());
    }

    #[test]
    fn test_parse_plan_steps() {
        let text = "Here is the plan:\n```json\n[{\"description\": \"create main.rs\"}]\n```";
        let steps = parse_plan_steps(text).unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].description, "create main.rs");
        assert!(!steps[0].completed);
    }

    #[test]
    fn test_parse_plan_rejects_garbage() {
        assert!(parse_plan_steps("no array here").is_none());
        assert!(parse_plan_steps("[]").is_none());
    }
}
