//! Worker (Kobold): task-scoped code-generation agents.

mod kobold;
mod plan;

pub use kobold::{Kobold, KoboldOutcome};
pub use plan::{parse_plan_steps, Plan, PlanStep};
