//! Supervisor (Drake): per-area task execution.

mod drake;
mod features;

pub use drake::{Drake, DrakeConfig, SessionHooks, TickReport};
pub use features::{sync_features, ProjectRollup};
