//! Domain entities: projects, specifications, analyses, tasks, workers.
//!
//! Entities reference each other by identifier, never by pointer; resolution
//! goes through the store.

mod analysis;
mod id;
mod priority;
mod project;
mod spec;
mod task;
mod worker;

pub use analysis::{Analysis, AnalysisError, AnalyzedTask, Area};
pub use id::{generate_id, short_id, slugify};
pub use priority::Priority;
pub use project::{name_taken, AgentConfig, Project, ProjectStatus};
pub use spec::{Feature, FeatureStatus, SpecStatus, Specification};
pub use task::{TaskRecord, TaskStatus};
pub use worker::{WorkerRecord, WorkerStatus};
