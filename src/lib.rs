//! Dracode - multi-agent orchestration runtime.
//!
//! A user converses with a Dragon (conversation agent) to produce a project
//! specification; a background pipeline decomposes it with a Wyvern
//! (analyzer) into a dependency-ordered task graph, assigns tasks through
//! Drakes (per-area supervisors) to Kobolds (task-scoped workers), enforces
//! per-project worker limits, and persists every transition so the pipeline
//! survives restarts.
//!
//! # Modules
//!
//! - [`llm`] - provider adapters behind the [`llm::LlmProvider`] capability
//! - [`agent`] - the turn execution loop
//! - [`tools`] - tool registry, sandboxing and built-in tools
//! - [`prompt`] - the interactive prompt rendezvous
//! - [`analyzer`], [`supervisor`], [`worker`] - the Wyvern/Drake/Kobold pipeline
//! - [`council`] - the Dragon and its delegated sub-agents
//! - [`pipeline`] - periodic drivers and execution control
//! - [`governor`] - per-project concurrency caps
//! - [`store`], [`tracker`] - persistent state
//! - [`transport`] - the session-oriented duplex channel

pub mod agent;
pub mod analyzer;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod council;
pub mod domain;
pub mod governor;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod prompts;
pub mod runtime;
pub mod store;
pub mod supervisor;
pub mod tools;
pub mod tracker;
pub mod transport;
pub mod worker;

pub use agent::{Agent, AgentEvent, AgentOptions, TurnOutcome};
pub use cancel::CancelToken;
pub use config::Config;
pub use domain::{
    Analysis, AnalyzedTask, Area, Feature, FeatureStatus, Priority, Project, ProjectStatus, SpecStatus,
    Specification, TaskRecord, TaskStatus, WorkerRecord, WorkerStatus,
};
pub use governor::Governor;
pub use llm::{CompletionRequest, CompletionResponse, LlmError, LlmProvider};
pub use prompt::{PromptBroker, PromptOutcome};
pub use store::{ProjectStore, StoreError};
pub use tracker::{TrackerError, TrackerFile};
