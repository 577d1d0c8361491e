//! Background pipeline: drivers and execution control.

pub mod control;
mod drivers;

pub use drivers::{AnalyzerDriver, AttachmentRegistry, SupervisorDriver};
