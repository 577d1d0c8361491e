//! Analyzer (Wyvern): specification to task graph.

mod wyvern;

pub use wyvern::{parse_analysis, Wyvern, WyvernError};
