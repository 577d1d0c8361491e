//! Embedded prompt templates.
//!
//! Templates are compiled into the binary from `prompts/*.pmt` and rendered
//! by plain `{{key}}` replacement.

mod embedded;

pub use embedded::{get_embedded, render, CONFIG_OVERSEER, DRAGON, GIT_OPERATOR, IMPORTER, KOBOLD, PLANNER,
    SPEC_MANAGER, STRUCTURE, WYVERN};
