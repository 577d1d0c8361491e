//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dracode - multi-agent orchestration runtime
#[derive(Parser)]
#[command(
    name = "dracode",
    about = "Dragon/Wyvern/Drake/Kobold pipeline for LLM-driven project execution",
    version = env!("CARGO_PKG_VERSION")
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Run the runtime in the foreground (drivers + transport)
    Start,

    /// Show project counts per status
    Status,

    /// List projects
    Projects,

    /// Pause an in-progress project
    Pause {
        /// Project id or name
        project: String,
    },

    /// Resume a paused or suspended project
    Resume {
        /// Project id or name
        project: String,
    },

    /// Suspend an in-progress project
    Suspend {
        /// Project id or name
        project: String,
    },

    /// Cancel a project (terminal)
    Cancel {
        /// Project id or name
        project: String,
    },

    /// Reset a failed project for re-analysis
    Retry {
        /// Project id or name
        project: String,

        /// Also return failed tasks to the pool
        #[arg(long)]
        tasks: bool,
    },
}
