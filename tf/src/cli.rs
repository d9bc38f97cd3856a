//! Command-line interface definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Task orchestration daemon
#[derive(Debug, Parser)]
#[command(name = "tf", version, about = "Taskforge - task orchestration core")]
pub struct Cli {
    /// Path to a config file (overrides the lookup chain)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the orchestrator daemon
    Start,

    /// Stop the orchestrator daemon
    Stop,

    /// Show daemon and store status
    Status,

    /// Run the daemon loop in the foreground (used internally by `start`)
    #[command(hide = true)]
    RunDaemon,

    /// Compute and print the execution plan for a list
    Plan {
        /// Task list identifier
        list_id: String,
    },

    /// Score a task against the six atomicity dimensions
    Readiness {
        /// Task identifier
        task_id: String,
    },

    /// Show the conflict matrix outcome for two tasks
    Conflicts {
        task_a: String,
        task_b: String,
    },

    /// Start executing a list (plans waves and spawns wave 0)
    Exec {
        list_id: String,
        /// Override the list's max concurrent workers
        #[arg(long)]
        cap: Option<u32>,
    },

    /// Pause a list (running workers finish, no new spawns)
    Pause { list_id: String },

    /// Resume a paused list
    Resume { list_id: String },

    /// Report PRD requirement coverage
    Coverage {
        /// PRD identifier
        prd_id: String,
    },
}
