//! Taskforge - task orchestration core
//!
//! Executes a directed acyclic graph of coding tasks in parallel by spawning
//! one short-lived worker process per task, supervising liveness through
//! heartbeats, coordinating wave-based execution under dependency and
//! file-conflict constraints, and propagating the consequences of task edits
//! and failures through the rest of the graph.
//!
//! # Subsystems
//!
//! - [`planner`] - dependency waves and per-wave concurrency limits
//! - [`supervisor`] - spawns, heartbeats, and reaps worker processes
//! - [`failure`] - failure classification, transitive blocking, escalation
//! - [`gatekeeper`] - atomicity scoring and the file-conflict matrix
//! - [`cascade`] - consequences of task mutations
//! - [`state`] - the StateManager actor over the row store
//! - [`domain`] - the data model
//! - [`events`] - broadcast bus for orchestrator activity

pub mod cascade;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod events;
pub mod failure;
pub mod gatekeeper;
pub mod planner;
pub mod state;
pub mod supervisor;

// Re-export commonly used types
pub use cascade::{CascadeEffect, CascadePropagator, CascadeReport, ChangeKind, EffectAction, TaskChange};
pub use config::Config;
pub use domain::{
    Appendix, AppendixKind, Effort, Heartbeat, Impact, ImpactKind, ImpactOp, Priority, Task, TaskCategory,
    TaskList, TaskStatus, WorkerInstance, WorkerStatus,
};
pub use error::{CoreError, CoreResult};
pub use events::{Event, EventBus};
pub use failure::{DiagnosisBundle, ErrorKind, FailureDecision, FailureEngine, Inspector, LoggingInspector};
pub use gatekeeper::{Gatekeeper, ReadinessReport};
pub use planner::{ExecutionPlan, Wave};
pub use state::{StateError, StateManager, Transition};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorHandle};
