//! Domain types for the orchestration core

pub mod appendix;
pub mod id;
pub mod impact;
pub mod list;
pub mod prd;
pub mod relationship;
pub mod task;
pub mod version;
pub mod worker;

pub use appendix::{Appendix, AppendixBody, AppendixKind};
pub use id::{generate_display_id, generate_id};
pub use impact::{Impact, ImpactKind, ImpactOp, Provenance};
pub use list::{ListStatus, TaskList};
pub use prd::{Prd, PrdCoverage, PrdLink, calculate_coverage};
pub use relationship::{RelationKind, Relationship};
pub use task::{Effort, Priority, Task, TaskCategory, TaskStatus};
pub use version::{ActorKind, FieldChange, StateHistoryEntry, TaskVersion};
pub use worker::{Heartbeat, WorkerInstance, WorkerStatus};
