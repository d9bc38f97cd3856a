//! Readiness & conflict gatekeeper

pub mod conflict;
pub mod core;
pub mod readiness;

pub use conflict::{ConflictClass, ConflictKind, ImpactConflict, can_run_parallel, conflict_details};
pub use core::Gatekeeper;
pub use readiness::{Dimension, DimensionScore, READY_THRESHOLD, ReadinessReport, score_task};
