//! Cascade propagator

pub mod propagator;
pub mod types;

pub use propagator::CascadePropagator;
pub use types::{
    AppliedCascade, CASCADE_MAX_DEPTH, CascadeEffect, CascadeReport, ChangeKind, EffectAction, TaskChange,
};
