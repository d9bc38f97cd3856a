//! Failure & escalation engine

pub mod engine;
pub mod escalation;

pub use engine::{
    ErrorKind, ESCALATION_THRESHOLD, FailureDecision, FailureEngine, FailureOutcome, classify, decide, error_hash,
};
pub use escalation::{DiagnosisBundle, Escalator, Inspector, LoggingInspector};
