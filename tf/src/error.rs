//! Core error taxonomy
//!
//! Kinds, not exception types: every failure surfaced by the core is one of
//! these. Recovery is local for the first five; `SpawnFailed` and
//! `WorkerTimeout` are recorded as task failures and enter the failure
//! engine; `StorageUnavailable` aborts the in-flight handler and discards
//! its buffered writes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Dependency cycle detected: {}", cycle.join(" -> "))]
    CycleDetected { cycle: Vec<String> },

    #[error("Blocking conflict between {task_a} and {task_b} on {target}")]
    ConflictBlocking {
        task_a: String,
        task_b: String,
        target: String,
    },

    #[error("Readiness {score} below threshold; missing: {}", missing.join(", "))]
    ReadinessBelowThreshold { score: u8, missing: Vec<String> },

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Worker {0} timed out after missed heartbeats")]
    WorkerTimeout(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_display() {
        let err = CoreError::CycleDetected {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle detected: a -> b -> a");
    }

    #[test]
    fn test_readiness_error_display() {
        let err = CoreError::ReadinessBelowThreshold {
            score: 45,
            missing: vec!["Missing test_context appendix".into()],
        };
        assert!(err.to_string().contains("45"));
        assert!(err.to_string().contains("test_context"));
    }
}
