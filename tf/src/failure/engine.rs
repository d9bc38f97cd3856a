//! Failure classification and retry decisions
//!
//! Classification is a pure function of the error message and exit signal.
//! The consecutive-failure counter lives on the task and moves exactly once
//! per failure event; a (worker, error-hash) guard absorbs replays.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{Task, TaskStatus, WorkerInstance};
use crate::state::{StateError, StateManager, Transition};

use super::escalation::{Escalator, Inspector};

/// Consecutive failures that trigger escalation
pub const ESCALATION_THRESHOLD: u32 = 3;

/// Immediate-retry budget for syntax and test failures
const IMMEDIATE_RETRY_LIMIT: u32 = 2;

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransientNetwork,
    RateLimit,
    Syntax,
    TestFailure,
    Timeout,
    ResourceExhausted,
    DependencyMissing,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TransientNetwork => "transient_network",
            Self::RateLimit => "rate_limit",
            Self::Syntax => "syntax",
            Self::TestFailure => "test_failure",
            Self::Timeout => "timeout",
            Self::ResourceExhausted => "resource_exhausted",
            Self::DependencyMissing => "dependency_missing",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Classify a failure from its error message and exit signal. Deterministic.
pub fn classify(message: &str, signal: Option<&str>) -> ErrorKind {
    if let Some(signal) = signal {
        // The OOM killer delivers SIGKILL; everything else falls through to
        // the message heuristics
        if signal.eq_ignore_ascii_case("SIGKILL") || signal.eq_ignore_ascii_case("KILL") {
            return ErrorKind::ResourceExhausted;
        }
    }

    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") || lower.contains("too many requests") {
        ErrorKind::RateLimit
    } else if lower.contains("timeout") || lower.contains("timed out") || lower.contains("deadline") {
        ErrorKind::Timeout
    } else if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("econnrefused")
        || lower.contains("connection reset")
    {
        ErrorKind::TransientNetwork
    } else if lower.contains("out of memory")
        || lower.contains("disk full")
        || lower.contains("no space left")
        || lower.contains("resource exhausted")
    {
        ErrorKind::ResourceExhausted
    } else if lower.contains("syntax") || lower.contains("parse error") || lower.contains("unexpected token") {
        ErrorKind::Syntax
    } else if lower.contains("test failed")
        || lower.contains("tests failed")
        || lower.contains("assertion")
        || lower.contains("test result: failed")
    {
        ErrorKind::TestFailure
    } else if lower.contains("cannot find")
        || lower.contains("unresolved import")
        || lower.contains("module not found")
        || lower.contains("dependency missing")
        || lower.contains("no such file")
    {
        ErrorKind::DependencyMissing
    } else {
        ErrorKind::Unknown
    }
}

/// What to do about a newly recorded failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDecision {
    RetryNow,
    RetryWithBackoff(Duration),
    Escalate,
    Abandon,
}

/// Exponential backoff with a kind-specific cap and jitter
fn backoff_delay(kind: ErrorKind, attempt: u32) -> Duration {
    let cap = match kind {
        ErrorKind::TransientNetwork => Duration::from_secs(60),
        ErrorKind::RateLimit => Duration::from_secs(300),
        _ => Duration::from_secs(120),
    };
    let base = Duration::from_secs(2u64.saturating_pow(attempt.min(16)));
    let jitter = Duration::from_millis(rand::rng().random_range(0..500));
    base.min(cap) + jitter
}

/// The decision rule of the failure engine.
///
/// Transient/rate-limit failures back off exponentially; syntax and test
/// failures retry immediately up to two attempts; any kind escalates at
/// three consecutive failures; a task whose escalation already returned
/// without resolution is abandoned.
pub fn decide(kind: ErrorKind, consecutive_failures: u32, already_escalated: bool) -> FailureDecision {
    if already_escalated {
        return FailureDecision::Abandon;
    }
    if consecutive_failures >= ESCALATION_THRESHOLD {
        return FailureDecision::Escalate;
    }
    match kind {
        ErrorKind::TransientNetwork | ErrorKind::RateLimit => {
            FailureDecision::RetryWithBackoff(backoff_delay(kind, consecutive_failures))
        }
        ErrorKind::Syntax | ErrorKind::TestFailure if consecutive_failures <= IMMEDIATE_RETRY_LIMIT => {
            FailureDecision::RetryNow
        }
        other => FailureDecision::RetryWithBackoff(backoff_delay(other, consecutive_failures)),
    }
}

/// FNV-1a over the worker id and error message; the unique-index-style
/// guard against double-counting a replayed failure event
pub fn error_hash(worker_id: &str, message: &str) -> String {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for byte in worker_id.bytes().chain([0u8]).chain(message.bytes()) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{:016x}", hash)
}

/// Outcome of absorbing one worker failure
#[derive(Debug)]
pub struct FailureOutcome {
    pub task: Task,
    pub kind: ErrorKind,
    pub decision: FailureDecision,
    /// Same-list pending tasks transitively blocked by this failure
    pub blocked: Vec<String>,
    /// True when this event was a replay and nothing was counted
    pub duplicate: bool,
}

/// Failure & escalation engine
pub struct FailureEngine {
    state: StateManager,
    escalator: Escalator,
}

impl FailureEngine {
    pub fn new(state: StateManager, inspector: std::sync::Arc<dyn Inspector>) -> Self {
        Self {
            escalator: Escalator::new(state.clone(), inspector),
            state,
        }
    }

    /// Absorb a worker failure: count it (exactly once), mark the task
    /// failed, block its transitive dependents within the list, and decide
    /// the follow-up. The caller re-runs the ready-task rescan afterwards so
    /// untouched leaves keep executing.
    pub async fn record_failure(
        &self,
        worker: &WorkerInstance,
        error_message: &str,
        signal: Option<&str>,
    ) -> Result<FailureOutcome, StateError> {
        let task_id = worker
            .task_id
            .clone()
            .ok_or_else(|| StateError::Precondition(format!("Worker {} has no task", worker.id)))?;

        let hash = error_hash(&worker.id, error_message);
        let mut worker = self.state.get_worker_required(&worker.id).await?;
        let duplicate = worker.last_error_hash.as_deref() == Some(hash.as_str());

        worker.last_error = Some(error_message.to_string());
        worker.last_error_hash = Some(hash);
        if !duplicate {
            worker.tasks_failed += 1;
        }
        self.state.update_worker(worker.clone()).await?;

        let mut task = self.state.get_task_required(&task_id).await?;
        if !duplicate {
            task.consecutive_failures += 1;
        }
        task.set_error(error_message);
        self.state.update_task(task.clone(), "worker failure").await?;

        if task.status != TaskStatus::Failed {
            task = self
                .state
                .transition_task(
                    Transition::new(&task_id, TaskStatus::Failed).with_reason(error_message.to_string()),
                )
                .await?;
        }

        let kind = classify(error_message, signal);
        let decision = decide(kind, task.consecutive_failures, task.escalated);
        info!(
            task_id = %task_id,
            kind = %kind,
            failures = task.consecutive_failures,
            ?decision,
            duplicate,
            "Recorded worker failure"
        );

        let blocked = match &task.task_list_id {
            Some(list_id) => self.block_dependents(&task_id, list_id).await?,
            None => Vec::new(),
        };

        if decision == FailureDecision::Escalate {
            self.escalator.escalate(&task_id).await?;
            task = self.state.get_task_required(&task_id).await?;
        }

        Ok(FailureOutcome {
            task,
            kind,
            decision,
            blocked,
            duplicate,
        })
    }

    /// Mark the transitive pending dependents of a failed task as blocked,
    /// carrying a reference to the failing ancestor. Other lists and tasks
    /// already in progress are untouched.
    pub async fn block_dependents(&self, failed_task: &str, list_id: &str) -> Result<Vec<String>, StateError> {
        let dependents = self.state.pending_dependents_closure(failed_task, list_id).await?;

        for dependent in &dependents {
            let mut task = self
                .state
                .transition_task(
                    Transition::new(dependent, TaskStatus::Blocked)
                        .with_reason(format!("Dependency {} failed", failed_task)),
                )
                .await?;
            task.blocked_by = Some(failed_task.to_string());
            self.state.update_task(task, "blocked by failed dependency").await?;
            debug!(task_id = %dependent, blocked_by = %failed_task, "Blocked dependent");
        }

        if !dependents.is_empty() {
            warn!(failed_task, count = dependents.len(), "Blocked transitive dependents");
        }
        Ok(dependents)
    }

    /// Reset the counter on a successful completion
    pub async fn record_success(&self, task_id: &str) -> Result<(), StateError> {
        let mut task = self.state.get_task_required(task_id).await?;
        if task.consecutive_failures != 0 || task.last_error.is_some() {
            task.consecutive_failures = 0;
            task.last_error = None;
            self.state.update_task(task, "completed; failure counter reset").await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(classify("connection reset by peer", None), ErrorKind::TransientNetwork);
        }
    }

    #[test]
    fn test_classification_kinds() {
        assert_eq!(classify("HTTP 429 too many requests", None), ErrorKind::RateLimit);
        assert_eq!(classify("operation timed out", None), ErrorKind::Timeout);
        assert_eq!(classify("syntax error near line 3", None), ErrorKind::Syntax);
        assert_eq!(classify("2 tests failed", None), ErrorKind::TestFailure);
        assert_eq!(classify("no space left on device", None), ErrorKind::ResourceExhausted);
        assert_eq!(classify("cannot find module 'auth'", None), ErrorKind::DependencyMissing);
        assert_eq!(classify("something odd happened", None), ErrorKind::Unknown);
    }

    #[test]
    fn test_sigkill_classified_as_resource_exhausted() {
        assert_eq!(classify("worker died", Some("SIGKILL")), ErrorKind::ResourceExhausted);
        // Other signals fall through to message heuristics
        assert_eq!(classify("worker died", Some("SIGTERM")), ErrorKind::Unknown);
    }

    #[test]
    fn test_decision_rules() {
        // Syntax and test failures retry immediately while under the budget
        assert_eq!(decide(ErrorKind::Syntax, 1, false), FailureDecision::RetryNow);
        assert_eq!(decide(ErrorKind::TestFailure, 2, false), FailureDecision::RetryNow);

        // Transient kinds back off
        assert!(matches!(
            decide(ErrorKind::TransientNetwork, 1, false),
            FailureDecision::RetryWithBackoff(_)
        ));
        assert!(matches!(
            decide(ErrorKind::RateLimit, 2, false),
            FailureDecision::RetryWithBackoff(_)
        ));

        // Any kind escalates at three
        assert_eq!(decide(ErrorKind::Syntax, 3, false), FailureDecision::Escalate);
        assert_eq!(decide(ErrorKind::Unknown, 5, false), FailureDecision::Escalate);

        // Post-escalation failures abandon
        assert_eq!(decide(ErrorKind::Timeout, 4, true), FailureDecision::Abandon);
    }

    #[test]
    fn test_backoff_respects_caps() {
        for attempt in 0..20 {
            if let FailureDecision::RetryWithBackoff(delay) = decide(ErrorKind::TransientNetwork, attempt % 3, false) {
                assert!(delay <= Duration::from_secs(61));
            }
            if let FailureDecision::RetryWithBackoff(delay) = decide(ErrorKind::RateLimit, attempt % 3, false) {
                assert!(delay <= Duration::from_secs(301));
            }
        }
    }

    #[test]
    fn test_error_hash_stability() {
        let a = error_hash("worker-1", "timeout");
        let b = error_hash("worker-1", "timeout");
        assert_eq!(a, b);
        assert_ne!(a, error_hash("worker-1", "other"));
        assert_ne!(a, error_hash("worker-2", "timeout"));
    }

    #[tokio::test]
    async fn test_counter_resets_on_success() {
        use crate::domain::{Task, TaskList};

        let state = StateManager::spawn_in_memory().unwrap();
        state.create_list(TaskList::with_id("list-1", "L")).await.unwrap();
        state
            .create_task(Task::with_id("t-1", "Flaky", "list-1"))
            .await
            .unwrap();
        let engine = FailureEngine::new(state.clone(), std::sync::Arc::new(super::super::LoggingInspector));

        let mut worker = WorkerInstance::new("t-1", "list-1");
        worker.mark_running(100);
        state.create_worker(worker.clone()).await.unwrap();
        engine.record_failure(&worker, "tests failed", None).await.unwrap();
        assert_eq!(state.get_task_required("t-1").await.unwrap().consecutive_failures, 1);

        engine.record_success("t-1").await.unwrap();
        let task = state.get_task_required("t-1").await.unwrap();
        assert_eq!(task.consecutive_failures, 0);
        assert!(task.last_error.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_failure_not_double_counted() {
        use crate::domain::{Task, TaskList};

        let state = StateManager::spawn_in_memory().unwrap();
        state.create_list(TaskList::with_id("list-1", "L")).await.unwrap();
        state
            .create_task(Task::with_id("t-1", "Flaky", "list-1"))
            .await
            .unwrap();
        let engine = FailureEngine::new(state.clone(), std::sync::Arc::new(super::super::LoggingInspector));

        let mut worker = WorkerInstance::new("t-1", "list-1");
        worker.mark_running(100);
        state.create_worker(worker.clone()).await.unwrap();

        // Same worker, same error: the replay only touches timestamps
        let first = engine.record_failure(&worker, "timeout", None).await.unwrap();
        let second = engine.record_failure(&worker, "timeout", None).await.unwrap();
        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(state.get_task_required("t-1").await.unwrap().consecutive_failures, 1);

        // A different error from the same worker counts again
        let third = engine.record_failure(&worker, "syntax error", None).await.unwrap();
        assert!(!third.duplicate);
        assert_eq!(state.get_task_required("t-1").await.unwrap().consecutive_failures, 2);
    }
}
