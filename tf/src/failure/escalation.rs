//! Escalation to the external inspection agent
//!
//! When a task stops making progress the engine assembles a diagnosis
//! bundle and hands it to an opaque inspector. The inspector's return value
//! is recorded but never interpreted; the task is not retried until the
//! escalation returns.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use workstore::now_ms;

use crate::domain::{AppendixBody, ImpactKind, Task, WorkerInstance};
use crate::state::{StateError, StateManager};

/// Recent executions included in the bundle
const MAX_EXECUTIONS: usize = 5;

/// Distinct error messages included in the bundle
const MAX_ERRORS: usize = 10;

/// Gotcha knowledge entries included in the bundle
const MAX_GOTCHAS: usize = 5;

/// Everything the inspection agent gets to see
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisBundle {
    pub task: Task,
    /// Up to five most recent execution records, newest first
    pub recent_executions: Vec<WorkerInstance>,
    /// Up to ten distinct error messages, newest first
    pub distinct_errors: Vec<String>,
    /// Gotcha knowledge entries keyed by the task's highest-confidence
    /// file impact
    pub gotchas: Vec<String>,
    pub assembled_at: i64,
}

/// The external inspection agent, seen from the core
#[async_trait]
pub trait Inspector: Send + Sync {
    /// Diagnose a stuck task; the returned string is recorded verbatim
    async fn inspect(&self, bundle: &DiagnosisBundle) -> eyre::Result<String>;
}

/// Default inspector: logs the bundle and acknowledges
pub struct LoggingInspector;

#[async_trait]
impl Inspector for LoggingInspector {
    async fn inspect(&self, bundle: &DiagnosisBundle) -> eyre::Result<String> {
        warn!(
            task_id = %bundle.task.id,
            failures = bundle.task.consecutive_failures,
            executions = bundle.recent_executions.len(),
            errors = bundle.distinct_errors.len(),
            "Escalated task handed to inspector"
        );
        Ok(format!("acknowledged {}", bundle.task.id))
    }
}

/// Assembles diagnosis bundles and records the handoff
pub struct Escalator {
    state: StateManager,
    inspector: Arc<dyn Inspector>,
}

impl Escalator {
    pub fn new(state: StateManager, inspector: Arc<dyn Inspector>) -> Self {
        Self { state, inspector }
    }

    /// Build the diagnosis bundle for a task
    pub async fn assemble_bundle(&self, task_id: &str) -> Result<DiagnosisBundle, StateError> {
        let task = self.state.get_task_required(task_id).await?;
        let recent_executions = self.state.recent_workers_for_task(task_id, MAX_EXECUTIONS).await?;
        let distinct_errors = self.state.distinct_errors_for_task(task_id, MAX_ERRORS).await?;

        // Gotchas are keyed by the highest-confidence file impact
        let mut gotchas = Vec::new();
        let best_file_impact = self
            .state
            .list_impacts(task_id)
            .await?
            .into_iter()
            .find(|i| i.kind == ImpactKind::File);
        if let Some(impact) = best_file_impact {
            for appendix in self.state.gotchas_for_target(&impact.target, MAX_GOTCHAS).await? {
                if let AppendixBody::Inline { content } = appendix.body {
                    gotchas.push(content);
                }
            }
        }

        Ok(DiagnosisBundle {
            task,
            recent_executions,
            distinct_errors,
            gotchas,
            assembled_at: now_ms(),
        })
    }

    /// Escalate a task: set its flag, hand the bundle to the inspector, and
    /// record whatever comes back. Already-escalated tasks are left alone.
    pub async fn escalate(&self, task_id: &str) -> Result<Option<DiagnosisBundle>, StateError> {
        let mut task = self.state.get_task_required(task_id).await?;
        if task.escalated {
            return Ok(None);
        }

        let bundle = self.assemble_bundle(task_id).await?;

        task.mark_escalated();
        self.state.update_task(task, "escalated to inspector").await?;

        match self.inspector.inspect(&bundle).await {
            Ok(verdict) => {
                self.state.notify(task_id, "escalation", &verdict).await?;
                info!(task_id, "Escalation recorded");
            }
            Err(e) => {
                warn!(task_id, error = %e, "Inspector failed");
                self.state
                    .notify(task_id, "escalation_failed", &e.to_string())
                    .await?;
            }
        }

        Ok(Some(bundle))
    }
}
