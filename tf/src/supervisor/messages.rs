//! Supervisor event queue
//!
//! The supervisor's main loop consumes exactly these typed events; each
//! handler runs to completion and ends with a commit flush.

use tokio::sync::oneshot;

use crate::domain::{Heartbeat, WorkerInstance};
use crate::error::CoreResult;
use crate::planner::ExecutionPlan;

/// Events consumed by the supervisor loop
#[derive(Debug)]
pub enum SupervisorEvent {
    /// Spawn a worker for a pending task
    SpawnRequest {
        task_id: String,
        list_id: String,
        resume_of: Option<String>,
        reply: oneshot::Sender<CoreResult<String>>,
    },

    /// Plan a list and start wave 0
    StartExecution {
        list_id: String,
        cap: Option<u32>,
        reply: oneshot::Sender<CoreResult<ExecutionPlan>>,
    },

    /// Stop spawning new waves; running workers keep going
    PauseExecution {
        list_id: String,
        reply: oneshot::Sender<CoreResult<()>>,
    },

    /// Resume spawning and rescan for ready tasks
    ResumeExecution {
        list_id: String,
        reply: oneshot::Sender<CoreResult<()>>,
    },

    /// A worker heartbeat landed
    Heartbeat {
        heartbeat: Heartbeat,
        reply: oneshot::Sender<CoreResult<bool>>,
    },

    /// OS exit notification for a worker process
    WorkerExit {
        worker_id: String,
        exit_code: Option<i32>,
        signal: Option<String>,
    },

    /// Periodic liveness check
    MonitorTick,

    /// A task was edited: invalidate cached analyses and rescan
    EditNotification { task_id: String },

    /// Best-effort SIGTERM and row cleanup
    Terminate {
        worker_id: String,
        reason: String,
        reply: oneshot::Sender<CoreResult<()>>,
    },

    /// Reset a task and spawn a fresh worker resuming from the previous
    /// execution
    RetryWithContext {
        task_id: String,
        list_id: String,
        reply: oneshot::Sender<CoreResult<String>>,
    },

    /// Read-only queries
    GetActiveWorkers {
        list_id: Option<String>,
        reply: oneshot::Sender<CoreResult<Vec<WorkerInstance>>>,
    },
    GetWorker {
        worker_id: String,
        reply: oneshot::Sender<CoreResult<Option<WorkerInstance>>>,
    },

    Shutdown,
}
