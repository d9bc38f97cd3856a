//! State manager messages
//!
//! Commands and responses for the actor pattern.

use tokio::sync::oneshot;

use thiserror::Error;

use crate::domain::{
    Appendix, AppendixKind, Heartbeat, Impact, Prd, PrdCoverage, PrdLink, StateHistoryEntry, Task, TaskList,
    TaskStatus, TaskVersion, WorkerInstance,
};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

impl From<StateError> for crate::error::CoreError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(what) => Self::NotFound(what),
            StateError::Precondition(what) => Self::PreconditionFailed(what),
            StateError::Cycle(cycle) => Self::CycleDetected { cycle },
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

/// Parameters for a status transition
#[derive(Debug, Clone)]
pub struct Transition {
    pub task_id: String,
    pub to: TaskStatus,
    pub actor: String,
    pub actor_kind: crate::domain::ActorKind,
    pub reason: Option<String>,
    /// Only the explicit retry path may leave a terminal status
    pub allow_from_terminal: bool,
}

impl Transition {
    pub fn new(task_id: impl Into<String>, to: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            to,
            actor: "orchestrator".to_string(),
            actor_kind: crate::domain::ActorKind::System,
            reason: None,
            allow_from_terminal: false,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>, kind: crate::domain::ActorKind) -> Self {
        self.actor = actor.into();
        self.actor_kind = kind;
        self
    }

    pub fn from_terminal(mut self) -> Self {
        self.allow_from_terminal = true;
        self
    }
}

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Task operations
    CreateTask {
        task: Task,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetTask {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Task>>>,
    },
    UpdateTask {
        task: Task,
        change_reason: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    DeleteTask {
        id: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListTasks {
        list_id: String,
        status_filter: Option<TaskStatus>,
        reply: oneshot::Sender<StateResponse<Vec<Task>>>,
    },
    ListEvaluationQueue {
        reply: oneshot::Sender<StateResponse<Vec<Task>>>,
    },
    ReadyTasks {
        list_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Task>>>,
    },
    UnsettledCount {
        list_id: String,
        reply: oneshot::Sender<StateResponse<i64>>,
    },
    TransitionTask {
        transition: Transition,
        reply: oneshot::Sender<StateResponse<Task>>,
    },

    // List operations
    CreateList {
        list: TaskList,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetList {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<TaskList>>>,
    },
    UpdateList {
        list: TaskList,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    RefreshListCounters {
        list_id: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Dependency graph
    AddDependency {
        task_id: String,
        depends_on: String,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    RemoveDependency {
        task_id: String,
        depends_on: String,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    Dependencies {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<String>>>,
    },
    Dependents {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<String>>>,
    },
    UnmetDependencyCount {
        task_id: String,
        reply: oneshot::Sender<StateResponse<usize>>,
    },
    PendingDependentsClosure {
        task_id: String,
        list_id: String,
        reply: oneshot::Sender<StateResponse<Vec<String>>>,
    },
    EdgesWithinList {
        list_id: String,
        reply: oneshot::Sender<StateResponse<Vec<(String, String)>>>,
    },

    // Impacts
    AddImpact {
        impact: Impact,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ReplaceImpacts {
        task_id: String,
        impacts: Vec<Impact>,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListImpacts {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Impact>>>,
    },
    ListImpactsForList {
        list_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Impact>>>,
    },
    TasksSharingTargets {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<String>>>,
    },

    // Appendices
    AddAppendix {
        appendix: Appendix,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListAppendices {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<Appendix>>>,
    },
    HasAppendix {
        task_id: String,
        kind: AppendixKind,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    GotchasForTarget {
        target: String,
        limit: usize,
        reply: oneshot::Sender<StateResponse<Vec<Appendix>>>,
    },

    // Workers and heartbeats
    CreateWorker {
        worker: WorkerInstance,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    UpdateWorker {
        worker: WorkerInstance,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    GetWorker {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<WorkerInstance>>>,
    },
    LiveWorkerForTask {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Option<WorkerInstance>>>,
    },
    ListActiveWorkers {
        list_id: Option<String>,
        reply: oneshot::Sender<StateResponse<Vec<WorkerInstance>>>,
    },
    RecentWorkersForTask {
        task_id: String,
        limit: usize,
        reply: oneshot::Sender<StateResponse<Vec<WorkerInstance>>>,
    },
    DistinctErrorsForTask {
        task_id: String,
        limit: usize,
        reply: oneshot::Sender<StateResponse<Vec<String>>>,
    },
    RecordHeartbeat {
        heartbeat: Heartbeat,
        reply: oneshot::Sender<StateResponse<bool>>,
    },

    // Versions and history
    ListVersions {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<TaskVersion>>>,
    },
    LatestVersion {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Option<TaskVersion>>>,
    },
    ListHistory {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<StateHistoryEntry>>>,
    },

    // Notifications and review queue
    Notify {
        task_id: String,
        kind: String,
        message: String,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    FlagReview {
        task_id: String,
        source_task_id: String,
        action: String,
        reason: String,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    NotificationsForTask {
        task_id: String,
        reply: oneshot::Sender<StateResponse<Vec<(String, String)>>>,
    },

    // PRD
    CreatePrd {
        prd: Prd,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    AddPrdLink {
        link: PrdLink,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    PrdCoverage {
        prd_id: String,
        reply: oneshot::Sender<StateResponse<PrdCoverage>>,
    },

    // Commit flush point
    Flush {
        reply: oneshot::Sender<StateResponse<()>>,
    },

    // Shutdown
    Shutdown,
}
