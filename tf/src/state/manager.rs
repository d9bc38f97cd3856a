//! StateManager - actor that owns the WorkStore
//!
//! All persistent state flows through this actor; components hold cloneable
//! handles and await replies. Compound operations (transitions, versioned
//! updates, dependency edits) are sequenced here so they appear atomically
//! to the rest of the core, and the commit flush is an explicit command so
//! each supervisor handler can end with exactly one flush.

use std::path::Path;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use workstore::Store;

use crate::domain::{
    Appendix, AppendixKind, Heartbeat, Impact, Prd, PrdCoverage, PrdLink, StateHistoryEntry, Task, TaskList,
    TaskStatus, TaskVersion, WorkerInstance, calculate_coverage,
};

use super::messages::{StateCommand, StateError, StateResponse, Transition};
use super::repo::{appendices, graph, history, impacts, notifications, prd, tasks, workers};

fn store_err(e: eyre::Report) -> StateError {
    StateError::StoreError(e.to_string())
}

/// Handle to send commands to the StateManager actor
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a StateManager actor over a file-backed store
    pub fn spawn(store_path: impl AsRef<Path>) -> eyre::Result<Self> {
        let store = Store::open(store_path.as_ref())?;
        Ok(Self::spawn_with_store(store))
    }

    /// Spawn over an in-memory store (tests)
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        let store = Store::open_in_memory()?;
        Ok(Self::spawn_with_store(store))
    }

    fn spawn_with_store(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));
        info!("StateManager spawned");
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand,
    ) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Task operations ===

    pub async fn create_task(&self, task: Task) -> StateResponse<String> {
        debug!(task_id = %task.id, "create_task");
        self.request(|reply| StateCommand::CreateTask { task, reply }).await
    }

    pub async fn get_task(&self, id: &str) -> StateResponse<Option<Task>> {
        let id = id.to_string();
        self.request(|reply| StateCommand::GetTask { id, reply }).await
    }

    pub async fn get_task_required(&self, id: &str) -> StateResponse<Task> {
        self.get_task(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Task {}", id)))
    }

    /// Update a task's fields; snapshots a new version when anything changed
    pub async fn update_task(&self, task: Task, change_reason: impl Into<String>) -> StateResponse<()> {
        debug!(task_id = %task.id, "update_task");
        let change_reason = change_reason.into();
        self.request(|reply| StateCommand::UpdateTask {
            task,
            change_reason,
            reply,
        })
        .await
    }

    pub async fn delete_task(&self, id: &str) -> StateResponse<()> {
        debug!(task_id = %id, "delete_task");
        let id = id.to_string();
        self.request(|reply| StateCommand::DeleteTask { id, reply }).await
    }

    pub async fn list_tasks(&self, list_id: &str, status: Option<TaskStatus>) -> StateResponse<Vec<Task>> {
        let list_id = list_id.to_string();
        self.request(|reply| StateCommand::ListTasks {
            list_id,
            status_filter: status,
            reply,
        })
        .await
    }

    pub async fn list_evaluation_queue(&self) -> StateResponse<Vec<Task>> {
        self.request(|reply| StateCommand::ListEvaluationQueue { reply }).await
    }

    /// Pending tasks with satisfied dependencies and no live worker
    pub async fn ready_tasks(&self, list_id: &str) -> StateResponse<Vec<Task>> {
        let list_id = list_id.to_string();
        self.request(|reply| StateCommand::ReadyTasks { list_id, reply }).await
    }

    pub async fn unsettled_count(&self, list_id: &str) -> StateResponse<i64> {
        let list_id = list_id.to_string();
        self.request(|reply| StateCommand::UnsettledCount { list_id, reply }).await
    }

    /// Run a status transition with history and version bookkeeping
    pub async fn transition_task(&self, transition: Transition) -> StateResponse<Task> {
        debug!(task_id = %transition.task_id, to = %transition.to, "transition_task");
        self.request(|reply| StateCommand::TransitionTask { transition, reply })
            .await
    }

    // === List operations ===

    pub async fn create_list(&self, list: TaskList) -> StateResponse<String> {
        debug!(list_id = %list.id, "create_list");
        self.request(|reply| StateCommand::CreateList { list, reply }).await
    }

    pub async fn get_list(&self, id: &str) -> StateResponse<Option<TaskList>> {
        let id = id.to_string();
        self.request(|reply| StateCommand::GetList { id, reply }).await
    }

    pub async fn get_list_required(&self, id: &str) -> StateResponse<TaskList> {
        self.get_list(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("List {}", id)))
    }

    pub async fn update_list(&self, list: TaskList) -> StateResponse<()> {
        self.request(|reply| StateCommand::UpdateList { list, reply }).await
    }

    pub async fn refresh_list_counters(&self, list_id: &str) -> StateResponse<()> {
        let list_id = list_id.to_string();
        self.request(|reply| StateCommand::RefreshListCounters { list_id, reply })
            .await
    }

    // === Dependency graph ===

    /// Add `task_id depends_on depends_on_id`; rejected when it would close a
    /// cycle, with the offending path in the error.
    pub async fn add_dependency(&self, task_id: &str, depends_on: &str) -> StateResponse<()> {
        debug!(task_id, depends_on, "add_dependency");
        let task_id = task_id.to_string();
        let depends_on = depends_on.to_string();
        self.request(|reply| StateCommand::AddDependency {
            task_id,
            depends_on,
            reply,
        })
        .await
    }

    pub async fn remove_dependency(&self, task_id: &str, depends_on: &str) -> StateResponse<bool> {
        let task_id = task_id.to_string();
        let depends_on = depends_on.to_string();
        self.request(|reply| StateCommand::RemoveDependency {
            task_id,
            depends_on,
            reply,
        })
        .await
    }

    pub async fn dependencies(&self, task_id: &str) -> StateResponse<Vec<String>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::Dependencies { task_id, reply }).await
    }

    pub async fn dependents(&self, task_id: &str) -> StateResponse<Vec<String>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::Dependents { task_id, reply }).await
    }

    pub async fn unmet_dependency_count(&self, task_id: &str) -> StateResponse<usize> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::UnmetDependencyCount { task_id, reply })
            .await
    }

    /// Pending same-list tasks transitively depending on this one
    pub async fn pending_dependents_closure(&self, task_id: &str, list_id: &str) -> StateResponse<Vec<String>> {
        let task_id = task_id.to_string();
        let list_id = list_id.to_string();
        self.request(|reply| StateCommand::PendingDependentsClosure {
            task_id,
            list_id,
            reply,
        })
        .await
    }

    pub async fn edges_within_list(&self, list_id: &str) -> StateResponse<Vec<(String, String)>> {
        let list_id = list_id.to_string();
        self.request(|reply| StateCommand::EdgesWithinList { list_id, reply }).await
    }

    // === Impacts ===

    pub async fn add_impact(&self, impact: Impact) -> StateResponse<()> {
        self.request(|reply| StateCommand::AddImpact { impact, reply }).await
    }

    pub async fn replace_impacts(&self, task_id: &str, impacts: Vec<Impact>) -> StateResponse<()> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::ReplaceImpacts {
            task_id,
            impacts,
            reply,
        })
        .await
    }

    pub async fn list_impacts(&self, task_id: &str) -> StateResponse<Vec<Impact>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::ListImpacts { task_id, reply }).await
    }

    pub async fn list_impacts_for_list(&self, list_id: &str) -> StateResponse<Vec<Impact>> {
        let list_id = list_id.to_string();
        self.request(|reply| StateCommand::ListImpactsForList { list_id, reply })
            .await
    }

    pub async fn tasks_sharing_targets(&self, task_id: &str) -> StateResponse<Vec<String>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::TasksSharingTargets { task_id, reply })
            .await
    }

    // === Appendices ===

    pub async fn add_appendix(&self, appendix: Appendix) -> StateResponse<()> {
        self.request(|reply| StateCommand::AddAppendix { appendix, reply }).await
    }

    pub async fn list_appendices(&self, task_id: &str) -> StateResponse<Vec<Appendix>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::ListAppendices { task_id, reply }).await
    }

    pub async fn has_appendix(&self, task_id: &str, kind: AppendixKind) -> StateResponse<bool> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::HasAppendix { task_id, kind, reply })
            .await
    }

    pub async fn gotchas_for_target(&self, target: &str, limit: usize) -> StateResponse<Vec<Appendix>> {
        let target = target.to_string();
        self.request(|reply| StateCommand::GotchasForTarget { target, limit, reply })
            .await
    }

    // === Workers ===

    pub async fn create_worker(&self, worker: WorkerInstance) -> StateResponse<String> {
        debug!(worker_id = %worker.id, "create_worker");
        self.request(|reply| StateCommand::CreateWorker { worker, reply }).await
    }

    pub async fn update_worker(&self, worker: WorkerInstance) -> StateResponse<()> {
        self.request(|reply| StateCommand::UpdateWorker { worker, reply }).await
    }

    pub async fn get_worker(&self, id: &str) -> StateResponse<Option<WorkerInstance>> {
        let id = id.to_string();
        self.request(|reply| StateCommand::GetWorker { id, reply }).await
    }

    pub async fn get_worker_required(&self, id: &str) -> StateResponse<WorkerInstance> {
        self.get_worker(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Worker {}", id)))
    }

    pub async fn live_worker_for_task(&self, task_id: &str) -> StateResponse<Option<WorkerInstance>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::LiveWorkerForTask { task_id, reply })
            .await
    }

    pub async fn list_active_workers(&self, list_id: Option<&str>) -> StateResponse<Vec<WorkerInstance>> {
        let list_id = list_id.map(str::to_string);
        self.request(|reply| StateCommand::ListActiveWorkers { list_id, reply })
            .await
    }

    pub async fn recent_workers_for_task(&self, task_id: &str, limit: usize) -> StateResponse<Vec<WorkerInstance>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::RecentWorkersForTask { task_id, limit, reply })
            .await
    }

    pub async fn distinct_errors_for_task(&self, task_id: &str, limit: usize) -> StateResponse<Vec<String>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::DistinctErrorsForTask { task_id, limit, reply })
            .await
    }

    /// Returns false when the heartbeat was dropped (unknown or terminated worker)
    pub async fn record_heartbeat(&self, heartbeat: Heartbeat) -> StateResponse<bool> {
        self.request(|reply| StateCommand::RecordHeartbeat { heartbeat, reply })
            .await
    }

    // === Versions and history ===

    pub async fn list_versions(&self, task_id: &str) -> StateResponse<Vec<TaskVersion>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::ListVersions { task_id, reply }).await
    }

    pub async fn latest_version(&self, task_id: &str) -> StateResponse<Option<TaskVersion>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::LatestVersion { task_id, reply }).await
    }

    pub async fn list_history(&self, task_id: &str) -> StateResponse<Vec<StateHistoryEntry>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::ListHistory { task_id, reply }).await
    }

    // === Notifications and review queue ===

    pub async fn notify(&self, task_id: &str, kind: &str, message: &str) -> StateResponse<String> {
        let task_id = task_id.to_string();
        let kind = kind.to_string();
        let message = message.to_string();
        self.request(|reply| StateCommand::Notify {
            task_id,
            kind,
            message,
            reply,
        })
        .await
    }

    pub async fn flag_review(
        &self,
        task_id: &str,
        source_task_id: &str,
        action: &str,
        reason: &str,
    ) -> StateResponse<String> {
        let task_id = task_id.to_string();
        let source_task_id = source_task_id.to_string();
        let action = action.to_string();
        let reason = reason.to_string();
        self.request(|reply| StateCommand::FlagReview {
            task_id,
            source_task_id,
            action,
            reason,
            reply,
        })
        .await
    }

    pub async fn notifications_for_task(&self, task_id: &str) -> StateResponse<Vec<(String, String)>> {
        let task_id = task_id.to_string();
        self.request(|reply| StateCommand::NotificationsForTask { task_id, reply })
            .await
    }

    // === PRD ===

    pub async fn create_prd(&self, prd: Prd) -> StateResponse<String> {
        self.request(|reply| StateCommand::CreatePrd { prd, reply }).await
    }

    pub async fn add_prd_link(&self, link: PrdLink) -> StateResponse<()> {
        self.request(|reply| StateCommand::AddPrdLink { link, reply }).await
    }

    pub async fn prd_coverage(&self, prd_id: &str) -> StateResponse<PrdCoverage> {
        let prd_id = prd_id.to_string();
        self.request(|reply| StateCommand::PrdCoverage { prd_id, reply }).await
    }

    // === Flush and shutdown ===

    /// Commit flush point; the last operation of every handler
    pub async fn flush(&self) -> StateResponse<()> {
        self.request(|reply| StateCommand::Flush { reply }).await
    }

    pub async fn shutdown(&self) -> Result<(), StateError> {
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

/// Create a task row plus its implicit version 1
fn handle_create_task(store: &mut Store, task: &Task) -> StateResponse<String> {
    tasks::insert(store, task).map_err(store_err)?;
    let v1 = TaskVersion::new(&task.id, 1, task.snapshot(), "created");
    history::insert_version(store, &v1).map_err(store_err)?;
    Ok(task.id.clone())
}

/// Update a task, snapshotting a new version when fields changed
fn handle_update_task(store: &mut Store, task: &Task, change_reason: &str) -> StateResponse<()> {
    tasks::update(store, task).map_err(store_err)?;

    let snapshot = task.snapshot();
    let latest = history::latest_version(store, &task.id).map_err(store_err)?;
    let changed = latest.as_ref().map(|v| v.snapshot != snapshot).unwrap_or(true);
    if changed {
        let next = latest.map(|v| v.version + 1).unwrap_or(1);
        let version = TaskVersion::new(&task.id, next, snapshot, change_reason);
        history::insert_version(store, &version).map_err(store_err)?;
    }
    Ok(())
}

/// Status transition with terminal-state guard, history, and versioning
fn handle_transition(store: &mut Store, transition: &Transition) -> StateResponse<Task> {
    let mut task = tasks::get(store, &transition.task_id)
        .map_err(store_err)?
        .ok_or_else(|| StateError::NotFound(format!("Task {}", transition.task_id)))?;

    let from = task.status;
    if from == transition.to {
        return Ok(task);
    }
    if from.is_terminal() && !transition.allow_from_terminal {
        return Err(StateError::Precondition(format!(
            "Task {} is {} and cannot transition to {}",
            task.id, from, transition.to
        )));
    }

    task.set_status(transition.to);
    if transition.to != TaskStatus::Blocked {
        task.blocked_by = None;
    }
    handle_update_task(
        store,
        &task,
        transition.reason.as_deref().unwrap_or("status changed"),
    )?;

    let mut entry = StateHistoryEntry::new(&task.id, from.to_string(), transition.to.to_string())
        .with_actor(&transition.actor, transition.actor_kind);
    if let Some(reason) = &transition.reason {
        entry = entry.with_reason(reason.clone());
    }
    history::append_history(store, &entry).map_err(store_err)?;
    Ok(task)
}

fn handle_add_dependency(store: &mut Store, task_id: &str, depends_on: &str) -> StateResponse<()> {
    if tasks::get(store, task_id).map_err(store_err)?.is_none() {
        return Err(StateError::NotFound(format!("Task {}", task_id)));
    }
    if tasks::get(store, depends_on).map_err(store_err)?.is_none() {
        return Err(StateError::NotFound(format!("Task {}", depends_on)));
    }
    if let Some(cycle) = graph::dependency_cycle(store, task_id, depends_on).map_err(store_err)? {
        warn!(task_id, depends_on, "Dependency rejected: cycle");
        return Err(StateError::Cycle(cycle));
    }
    let rel = crate::domain::Relationship::new(task_id, depends_on, crate::domain::RelationKind::DependsOn);
    graph::insert_edge(store, &rel).map_err(store_err)?;
    Ok(())
}

/// The actor loop that owns the Store and processes commands
async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::CreateTask { task, reply } => {
                let _ = reply.send(handle_create_task(&mut store, &task));
            }
            StateCommand::GetTask { id, reply } => {
                let _ = reply.send(tasks::get(&mut store, &id).map_err(store_err));
            }
            StateCommand::UpdateTask {
                task,
                change_reason,
                reply,
            } => {
                let _ = reply.send(handle_update_task(&mut store, &task, &change_reason));
            }
            StateCommand::DeleteTask { id, reply } => {
                let _ = reply.send(tasks::delete_cascade(&mut store, &id).map_err(store_err));
            }
            StateCommand::ListTasks {
                list_id,
                status_filter,
                reply,
            } => {
                let _ = reply.send(tasks::list_for_list(&mut store, &list_id, status_filter).map_err(store_err));
            }
            StateCommand::ListEvaluationQueue { reply } => {
                let _ = reply.send(tasks::list_evaluation_queue(&mut store).map_err(store_err));
            }
            StateCommand::ReadyTasks { list_id, reply } => {
                let _ = reply.send(tasks::ready_tasks(&mut store, &list_id).map_err(store_err));
            }
            StateCommand::UnsettledCount { list_id, reply } => {
                let _ = reply.send(tasks::unsettled_count(&mut store, &list_id).map_err(store_err));
            }
            StateCommand::TransitionTask { transition, reply } => {
                let _ = reply.send(handle_transition(&mut store, &transition));
            }

            StateCommand::CreateList { list, reply } => {
                let result = tasks::insert_list(&mut store, &list)
                    .map(|_| list.id.clone())
                    .map_err(store_err);
                let _ = reply.send(result);
            }
            StateCommand::GetList { id, reply } => {
                let _ = reply.send(tasks::get_list(&mut store, &id).map_err(store_err));
            }
            StateCommand::UpdateList { list, reply } => {
                let _ = reply.send(tasks::update_list(&mut store, &list).map_err(store_err));
            }
            StateCommand::RefreshListCounters { list_id, reply } => {
                let _ = reply.send(tasks::refresh_list_counters(&mut store, &list_id).map_err(store_err));
            }

            StateCommand::AddDependency {
                task_id,
                depends_on,
                reply,
            } => {
                let _ = reply.send(handle_add_dependency(&mut store, &task_id, &depends_on));
            }
            StateCommand::RemoveDependency {
                task_id,
                depends_on,
                reply,
            } => {
                let result = graph::remove_edge(
                    &mut store,
                    &task_id,
                    &depends_on,
                    crate::domain::RelationKind::DependsOn,
                )
                .map_err(store_err);
                let _ = reply.send(result);
            }
            StateCommand::Dependencies { task_id, reply } => {
                let _ = reply.send(graph::dependencies_of(&mut store, &task_id).map_err(store_err));
            }
            StateCommand::Dependents { task_id, reply } => {
                let _ = reply.send(graph::dependents_of(&mut store, &task_id).map_err(store_err));
            }
            StateCommand::UnmetDependencyCount { task_id, reply } => {
                let _ = reply.send(graph::unmet_dependency_count(&mut store, &task_id).map_err(store_err));
            }
            StateCommand::PendingDependentsClosure {
                task_id,
                list_id,
                reply,
            } => {
                let _ =
                    reply.send(graph::pending_dependents_closure(&mut store, &task_id, &list_id).map_err(store_err));
            }
            StateCommand::EdgesWithinList { list_id, reply } => {
                let _ = reply.send(graph::edges_within_list(&mut store, &list_id).map_err(store_err));
            }

            StateCommand::AddImpact { impact, reply } => {
                let _ = reply.send(impacts::insert(&mut store, &impact).map_err(store_err));
            }
            StateCommand::ReplaceImpacts {
                task_id,
                impacts: new_impacts,
                reply,
            } => {
                let result = impacts::delete_for_task(&mut store, &task_id)
                    .and_then(|_| {
                        new_impacts
                            .iter()
                            .try_for_each(|impact| impacts::insert(&mut store, impact))
                    })
                    .map_err(store_err);
                let _ = reply.send(result);
            }
            StateCommand::ListImpacts { task_id, reply } => {
                let _ = reply.send(impacts::list_for_task(&mut store, &task_id).map_err(store_err));
            }
            StateCommand::ListImpactsForList { list_id, reply } => {
                let _ = reply.send(impacts::list_for_list(&mut store, &list_id).map_err(store_err));
            }
            StateCommand::TasksSharingTargets { task_id, reply } => {
                let _ = reply.send(impacts::tasks_sharing_targets(&mut store, &task_id).map_err(store_err));
            }

            StateCommand::AddAppendix { appendix, reply } => {
                let _ = reply.send(appendices::insert(&mut store, &appendix).map_err(store_err));
            }
            StateCommand::ListAppendices { task_id, reply } => {
                let _ = reply.send(appendices::list_for_task(&mut store, &task_id).map_err(store_err));
            }
            StateCommand::HasAppendix { task_id, kind, reply } => {
                let _ = reply.send(appendices::has_kind(&mut store, &task_id, kind).map_err(store_err));
            }
            StateCommand::GotchasForTarget { target, limit, reply } => {
                let _ = reply.send(appendices::gotchas_for_target(&mut store, &target, limit).map_err(store_err));
            }

            StateCommand::CreateWorker { worker, reply } => {
                let result = workers::insert(&mut store, &worker)
                    .map(|_| worker.id.clone())
                    .map_err(store_err);
                let _ = reply.send(result);
            }
            StateCommand::UpdateWorker { worker, reply } => {
                let _ = reply.send(workers::update(&mut store, &worker).map_err(store_err));
            }
            StateCommand::GetWorker { id, reply } => {
                let _ = reply.send(workers::get(&mut store, &id).map_err(store_err));
            }
            StateCommand::LiveWorkerForTask { task_id, reply } => {
                let _ = reply.send(workers::live_worker_for_task(&mut store, &task_id).map_err(store_err));
            }
            StateCommand::ListActiveWorkers { list_id, reply } => {
                let _ = reply.send(workers::list_active(&mut store, list_id.as_deref()).map_err(store_err));
            }
            StateCommand::RecentWorkersForTask { task_id, limit, reply } => {
                let _ = reply.send(workers::recent_for_task(&mut store, &task_id, limit).map_err(store_err));
            }
            StateCommand::DistinctErrorsForTask { task_id, limit, reply } => {
                let _ = reply.send(workers::distinct_errors_for_task(&mut store, &task_id, limit).map_err(store_err));
            }
            StateCommand::RecordHeartbeat { heartbeat, reply } => {
                let _ = reply.send(workers::record_heartbeat(&mut store, &heartbeat).map_err(store_err));
            }

            StateCommand::ListVersions { task_id, reply } => {
                let _ = reply.send(history::list_versions(&mut store, &task_id).map_err(store_err));
            }
            StateCommand::LatestVersion { task_id, reply } => {
                let _ = reply.send(history::latest_version(&mut store, &task_id).map_err(store_err));
            }
            StateCommand::ListHistory { task_id, reply } => {
                let _ = reply.send(history::list_history(&mut store, &task_id).map_err(store_err));
            }

            StateCommand::Notify {
                task_id,
                kind,
                message,
                reply,
            } => {
                let _ = reply.send(notifications::notify(&mut store, &task_id, &kind, &message).map_err(store_err));
            }
            StateCommand::FlagReview {
                task_id,
                source_task_id,
                action,
                reason,
                reply,
            } => {
                let result = notifications::flag_for_review(&mut store, &task_id, &source_task_id, &action, &reason)
                    .map_err(store_err);
                let _ = reply.send(result);
            }
            StateCommand::NotificationsForTask { task_id, reply } => {
                let _ = reply.send(notifications::notifications_for_task(&mut store, &task_id).map_err(store_err));
            }

            StateCommand::CreatePrd { prd: new_prd, reply } => {
                let result = prd::insert_prd(&mut store, &new_prd)
                    .map(|_| new_prd.id.clone())
                    .map_err(store_err);
                let _ = reply.send(result);
            }
            StateCommand::AddPrdLink { link, reply } => {
                let _ = reply.send(prd::insert_link(&mut store, &link).map_err(store_err));
            }
            StateCommand::PrdCoverage { prd_id, reply } => {
                let result = (|| {
                    let document = prd::get_prd(&mut store, &prd_id)
                        .map_err(store_err)?
                        .ok_or_else(|| StateError::NotFound(format!("PRD {}", prd_id)))?;
                    let links = prd::links_for_prd(&mut store, &prd_id).map_err(store_err)?;
                    Ok(calculate_coverage(&document, &links))
                })();
                let _ = reply.send(result);
            }

            StateCommand::Flush { reply } => {
                let _ = reply.send(store.commit().map_err(store_err));
            }

            StateCommand::Shutdown => {
                if let Err(e) = store.commit() {
                    warn!(error = %e, "Final commit failed during shutdown");
                }
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}
