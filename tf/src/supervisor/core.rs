//! The worker supervisor
//!
//! Maintains the invariant "every in-progress task has exactly one live
//! worker and vice versa". A single actor consumes the typed event queue;
//! workers are parallel OS child processes whose only channels back in are
//! heartbeats, logged output, and the OS exit notification. Every handler
//! ends with one commit flush.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use workstore::now_ms;

use crate::domain::{Heartbeat, TaskStatus, WorkerInstance};
use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventBus};
use crate::failure::{FailureEngine, Inspector};
use crate::gatekeeper::Gatekeeper;
use crate::planner::{self, ExecutionPlan};
use crate::state::{StateManager, Transition};

use super::config::SupervisorConfig;
use super::messages::SupervisorEvent;
use super::process::{self, ProcessTable};

/// Cloneable handle for submitting events to the supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorEvent>,
}

impl SupervisorHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<CoreResult<T>>) -> SupervisorEvent,
    ) -> CoreResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .await
            .map_err(|_| CoreError::PreconditionFailed("Supervisor stopped".to_string()))?;
        reply_rx
            .await
            .map_err(|_| CoreError::PreconditionFailed("Supervisor stopped".to_string()))?
    }

    /// Spawn a worker for a pending task
    pub async fn spawn_worker(&self, task_id: &str, list_id: &str) -> CoreResult<String> {
        let task_id = task_id.to_string();
        let list_id = list_id.to_string();
        self.request(|reply| SupervisorEvent::SpawnRequest {
            task_id,
            list_id,
            resume_of: None,
            reply,
        })
        .await
    }

    /// Plan a list, transition it to in-progress, and start wave 0
    pub async fn start_execution(&self, list_id: &str, cap: Option<u32>) -> CoreResult<ExecutionPlan> {
        let list_id = list_id.to_string();
        self.request(|reply| SupervisorEvent::StartExecution { list_id, cap, reply })
            .await
    }

    /// Suppress further spawning; running workers are untouched
    pub async fn pause_execution(&self, list_id: &str) -> CoreResult<()> {
        let list_id = list_id.to_string();
        self.request(|reply| SupervisorEvent::PauseExecution { list_id, reply })
            .await
    }

    /// Resume spawning and rescan for ready tasks
    pub async fn resume_execution(&self, list_id: &str) -> CoreResult<()> {
        let list_id = list_id.to_string();
        self.request(|reply| SupervisorEvent::ResumeExecution { list_id, reply })
            .await
    }

    /// Record a worker heartbeat; false when it was dropped
    pub async fn record_heartbeat(&self, heartbeat: Heartbeat) -> CoreResult<bool> {
        self.request(|reply| SupervisorEvent::Heartbeat { heartbeat, reply }).await
    }

    /// Best-effort SIGTERM plus row cleanup
    pub async fn terminate(&self, worker_id: &str, reason: &str) -> CoreResult<()> {
        let worker_id = worker_id.to_string();
        let reason = reason.to_string();
        self.request(|reply| SupervisorEvent::Terminate {
            worker_id,
            reason,
            reply,
        })
        .await
    }

    /// Reset a task to pending and spawn a worker resuming from the
    /// previous execution
    pub async fn retry_with_context(&self, task_id: &str, list_id: &str) -> CoreResult<String> {
        let task_id = task_id.to_string();
        let list_id = list_id.to_string();
        self.request(|reply| SupervisorEvent::RetryWithContext { task_id, list_id, reply })
            .await
    }

    pub async fn get_active_workers(&self, list_id: Option<&str>) -> CoreResult<Vec<WorkerInstance>> {
        let list_id = list_id.map(str::to_string);
        self.request(|reply| SupervisorEvent::GetActiveWorkers { list_id, reply })
            .await
    }

    pub async fn get_worker(&self, worker_id: &str) -> CoreResult<Option<WorkerInstance>> {
        let worker_id = worker_id.to_string();
        self.request(|reply| SupervisorEvent::GetWorker { worker_id, reply })
            .await
    }

    /// Fire-and-forget edit notification (cache invalidation + rescan)
    pub async fn notify_edit(&self, task_id: &str) -> CoreResult<()> {
        self.tx
            .send(SupervisorEvent::EditNotification {
                task_id: task_id.to_string(),
            })
            .await
            .map_err(|_| CoreError::PreconditionFailed("Supervisor stopped".to_string()))
    }

    /// Inject a monitor tick (tests)
    pub async fn tick(&self) -> CoreResult<()> {
        self.tx
            .send(SupervisorEvent::MonitorTick)
            .await
            .map_err(|_| CoreError::PreconditionFailed("Supervisor stopped".to_string()))
    }

    pub async fn shutdown(&self) -> CoreResult<()> {
        self.tx
            .send(SupervisorEvent::Shutdown)
            .await
            .map_err(|_| CoreError::PreconditionFailed("Supervisor stopped".to_string()))
    }
}

/// The supervisor actor
pub struct Supervisor {
    config: SupervisorConfig,
    state: StateManager,
    gatekeeper: Arc<Gatekeeper>,
    failure: FailureEngine,
    events: Arc<EventBus>,
    tx: mpsc::Sender<SupervisorEvent>,
    rx: mpsc::Receiver<SupervisorEvent>,
    /// Live process handles; private to this actor
    processes: ProcessTable,
    /// Set on shutdown; suppresses new spawns while exits drain
    shutting_down: bool,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        state: StateManager,
        inspector: Arc<dyn Inspector>,
        events: Arc<EventBus>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        Self {
            gatekeeper: Arc::new(Gatekeeper::new(state.clone())),
            failure: FailureEngine::new(state.clone(), inspector),
            config,
            state,
            events,
            tx,
            rx,
            processes: ProcessTable::default(),
            shutting_down: false,
        }
    }

    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle { tx: self.tx.clone() }
    }

    pub fn gatekeeper(&self) -> Arc<Gatekeeper> {
        self.gatekeeper.clone()
    }

    /// Run the supervisor until shutdown
    pub async fn run(mut self) {
        if let Err(e) = self.recover().await {
            warn!(error = %e, "Recovery scan failed");
        }

        let mut tick = tokio::time::interval(Duration::from_secs(self.config.check_interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first interval tick fires immediately; swallow it
        tick.tick().await;

        info!("Supervisor started");
        loop {
            tokio::select! {
                event = self.rx.recv() => {
                    match event {
                        Some(event) => {
                            if self.dispatch(event).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    if let Err(e) = self.monitor_tick().await {
                        warn!(error = %e, "Monitor tick failed");
                    }
                }
            }
        }

        self.drain_for_shutdown().await;
        let _ = self.state.flush().await;
        info!("Supervisor stopped");
    }

    /// Graceful shutdown: give live workers the configured grace period to
    /// finish, reaping their exit events as they land, then best-effort
    /// SIGTERM for whatever is still running.
    async fn drain_for_shutdown(&mut self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.shutdown_timeout_secs);
        while !self.processes.is_empty() {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Ok(Some(SupervisorEvent::WorkerExit {
                    worker_id,
                    exit_code,
                    signal,
                })) => {
                    if let Err(e) = self.on_worker_exit(&worker_id, exit_code, signal).await {
                        warn!(worker_id = %worker_id, error = %e, "Worker exit handling failed during shutdown");
                    }
                }
                // Other events are dropped; their reply channels close and
                // callers see the supervisor as stopped
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => {
                    warn!(remaining = self.processes.len(), "Shutdown deadline reached");
                    break;
                }
            }
        }

        for worker_id in self.processes.worker_ids() {
            if let Some(pid) = self.processes.pid_of(&worker_id) {
                let _ = process::send_sigterm(pid);
            }
        }
    }

    /// Returns true when the loop should exit
    async fn dispatch(&mut self, event: SupervisorEvent) -> bool {
        match event {
            SupervisorEvent::SpawnRequest {
                task_id,
                list_id,
                resume_of,
                reply,
            } => {
                let result = self.spawn(&task_id, &list_id, resume_of).await;
                let _ = reply.send(result);
            }
            SupervisorEvent::StartExecution { list_id, cap, reply } => {
                let _ = reply.send(self.start_execution(&list_id, cap).await);
            }
            SupervisorEvent::PauseExecution { list_id, reply } => {
                let _ = reply.send(self.pause_execution(&list_id).await);
            }
            SupervisorEvent::ResumeExecution { list_id, reply } => {
                let _ = reply.send(self.resume_execution(&list_id).await);
            }
            SupervisorEvent::Heartbeat { heartbeat, reply } => {
                let result = async {
                    let recorded = self.state.record_heartbeat(heartbeat).await?;
                    self.state.flush().await?;
                    Ok(recorded)
                }
                .await;
                let _ = reply.send(result);
            }
            SupervisorEvent::WorkerExit {
                worker_id,
                exit_code,
                signal,
            } => {
                if let Err(e) = self.on_worker_exit(&worker_id, exit_code, signal).await {
                    warn!(worker_id = %worker_id, error = %e, "Worker exit handling failed");
                }
            }
            SupervisorEvent::MonitorTick => {
                if let Err(e) = self.monitor_tick().await {
                    warn!(error = %e, "Monitor tick failed");
                }
            }
            SupervisorEvent::EditNotification { task_id } => {
                self.gatekeeper.invalidate(&task_id).await;
                if let Ok(Some(task)) = self.state.get_task(&task_id).await
                    && let Some(list_id) = task.task_list_id
                    && let Err(e) = self.rescan(&list_id).await
                {
                    warn!(task_id = %task_id, error = %e, "Rescan after edit failed");
                }
                let _ = self.state.flush().await;
            }
            SupervisorEvent::Terminate {
                worker_id,
                reason,
                reply,
            } => {
                let _ = reply.send(self.terminate(&worker_id, &reason).await);
            }
            SupervisorEvent::RetryWithContext {
                task_id,
                list_id,
                reply,
            } => {
                let _ = reply.send(self.retry_with_context(&task_id, &list_id).await);
            }
            SupervisorEvent::GetActiveWorkers { list_id, reply } => {
                let result = self
                    .state
                    .list_active_workers(list_id.as_deref())
                    .await
                    .map_err(CoreError::from);
                let _ = reply.send(result);
            }
            SupervisorEvent::GetWorker { worker_id, reply } => {
                let _ = reply.send(self.state.get_worker(&worker_id).await.map_err(CoreError::from));
            }
            SupervisorEvent::Shutdown => {
                info!("Supervisor shutting down");
                self.shutting_down = true;
                return true;
            }
        }
        false
    }

    /// Spawn a worker for a pending task.
    ///
    /// Pre: task is pending, has no live worker, passes the readiness gate,
    /// and does not conflict with an already-running task.
    async fn spawn(&mut self, task_id: &str, list_id: &str, resume_of: Option<String>) -> CoreResult<String> {
        let task = self
            .state
            .get_task(task_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Task {}", task_id)))?;
        if task.status != TaskStatus::Pending {
            return Err(CoreError::PreconditionFailed(format!(
                "Task {} is {}, not pending",
                task_id, task.status
            )));
        }
        if let Some(existing) = self.state.live_worker_for_task(task_id).await? {
            return Err(CoreError::PreconditionFailed(format!(
                "Task {} already owned by worker {}",
                task_id, existing.id
            )));
        }

        if self.config.enforce_readiness {
            let report = self.gatekeeper.calculate_readiness(task_id).await?;
            if !report.is_ready {
                return Err(CoreError::ReadinessBelowThreshold {
                    score: report.score,
                    missing: report.missing,
                });
            }
        }

        // No wave may pair this task with a conflicting running one
        for worker in self.state.list_active_workers(Some(list_id)).await? {
            let Some(other_task) = worker.task_id else { continue };
            let details = self.gatekeeper.conflict_details(task_id, &other_task).await?;
            if let Some(blocking) = details.iter().find(|c| c.class.is_blocking()) {
                return Err(CoreError::ConflictBlocking {
                    task_a: task_id.to_string(),
                    task_b: other_task,
                    target: blocking.target.clone(),
                });
            }
        }

        let mut worker = WorkerInstance::new(task_id, list_id);
        if let Some(previous) = &resume_of {
            worker.resume_of = Some(previous.clone());
        }
        self.state.create_worker(worker.clone()).await?;

        match process::spawn_worker_process(&self.config, &worker.id, task_id, list_id, resume_of.as_deref()) {
            Ok(child) => {
                let pid = child.id().unwrap_or_default();
                worker.mark_running(pid);
                self.state.update_worker(worker.clone()).await?;
                self.state
                    .transition_task(Transition::new(task_id, TaskStatus::InProgress).with_reason("worker spawned"))
                    .await?;

                self.processes.insert(&worker.id, pid);
                process::watch_worker(child, worker.id.clone(), self.tx.clone());

                self.events.emit(Event::WorkerSpawned {
                    worker_id: worker.id.clone(),
                    task_id: task_id.to_string(),
                    pid,
                });
                info!(worker_id = %worker.id, task_id, pid, "Worker spawned");
                self.state.flush().await?;
                Ok(worker.id)
            }
            Err(e) => {
                worker.mark_terminated("spawn_failed");
                self.state.update_worker(worker.clone()).await?;
                let _ = self
                    .failure
                    .record_failure(&worker, &format!("spawn failed: {}", e), None)
                    .await?;
                self.state.flush().await?;
                warn!(task_id, error = %e, "Spawn failed");
                Err(CoreError::SpawnFailed(e.to_string()))
            }
        }
    }

    async fn start_execution(&mut self, list_id: &str, cap: Option<u32>) -> CoreResult<ExecutionPlan> {
        let mut list = self.state.get_list_required(list_id).await?;
        match list.status {
            crate::domain::ListStatus::InProgress => {
                return Err(CoreError::PreconditionFailed(format!(
                    "List {} already in progress",
                    list_id
                )));
            }
            crate::domain::ListStatus::Paused => {
                return Err(CoreError::PreconditionFailed(format!(
                    "List {} is paused; resume it instead",
                    list_id
                )));
            }
            _ => {}
        }

        if let Some(cap) = cap {
            list.max_concurrent = cap.max(1);
        }

        // A cycle aborts before any state change
        let plan = planner::plan_list(&self.state, list_id).await?;

        list.set_status(crate::domain::ListStatus::InProgress);
        self.state.update_list(list).await?;

        if let Some(wave) = plan.waves.first() {
            self.events.emit(Event::WaveStarted {
                list_id: list_id.to_string(),
                wave_index: wave.index,
                task_count: wave.count,
            });
            for task_id in &wave.task_ids {
                if let Err(e) = self.spawn(task_id, list_id, None).await {
                    warn!(task_id = %task_id, error = %e, "Wave-0 spawn skipped");
                }
            }
        }

        info!(list_id, waves = plan.waves.len(), max_parallelism = plan.max_parallelism, "Execution started");
        self.state.flush().await?;
        Ok(plan)
    }

    async fn pause_execution(&mut self, list_id: &str) -> CoreResult<()> {
        let mut list = self.state.get_list_required(list_id).await?;
        if list.status != crate::domain::ListStatus::InProgress {
            return Err(CoreError::PreconditionFailed(format!(
                "List {} is {}, not in progress",
                list_id, list.status
            )));
        }
        list.set_status(crate::domain::ListStatus::Paused);
        self.state.update_list(list).await?;
        self.state.flush().await?;
        info!(list_id, "Execution paused; running workers continue");
        Ok(())
    }

    async fn resume_execution(&mut self, list_id: &str) -> CoreResult<()> {
        let mut list = self.state.get_list_required(list_id).await?;
        if list.status != crate::domain::ListStatus::Paused {
            return Err(CoreError::PreconditionFailed(format!(
                "List {} is {}, not paused",
                list_id, list.status
            )));
        }
        list.set_status(crate::domain::ListStatus::InProgress);
        self.state.update_list(list).await?;
        self.rescan(list_id).await?;
        self.state.flush().await?;
        info!(list_id, "Execution resumed");
        Ok(())
    }

    /// Periodic liveness check: every T_check, a worker silent for longer
    /// than T_timeout takes a miss; at the threshold it is terminated with
    /// reason `heartbeat_timeout`.
    async fn monitor_tick(&mut self) -> CoreResult<()> {
        let now = now_ms();
        for mut worker in self.state.list_active_workers(None).await? {
            let age = worker.heartbeat_age_ms(now);
            if age > self.config.heartbeat_timeout_ms() {
                worker.missed_heartbeats += 1;
                debug!(worker_id = %worker.id, missed = worker.missed_heartbeats, age_ms = age, "Missed heartbeat");
                self.events.emit(Event::HeartbeatMissed {
                    worker_id: worker.id.clone(),
                    missed: worker.missed_heartbeats,
                });

                if worker.missed_heartbeats >= self.config.missed_heartbeat_threshold {
                    self.state.update_worker(worker.clone()).await?;
                    self.timeout_worker(worker).await?;
                } else {
                    self.state.update_worker(worker).await?;
                }
            } else if worker.missed_heartbeats > 0 {
                worker.missed_heartbeats = 0;
                self.state.update_worker(worker).await?;
            }
        }
        self.state.flush().await?;
        Ok(())
    }

    /// Reap a worker that stopped heartbeating
    async fn timeout_worker(&mut self, mut worker: WorkerInstance) -> CoreResult<()> {
        warn!(worker_id = %worker.id, "Heartbeat timeout; terminating");
        if let Some(pid) = worker.pid {
            let _ = process::send_sigterm(pid);
        }
        self.processes.remove(&worker.id);

        worker.mark_terminated("heartbeat_timeout");
        self.state.update_worker(worker.clone()).await?;
        self.events.emit(Event::WorkerTimedOut {
            worker_id: worker.id.clone(),
            task_id: worker.task_id.clone(),
        });

        if worker.task_id.is_some() {
            let outcome = self.failure.record_failure(&worker, "heartbeat timeout", None).await?;
            if outcome.task.escalated {
                self.events.emit(Event::EscalationRaised {
                    task_id: outcome.task.id.clone(),
                    consecutive_failures: outcome.task.consecutive_failures,
                });
            }
            if let Some(list_id) = &worker.task_list_id {
                self.rescan(list_id).await?;
            }
        }
        Ok(())
    }

    /// Post-mortem for an OS exit notification
    async fn on_worker_exit(&mut self, worker_id: &str, exit_code: Option<i32>, signal: Option<String>) -> CoreResult<()> {
        self.processes.remove(worker_id);

        let Some(mut worker) = self.state.get_worker(worker_id).await? else {
            return Ok(());
        };
        if worker.status.is_terminated() {
            // Already reaped (heartbeat timeout or explicit terminate)
            return Ok(());
        }

        let success = exit_code == Some(0);
        let reason = if success {
            "success".to_string()
        } else if let Some(code) = exit_code {
            format!("exit_code_{}", code)
        } else if let Some(signal) = &signal {
            format!("exit_{}", signal)
        } else {
            "exit_unknown".to_string()
        };

        if success {
            worker.tasks_completed += 1;
        }
        worker.mark_terminated(&reason);
        self.state.update_worker(worker.clone()).await?;
        self.events.emit(Event::WorkerExited {
            worker_id: worker.id.clone(),
            task_id: worker.task_id.clone().unwrap_or_default(),
            exit_code,
            signal: signal.clone(),
        });
        debug!(worker_id, reason = %reason, "Worker exited");

        if let (Some(task_id), Some(list_id)) = (worker.task_id.clone(), worker.task_list_id.clone()) {
            if success {
                self.state
                    .transition_task(
                        Transition::new(&task_id, TaskStatus::Completed).with_reason("worker exited with code 0"),
                    )
                    .await?;
                self.failure.record_success(&task_id).await?;
                self.events.emit(Event::TaskStatusChanged {
                    task_id: task_id.clone(),
                    from: TaskStatus::InProgress.to_string(),
                    to: TaskStatus::Completed.to_string(),
                });
            } else {
                let message = format!("worker exited with {}", reason);
                let outcome = self.failure.record_failure(&worker, &message, signal.as_deref()).await?;
                if outcome.task.escalated {
                    self.events.emit(Event::EscalationRaised {
                        task_id: outcome.task.id.clone(),
                        consecutive_failures: outcome.task.consecutive_failures,
                    });
                }
            }
            // Either way the rescan keeps unaffected tasks moving
            self.rescan(&list_id).await?;
        }

        self.state.flush().await?;
        Ok(())
    }

    async fn terminate(&mut self, worker_id: &str, reason: &str) -> CoreResult<()> {
        let mut worker = self
            .state
            .get_worker(worker_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("Worker {}", worker_id)))?;
        if worker.status.is_terminated() {
            return Ok(());
        }

        if let Some(pid) = worker.pid {
            let _ = process::send_sigterm(pid);
        }
        self.processes.remove(worker_id);

        worker.mark_terminated(reason);
        self.state.update_worker(worker.clone()).await?;
        info!(worker_id, reason, "Worker terminated");

        if worker.task_id.is_some() && reason != "success" {
            self.failure.record_failure(&worker, reason, None).await?;
            if let Some(list_id) = &worker.task_list_id {
                self.rescan(list_id).await?;
            }
        }
        self.state.flush().await?;
        Ok(())
    }

    async fn retry_with_context(&mut self, task_id: &str, list_id: &str) -> CoreResult<String> {
        let previous = self
            .state
            .recent_workers_for_task(task_id, 1)
            .await?
            .into_iter()
            .next()
            .map(|w| w.id);

        self.state
            .transition_task(
                Transition::new(task_id, TaskStatus::Pending)
                    .with_reason("retry with context")
                    .from_terminal(),
            )
            .await?;

        self.spawn(task_id, list_id, previous).await
    }

    /// After any event that could unblock tasks: spawn ready tasks up to the
    /// cap, and complete the list when nothing unsettled remains.
    async fn rescan(&mut self, list_id: &str) -> CoreResult<()> {
        let Some(list) = self.state.get_list(list_id).await? else {
            return Ok(());
        };
        if list.accepts_spawns() && !self.shutting_down {
            let active = self.state.list_active_workers(Some(list_id)).await?.len();
            let mut available = (list.max_concurrent as usize).saturating_sub(active);

            for task in self.state.ready_tasks(list_id).await? {
                if available == 0 {
                    break;
                }
                match self.spawn(&task.id, list_id, None).await {
                    Ok(_) => available -= 1,
                    Err(CoreError::ReadinessBelowThreshold { score, .. }) => {
                        debug!(task_id = %task.id, score, "Rescan skipped unready task");
                    }
                    Err(CoreError::ConflictBlocking { task_b, .. }) => {
                        debug!(task_id = %task.id, conflicts_with = %task_b, "Rescan deferred conflicting task");
                    }
                    Err(e) => {
                        warn!(task_id = %task.id, error = %e, "Rescan spawn failed");
                    }
                }
            }
        }

        let unsettled = self.state.unsettled_count(list_id).await?;
        if unsettled == 0
            && self.state.list_active_workers(Some(list_id)).await?.is_empty()
            && list.status != crate::domain::ListStatus::Completed
        {
            let mut list = self.state.get_list_required(list_id).await?;
            list.set_status(crate::domain::ListStatus::Completed);
            self.state.update_list(list).await?;
            self.state.refresh_list_counters(list_id).await?;
            self.events.emit(Event::ListCompleted {
                list_id: list_id.to_string(),
            });
            info!(list_id, "List completed");
        }
        Ok(())
    }

    /// Rebuild the handle table from the storage view of non-terminated
    /// workers; anything whose OS process is gone is reaped.
    async fn recover(&mut self) -> CoreResult<()> {
        for mut worker in self.state.list_active_workers(None).await? {
            match worker.pid {
                Some(pid) if process::process_alive(pid) => {
                    info!(worker_id = %worker.id, pid, "Re-adopted live worker after restart");
                    self.processes.insert(&worker.id, pid);
                }
                _ => {
                    warn!(worker_id = %worker.id, "Worker process gone; reaping");
                    worker.mark_terminated("orchestrator_restart");
                    self.state.update_worker(worker.clone()).await?;
                    if worker.task_id.is_some() {
                        let _ = self.failure.record_failure(&worker, "orchestrator restart", None).await?;
                    }
                }
            }
        }
        self.state.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ListStatus, Task, TaskList};
    use crate::failure::LoggingInspector;
    use std::path::PathBuf;

    fn sh_config(script: &str) -> SupervisorConfig {
        SupervisorConfig {
            worker_binary: PathBuf::from("/bin/sh"),
            worker_args: vec!["-c".to_string(), script.to_string(), "worker".to_string()],
            enforce_readiness: false,
            check_interval_secs: 3600,
            shutdown_timeout_secs: 2,
            ..Default::default()
        }
    }

    async fn setup(script: &str) -> (StateManager, SupervisorHandle) {
        let state = StateManager::spawn_in_memory().unwrap();
        let mut list = TaskList::with_id("list-1", "L");
        list.set_status(ListStatus::InProgress);
        state.create_list(list).await.unwrap();

        let supervisor = Supervisor::new(
            sh_config(script),
            state.clone(),
            Arc::new(LoggingInspector),
            crate::events::create_event_bus(),
        );
        let handle = supervisor.handle();
        tokio::spawn(supervisor.run());
        (state, handle)
    }

    async fn wait_for_status(state: &StateManager, task_id: &str, status: TaskStatus) {
        for _ in 0..100 {
            let task = state.get_task_required(task_id).await.unwrap();
            if task.status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Task {} never reached {}", task_id, status);
    }

    #[tokio::test]
    async fn test_spawn_transitions_task_and_worker() {
        let (state, handle) = setup("sleep 5").await;
        state
            .create_task(Task::with_id("t-1", "One", "list-1"))
            .await
            .unwrap();

        let worker_id = handle.spawn_worker("t-1", "list-1").await.unwrap();

        let task = state.get_task_required("t-1").await.unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);

        let worker = handle.get_worker(&worker_id).await.unwrap().unwrap();
        assert!(worker.pid.is_some());
        assert!(worker.is_live());

        handle.terminate(&worker_id, "test cleanup").await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_double_spawn_rejected() {
        let (state, handle) = setup("sleep 5").await;
        state
            .create_task(Task::with_id("t-1", "One", "list-1"))
            .await
            .unwrap();

        let worker_id = handle.spawn_worker("t-1", "list-1").await.unwrap();
        // Task is now in_progress with a live worker
        let err = handle.spawn_worker("t-1", "list-1").await.unwrap_err();
        assert!(matches!(err, CoreError::PreconditionFailed(_)));

        handle.terminate(&worker_id, "test cleanup").await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_successful_exit_completes_task() {
        let (state, handle) = setup("exit 0").await;
        state
            .create_task(Task::with_id("t-1", "One", "list-1"))
            .await
            .unwrap();

        handle.spawn_worker("t-1", "list-1").await.unwrap();
        wait_for_status(&state, "t-1", TaskStatus::Completed).await;

        // List with nothing left transitions to completed
        for _ in 0..100 {
            if state.get_list_required("list-1").await.unwrap().status == ListStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(
            state.get_list_required("list-1").await.unwrap().status,
            ListStatus::Completed
        );
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_task() {
        let (state, handle) = setup("exit 7").await;
        state
            .create_task(Task::with_id("t-1", "One", "list-1"))
            .await
            .unwrap();

        handle.spawn_worker("t-1", "list-1").await.unwrap();
        wait_for_status(&state, "t-1", TaskStatus::Failed).await;

        let task = state.get_task_required("t-1").await.unwrap();
        assert_eq!(task.consecutive_failures, 1);
        assert!(task.last_error.as_deref().unwrap_or("").contains("exit_code_7"));
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failed_marks_task_failed() {
        let state = StateManager::spawn_in_memory().unwrap();
        let mut list = TaskList::with_id("list-1", "L");
        list.set_status(ListStatus::InProgress);
        state.create_list(list).await.unwrap();
        state
            .create_task(Task::with_id("t-1", "One", "list-1"))
            .await
            .unwrap();

        let config = SupervisorConfig {
            worker_binary: PathBuf::from("/nonexistent/worker"),
            enforce_readiness: false,
            check_interval_secs: 3600,
            ..Default::default()
        };
        let supervisor = Supervisor::new(
            config,
            state.clone(),
            Arc::new(LoggingInspector),
            crate::events::create_event_bus(),
        );
        let handle = supervisor.handle();
        tokio::spawn(supervisor.run());

        let err = handle.spawn_worker("t-1", "list-1").await.unwrap_err();
        assert!(matches!(err, CoreError::SpawnFailed(_)));

        let task = state.get_task_required("t-1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_pause_rejects_double_start() {
        let (state, handle) = setup("exit 0").await;
        let _ = state;

        // list-1 is already in progress; startExecution must refuse
        let err = handle.start_execution("list-1", None).await.unwrap_err();
        assert!(matches!(err, CoreError::PreconditionFailed(_)));

        handle.pause_execution("list-1").await.unwrap();
        // A paused list also rejects start
        let err = handle.start_execution("list-1", None).await.unwrap_err();
        assert!(matches!(err, CoreError::PreconditionFailed(_)));

        handle.resume_execution("list-1").await.unwrap();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_roundtrip_through_supervisor() {
        let (state, handle) = setup("sleep 5").await;
        state
            .create_task(Task::with_id("t-1", "One", "list-1"))
            .await
            .unwrap();
        let worker_id = handle.spawn_worker("t-1", "list-1").await.unwrap();

        let recorded = handle
            .record_heartbeat(Heartbeat::new(&worker_id).with_task("t-1").with_progress(10))
            .await
            .unwrap();
        assert!(recorded);

        let worker = handle.get_worker(&worker_id).await.unwrap().unwrap();
        assert_eq!(worker.heartbeat_count, 1);

        handle.terminate(&worker_id, "test cleanup").await.unwrap();
        handle.shutdown().await.unwrap();
    }
}
