//! WorkerInstance and Heartbeat - supervised child processes
//!
//! At any moment, at most one worker with non-terminated status exists per
//! task. Worker rows outlive their task relationship and are kept for
//! post-mortem.

use serde::{Deserialize, Serialize};
use workstore::now_ms;

use super::id::generate_id;

/// Worker lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Process creation requested, not yet confirmed alive
    #[default]
    Spawning,
    /// Process alive and heartbeating
    Running,
    /// Alive but not assigned work
    Idle,
    /// Process gone; row kept for post-mortem
    Terminated,
}

impl WorkerStatus {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::Idle => "idle",
            Self::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spawning" => Ok(Self::Spawning),
            "running" => Ok(Self::Running),
            "idle" => Ok(Self::Idle),
            "terminated" => Ok(Self::Terminated),
            _ => Err(format!("Unknown worker status: {}", s)),
        }
    }
}

/// A supervised worker process; owns exactly one task from spawn to exit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInstance {
    pub id: String,
    pub task_id: Option<String>,
    pub task_list_id: Option<String>,
    /// OS process id while alive
    pub pid: Option<u32>,
    pub hostname: String,
    pub status: WorkerStatus,
    pub last_heartbeat_at: Option<i64>,
    pub heartbeat_count: u32,
    pub missed_heartbeats: u32,
    pub tasks_completed: u32,
    pub tasks_failed: u32,
    pub spawned_at: i64,
    pub terminated_at: Option<i64>,
    pub termination_reason: Option<String>,
    pub last_error: Option<String>,
    /// Hash of the last recorded error; idempotence guard for failure counting
    pub last_error_hash: Option<String>,
    /// Previous execution this worker resumes from (retry with context)
    pub resume_of: Option<String>,
}

impl WorkerInstance {
    pub fn new(task_id: impl Into<String>, list_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self {
            id: generate_id("worker", &task_id),
            task_id: Some(task_id),
            task_list_id: Some(list_id.into()),
            pid: None,
            hostname: hostname(),
            status: WorkerStatus::Spawning,
            last_heartbeat_at: None,
            heartbeat_count: 0,
            missed_heartbeats: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            spawned_at: now_ms(),
            terminated_at: None,
            termination_reason: None,
            last_error: None,
            last_error_hash: None,
            resume_of: None,
        }
    }

    pub fn with_resume_of(mut self, previous: impl Into<String>) -> Self {
        self.resume_of = Some(previous.into());
        self
    }

    pub fn mark_running(&mut self, pid: u32) {
        self.pid = Some(pid);
        self.status = WorkerStatus::Running;
    }

    pub fn mark_terminated(&mut self, reason: impl Into<String>) {
        self.status = WorkerStatus::Terminated;
        self.terminated_at = Some(now_ms());
        self.termination_reason = Some(reason.into());
        self.pid = None;
    }

    pub fn is_live(&self) -> bool {
        !self.status.is_terminated()
    }

    /// Elapsed milliseconds since the last heartbeat (spawn time when none)
    pub fn heartbeat_age_ms(&self, now: i64) -> i64 {
        now - self.last_heartbeat_at.unwrap_or(self.spawned_at)
    }
}

/// Append-only liveness record emitted by a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Heartbeat {
    pub worker_id: String,
    pub task_id: Option<String>,
    pub status: String,
    /// Progress percent 0..100
    pub progress: Option<u8>,
    pub step: Option<String>,
    pub memory_mb: Option<f64>,
    pub cpu_percent: Option<f64>,
    pub created_at: i64,
}

impl Heartbeat {
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            task_id: None,
            status: "running".to_string(),
            progress: None,
            step: None,
            memory_mb: None,
            cpu_percent: None,
            created_at: now_ms(),
        }
    }

    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent.min(100));
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_new_is_spawning() {
        let worker = WorkerInstance::new("task-1", "list-1");
        assert_eq!(worker.status, WorkerStatus::Spawning);
        assert!(worker.is_live());
        assert!(worker.pid.is_none());
    }

    #[test]
    fn test_worker_lifecycle() {
        let mut worker = WorkerInstance::new("task-1", "list-1");
        worker.mark_running(4242);
        assert_eq!(worker.status, WorkerStatus::Running);
        assert_eq!(worker.pid, Some(4242));

        worker.mark_terminated("success");
        assert!(!worker.is_live());
        assert_eq!(worker.termination_reason, Some("success".to_string()));
        assert!(worker.pid.is_none());
        assert!(worker.terminated_at.is_some());
    }

    #[test]
    fn test_heartbeat_age_without_heartbeats() {
        let worker = WorkerInstance::new("task-1", "list-1");
        let age = worker.heartbeat_age_ms(worker.spawned_at + 5_000);
        assert_eq!(age, 5_000);
    }

    #[test]
    fn test_heartbeat_age_with_heartbeat() {
        let mut worker = WorkerInstance::new("task-1", "list-1");
        worker.last_heartbeat_at = Some(worker.spawned_at + 1_000);
        let age = worker.heartbeat_age_ms(worker.spawned_at + 5_000);
        assert_eq!(age, 4_000);
    }

    #[test]
    fn test_heartbeat_progress_capped() {
        let hb = Heartbeat::new("worker-1").with_progress(150);
        assert_eq!(hb.progress, Some(100));
    }

    #[test]
    fn test_resume_of() {
        let worker = WorkerInstance::new("task-1", "list-1").with_resume_of("worker-0");
        assert_eq!(worker.resume_of, Some("worker-0".to_string()));
    }
}
