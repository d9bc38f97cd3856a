//! Core event types
//!
//! Every significant action in the orchestrator emits one of these.

use serde::{Deserialize, Serialize};

/// An orchestrator activity event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TaskStatusChanged {
        task_id: String,
        from: String,
        to: String,
    },
    WorkerSpawned {
        worker_id: String,
        task_id: String,
        pid: u32,
    },
    WorkerExited {
        worker_id: String,
        task_id: String,
        exit_code: Option<i32>,
        signal: Option<String>,
    },
    HeartbeatMissed {
        worker_id: String,
        missed: u32,
    },
    WorkerTimedOut {
        worker_id: String,
        task_id: Option<String>,
    },
    WaveStarted {
        list_id: String,
        wave_index: usize,
        task_count: usize,
    },
    ListCompleted {
        list_id: String,
    },
    EscalationRaised {
        task_id: String,
        consecutive_failures: u32,
    },
    CascadeApplied {
        source_task: String,
        applied: usize,
        queued: usize,
    },
}

impl Event {
    /// Event type name for logging and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TaskStatusChanged { .. } => "TaskStatusChanged",
            Self::WorkerSpawned { .. } => "WorkerSpawned",
            Self::WorkerExited { .. } => "WorkerExited",
            Self::HeartbeatMissed { .. } => "HeartbeatMissed",
            Self::WorkerTimedOut { .. } => "WorkerTimedOut",
            Self::WaveStarted { .. } => "WaveStarted",
            Self::ListCompleted { .. } => "ListCompleted",
            Self::EscalationRaised { .. } => "EscalationRaised",
            Self::CascadeApplied { .. } => "CascadeApplied",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        let event = Event::ListCompleted {
            list_id: "list-1".to_string(),
        };
        assert_eq!(event.event_type(), "ListCompleted");
    }

    #[test]
    fn test_event_serde_tagging() {
        let event = Event::WorkerSpawned {
            worker_id: "w-1".to_string(),
            task_id: "t-1".to_string(),
            pid: 42,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"worker_spawned\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "WorkerSpawned");
    }
}
