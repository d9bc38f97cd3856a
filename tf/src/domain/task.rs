//! Task - the unit of work
//!
//! A task either belongs to one task list (schedulable) or sits in the
//! evaluation queue (no list membership, awaiting analysis or grouping).

use serde::{Deserialize, Serialize};
use workstore::now_ms;

use super::id::{generate_display_id, generate_id};

/// Task category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Feature,
    Bug,
    #[default]
    Task,
    Enhancement,
    Infrastructure,
    Ui,
    Api,
    Database,
    Test,
    Documentation,
    Security,
    Performance,
    Research,
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Feature => "feature",
            Self::Bug => "bug",
            Self::Task => "task",
            Self::Enhancement => "enhancement",
            Self::Infrastructure => "infrastructure",
            Self::Ui => "ui",
            Self::Api => "api",
            Self::Database => "database",
            Self::Test => "test",
            Self::Documentation => "documentation",
            Self::Security => "security",
            Self::Performance => "performance",
            Self::Research => "research",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feature" => Ok(Self::Feature),
            "bug" => Ok(Self::Bug),
            "task" => Ok(Self::Task),
            "enhancement" => Ok(Self::Enhancement),
            "infrastructure" => Ok(Self::Infrastructure),
            "ui" => Ok(Self::Ui),
            "api" => Ok(Self::Api),
            "database" => Ok(Self::Database),
            "test" => Ok(Self::Test),
            "documentation" => Ok(Self::Documentation),
            "security" => Ok(Self::Security),
            "performance" => Ok(Self::Performance),
            "research" => Ok(Self::Research),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Task status in the execution lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in a list for a worker
    #[default]
    Pending,
    /// Exclusively owned by a live worker
    InProgress,
    /// Worker finished, validation running
    Validating,
    /// Done
    Completed,
    /// Worker failed or timed out
    Failed,
    /// A dependency failed
    Blocked,
    /// Manually skipped; dependents treat it like completed
    Skipped,
    /// In the evaluation queue, not yet schedulable
    Evaluating,
    /// Manually cancelled
    Cancelled,
    /// Archived after completion
    Archived,
}

impl TaskStatus {
    /// Terminal statuses never transition out except through an explicit retry
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Archived)
    }

    /// Statuses that satisfy a `depends_on` edge
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Validating => "validating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Skipped => "skipped",
            Self::Evaluating => "evaluating",
            Self::Cancelled => "cancelled",
            Self::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "validating" => Ok(Self::Validating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "blocked" => Ok(Self::Blocked),
            "skipped" => Ok(Self::Skipped),
            "evaluating" => Ok(Self::Evaluating),
            "cancelled" => Ok(Self::Cancelled),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Priority P0 (highest) to P4 (lowest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Priority {
    P0,
    P1,
    #[default]
    P2,
    P3,
    P4,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
            Self::P4 => "P4",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "P0" => Ok(Self::P0),
            "P1" => Ok(Self::P1),
            "P2" => Ok(Self::P2),
            "P3" => Ok(Self::P3),
            "P4" => Ok(Self::P4),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// Estimated effort
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Effort {
    Trivial,
    #[default]
    Small,
    Medium,
    Large,
    Epic,
}

impl std::fmt::Display for Effort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trivial => "trivial",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Epic => "epic",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Effort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trivial" => Ok(Self::Trivial),
            "small" => Ok(Self::Small),
            "medium" => Ok(Self::Medium),
            "large" => Ok(Self::Large),
            "epic" => Ok(Self::Epic),
            _ => Err(format!("Unknown effort: {}", s)),
        }
    }
}

/// Unit of work executed by exactly one worker at a time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier
    pub id: String,

    /// Human-readable display identifier
    pub display_id: String,

    pub title: String,

    pub description: String,

    pub category: TaskCategory,

    pub status: TaskStatus,

    pub priority: Priority,

    pub effort: Effort,

    /// Rough lifecycle order, small positive integer
    pub phase: u32,

    /// List membership; None means the task is in the evaluation queue
    pub task_list_id: Option<String>,

    pub project_id: Option<String>,

    /// Position within the list; only meaningful when task_list_id is set
    pub position: i64,

    /// Consecutive failures since the last successful completion
    pub consecutive_failures: u32,

    /// Last recorded error message
    pub last_error: Option<String>,

    /// Set when the task was handed to the inspection agent
    pub escalated: bool,

    pub escalated_at: Option<i64>,

    /// Failing ancestor that caused a `blocked` status
    pub blocked_by: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Task {
    /// Create a new pending task inside a list
    pub fn new(title: impl Into<String>, list_id: impl Into<String>) -> Self {
        let title = title.into();
        let id = generate_id("task", &title);
        let now = now_ms();
        Self {
            display_id: generate_display_id(&id),
            id,
            title,
            description: String::new(),
            category: TaskCategory::Task,
            status: TaskStatus::Pending,
            priority: Priority::P2,
            effort: Effort::Small,
            phase: 1,
            task_list_id: Some(list_id.into()),
            project_id: None,
            position: 0,
            consecutive_failures: 0,
            last_error: None,
            escalated: false,
            escalated_at: None,
            blocked_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a task in the evaluation queue (no list membership)
    pub fn evaluating(title: impl Into<String>) -> Self {
        let mut task = Self::new(title, "");
        task.task_list_id = None;
        task.status = TaskStatus::Evaluating;
        task
    }

    /// Create with a specific ID (tests and recovery)
    pub fn with_id(id: impl Into<String>, title: impl Into<String>, list_id: impl Into<String>) -> Self {
        let mut task = Self::new(title, list_id);
        let id = id.into();
        task.display_id = generate_display_id(&id);
        task.id = id;
        task
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = position;
        self
    }

    pub fn with_effort(mut self, effort: Effort) -> Self {
        self.effort = effort;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = now_ms();
    }

    pub fn mark_escalated(&mut self) {
        self.escalated = true;
        self.escalated_at = Some(now_ms());
        self.updated_at = now_ms();
    }

    /// Check invariant: evaluation-queue tasks have no list membership
    pub fn in_evaluation_queue(&self) -> bool {
        self.task_list_id.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Snapshot of the mutable fields, used for task versions
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "description": self.description,
            "category": self.category.to_string(),
            "status": self.status.to_string(),
            "priority": self.priority.to_string(),
            "effort": self.effort.to_string(),
            "phase": self.phase,
            "task_list_id": self.task_list_id,
            "position": self.position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_new_defaults() {
        let task = Task::new("Fix the login bug", "list-1");
        assert!(task.id.contains("-task-"));
        assert!(task.display_id.starts_with("TF-"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.priority, Priority::P2);
        assert_eq!(task.task_list_id, Some("list-1".to_string()));
        assert!(!task.in_evaluation_queue());
    }

    #[test]
    fn test_evaluating_task_has_no_list() {
        let task = Task::evaluating("Investigate flaky tests");
        assert!(task.in_evaluation_queue());
        assert_eq!(task.status, TaskStatus::Evaluating);
        assert!(task.task_list_id.is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(TaskStatus::Archived.is_terminal());
        assert!(!TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Blocked.is_terminal());
    }

    #[test]
    fn test_dependency_satisfaction() {
        assert!(TaskStatus::Completed.satisfies_dependency());
        assert!(TaskStatus::Skipped.satisfies_dependency());
        assert!(!TaskStatus::Pending.satisfies_dependency());
        assert!(!TaskStatus::Failed.satisfies_dependency());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::P0 < Priority::P1);
        assert!(Priority::P3 < Priority::P4);
        assert_eq!("p1".parse::<Priority>().unwrap(), Priority::P1);
        assert!("P9".parse::<Priority>().is_err());
    }

    #[test]
    fn test_effort_parse_roundtrip() {
        for effort in [Effort::Trivial, Effort::Small, Effort::Medium, Effort::Large, Effort::Epic] {
            assert_eq!(effort.to_string().parse::<Effort>().unwrap(), effort);
        }
    }

    #[test]
    fn test_status_parse_roundtrip() {
        let statuses = [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Validating,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Blocked,
            TaskStatus::Skipped,
            TaskStatus::Evaluating,
            TaskStatus::Cancelled,
            TaskStatus::Archived,
        ];
        for status in statuses {
            assert_eq!(status.to_string().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_mark_escalated() {
        let mut task = Task::new("Stuck task", "list-1");
        assert!(!task.escalated);
        task.mark_escalated();
        assert!(task.escalated);
        assert!(task.escalated_at.is_some());
    }

    #[test]
    fn test_snapshot_contains_mutable_fields() {
        let task = Task::new("Snapshot me", "list-1");
        let snap = task.snapshot();
        assert_eq!(snap["title"], "Snapshot me");
        assert_eq!(snap["status"], "pending");
        assert_eq!(snap["priority"], "P2");
    }

    #[test]
    fn test_set_status_bumps_updated_at() {
        let mut task = Task::new("Timestamps", "list-1");
        let before = task.updated_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        task.set_status(TaskStatus::InProgress);
        assert!(task.updated_at >= before);
        assert_eq!(task.status, TaskStatus::InProgress);
    }
}
