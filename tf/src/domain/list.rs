//! TaskList - ordered collection of tasks that execute together

use serde::{Deserialize, Serialize};
use workstore::now_ms;

use super::id::generate_id;

/// Task list status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListStatus {
    /// Being assembled, not yet executable
    #[default]
    Draft,
    /// Waves are running
    InProgress,
    /// Running workers finish, no new spawns
    Paused,
    /// All tasks reached a terminal or skipped state
    Completed,
    Archived,
}

impl std::fmt::Display for ListStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ListStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            _ => Err(format!("Unknown list status: {}", s)),
        }
    }
}

/// Ordered collection of tasks executed as dependency waves
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub id: String,

    pub name: String,

    pub project_id: Option<String>,

    pub status: ListStatus,

    /// Maximum permitted concurrent workers (soft cap on wave width)
    pub max_concurrent: u32,

    /// When true, cascade effects apply without manual review
    pub auto_approve: bool,

    /// Counters, refreshed at commit flush points
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub failed_tasks: u32,

    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskList {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = now_ms();
        Self {
            id: generate_id("list", &name),
            name,
            project_id: None,
            status: ListStatus::Draft,
            max_concurrent: 4,
            auto_approve: false,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with a specific ID (tests and recovery)
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        let mut list = Self::new(name);
        list.id = id.into();
        list
    }

    pub fn with_max_concurrent(mut self, cap: u32) -> Self {
        self.max_concurrent = cap;
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    pub fn set_status(&mut self, status: ListStatus) {
        self.status = status;
        self.updated_at = now_ms();
    }

    /// A paused or completed list spawns no new workers
    pub fn accepts_spawns(&self) -> bool {
        self.status == ListStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_new_defaults() {
        let list = TaskList::new("Sprint 12");
        assert!(list.id.contains("-list-"));
        assert_eq!(list.status, ListStatus::Draft);
        assert_eq!(list.max_concurrent, 4);
        assert!(!list.auto_approve);
    }

    #[test]
    fn test_accepts_spawns() {
        let mut list = TaskList::new("L");
        assert!(!list.accepts_spawns());
        list.set_status(ListStatus::InProgress);
        assert!(list.accepts_spawns());
        list.set_status(ListStatus::Paused);
        assert!(!list.accepts_spawns());
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            ListStatus::Draft,
            ListStatus::InProgress,
            ListStatus::Paused,
            ListStatus::Completed,
            ListStatus::Archived,
        ] {
            assert_eq!(status.to_string().parse::<ListStatus>().unwrap(), status);
        }
    }
}
