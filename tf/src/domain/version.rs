//! Task versions and state history
//!
//! Versions are immutable snapshots of a task's mutable fields; version 1 is
//! created implicitly, later versions on any observed field change. State
//! history is the append-only log of every status transition. Neither is
//! ever deleted by the core.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use workstore::now_ms;

use super::id::generate_id;

/// Who performed a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    User,
    Agent,
    #[default]
    System,
}

impl std::fmt::Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ActorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "agent" => Ok(Self::Agent),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown actor kind: {}", s)),
        }
    }
}

/// Immutable snapshot of a task at a point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskVersion {
    pub id: String,
    pub task_id: String,
    /// Monotone per task, starting at 1
    pub version: u32,
    pub snapshot: Value,
    pub change_reason: String,
    pub actor: String,
    pub checkpoint: Option<String>,
    pub created_at: i64,
}

impl TaskVersion {
    pub fn new(task_id: impl Into<String>, version: u32, snapshot: Value, change_reason: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self {
            id: generate_id("version", &format!("{}-v{}", task_id, version)),
            task_id,
            version,
            snapshot,
            change_reason: change_reason.into(),
            actor: "system".to_string(),
            checkpoint: None,
            created_at: now_ms(),
        }
    }

    /// Field-level diff against an earlier version; empty when nothing changed
    pub fn diff(&self, earlier: &TaskVersion) -> Vec<FieldChange> {
        let mut changes = Vec::new();
        let (Some(now), Some(then)) = (self.snapshot.as_object(), earlier.snapshot.as_object()) else {
            return changes;
        };

        for (field, new_value) in now {
            let old_value = then.get(field).cloned().unwrap_or(Value::Null);
            if &old_value != new_value {
                changes.push(FieldChange {
                    field: field.clone(),
                    from: old_value,
                    to: new_value.clone(),
                });
            }
        }
        for field in then.keys() {
            if !now.contains_key(field) {
                changes.push(FieldChange {
                    field: field.clone(),
                    from: then[field].clone(),
                    to: Value::Null,
                });
            }
        }
        changes
    }
}

/// A single changed field between two versions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub from: Value,
    pub to: Value,
}

/// Append-only record of one status transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateHistoryEntry {
    pub task_id: String,
    pub from_status: String,
    pub to_status: String,
    pub actor: String,
    pub actor_kind: ActorKind,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: i64,
}

impl StateHistoryEntry {
    pub fn new(task_id: impl Into<String>, from_status: impl Into<String>, to_status: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            from_status: from_status.into(),
            to_status: to_status.into(),
            actor: "orchestrator".to_string(),
            actor_kind: ActorKind::System,
            reason: None,
            metadata: None,
            created_at: now_ms(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>, kind: ActorKind) -> Self {
        self.actor = actor.into();
        self.actor_kind = kind;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
