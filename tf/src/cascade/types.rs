//! Cascade trigger and effect types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Transitive propagation stops at this depth (direct effects are depth 1)
pub const CASCADE_MAX_DEPTH: usize = 3;

/// What changed on the source task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    StatusChanged,
    PriorityChanged,
    DependencyChanged,
    ImpactChanged,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::StatusChanged => "status_changed",
            Self::PriorityChanged => "priority_changed",
            Self::DependencyChanged => "dependency_changed",
            Self::ImpactChanged => "impact_changed",
        };
        write!(f, "{}", s)
    }
}

/// A mutation of a task, with a structured diff payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChange {
    pub kind: ChangeKind,
    pub diff: Value,
}

impl TaskChange {
    pub fn new(kind: ChangeKind) -> Self {
        Self {
            kind,
            diff: Value::Null,
        }
    }

    pub fn with_diff(mut self, diff: Value) -> Self {
        self.diff = diff;
        self
    }
}

/// Consequence applied to an affected task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectAction {
    /// Touch the affected task's timestamp
    AutoUpdate,
    /// Create a notification row
    Notify,
    /// Affected task -> blocked
    Block,
    /// Hold for manual approval; pending tasks demote to blocked
    Review,
}

impl std::fmt::Display for EffectAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AutoUpdate => "auto_update",
            Self::Notify => "notify",
            Self::Block => "block",
            Self::Review => "review",
        };
        write!(f, "{}", s)
    }
}

impl EffectAction {
    /// Default suggested action for a direct effect of the given trigger
    pub fn default_for(change: ChangeKind) -> Self {
        match change {
            ChangeKind::StatusChanged => Self::Notify,
            ChangeKind::PriorityChanged => Self::AutoUpdate,
            ChangeKind::DependencyChanged => Self::Review,
            ChangeKind::ImpactChanged => Self::Review,
        }
    }

    /// Intrinsically auto-approvable action/trigger combinations
    pub fn intrinsically_auto(&self, change: ChangeKind) -> bool {
        matches!(self, Self::Notify | Self::AutoUpdate)
            && matches!(change, ChangeKind::StatusChanged | ChangeKind::PriorityChanged)
    }
}

/// One discovered cascade effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeEffect {
    pub task_id: String,
    pub action: EffectAction,
    pub reason: String,
    /// 1 for direct effects, 2..=CASCADE_MAX_DEPTH for transitive
    pub depth: usize,
    pub auto_approvable: bool,
}

/// Full analysis of one task mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeReport {
    pub source_task: String,
    pub change: TaskChange,
    pub direct: Vec<CascadeEffect>,
    pub transitive: Vec<CascadeEffect>,
    pub total_affected: usize,
    pub requires_review: usize,
    pub auto_approvable: usize,
    pub list_auto_approve: bool,
}

impl CascadeReport {
    pub fn effects(&self) -> impl Iterator<Item = &CascadeEffect> {
        self.direct.iter().chain(self.transitive.iter())
    }
}

/// Result of applying a report
#[derive(Debug, Clone, Default)]
pub struct AppliedCascade {
    pub applied: Vec<CascadeEffect>,
    pub queued_for_review: Vec<CascadeEffect>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_actions_per_trigger() {
        assert_eq!(EffectAction::default_for(ChangeKind::StatusChanged), EffectAction::Notify);
        assert_eq!(EffectAction::default_for(ChangeKind::PriorityChanged), EffectAction::AutoUpdate);
        assert_eq!(EffectAction::default_for(ChangeKind::DependencyChanged), EffectAction::Review);
        assert_eq!(EffectAction::default_for(ChangeKind::ImpactChanged), EffectAction::Review);
    }

    #[test]
    fn test_intrinsic_auto_approval() {
        assert!(EffectAction::Notify.intrinsically_auto(ChangeKind::StatusChanged));
        assert!(EffectAction::AutoUpdate.intrinsically_auto(ChangeKind::PriorityChanged));
        assert!(!EffectAction::Review.intrinsically_auto(ChangeKind::StatusChanged));
        assert!(!EffectAction::Notify.intrinsically_auto(ChangeKind::ImpactChanged));
        assert!(!EffectAction::Block.intrinsically_auto(ChangeKind::StatusChanged));
    }
}
