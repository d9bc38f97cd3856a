//! Cascade propagation
//!
//! When a task is mutated, discover which other tasks must be re-reviewed,
//! notified, or auto-updated, and apply or queue those effects. Discovery is
//! read-only and idempotent; application is a separate step so callers can
//! show the report before committing to it.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::domain::TaskStatus;
use crate::state::{StateError, StateManager, Transition};

use super::types::{
    AppliedCascade, CASCADE_MAX_DEPTH, CascadeEffect, CascadeReport, ChangeKind, EffectAction, TaskChange,
};

/// Cascade propagator over the state manager
pub struct CascadePropagator {
    state: StateManager,
}

impl CascadePropagator {
    pub fn new(state: StateManager) -> Self {
        Self { state }
    }

    /// Discover the consequences of a task mutation. Pure read; re-running
    /// with unchanged inputs yields the same effect set.
    pub async fn analyze(&self, source_task: &str, change: TaskChange) -> Result<CascadeReport, StateError> {
        let source = self.state.get_task_required(source_task).await?;
        let list_auto_approve = match &source.task_list_id {
            Some(list_id) => self.state.get_list_required(list_id).await?.auto_approve,
            None => false,
        };

        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(source_task.to_string());

        // Direct effects: every task depending on the source
        let default_action = EffectAction::default_for(change.kind);
        let mut direct = Vec::new();
        for dependent in self.state.dependents(source_task).await? {
            visited.insert(dependent.clone());
            direct.push(CascadeEffect {
                task_id: dependent,
                action: default_action,
                reason: format!("Depends on {} ({})", source_task, change.kind),
                depth: 1,
                auto_approvable: default_action.intrinsically_auto(change.kind),
            });
        }

        // Impact-overlap effects: only for impact changes
        if change.kind == ChangeKind::ImpactChanged {
            for other in self.state.tasks_sharing_targets(source_task).await? {
                if visited.insert(other.clone()) {
                    direct.push(CascadeEffect {
                        task_id: other,
                        action: EffectAction::Review,
                        reason: format!("Shares impact targets with {}", source_task),
                        depth: 1,
                        auto_approvable: false,
                    });
                }
            }
        }

        // Transitive effects: breadth-first over inverse depends_on arrows,
        // never revisiting a task seen at a shallower depth
        let mut transitive = Vec::new();
        let mut frontier: Vec<String> = direct.iter().map(|e| e.task_id.clone()).collect();
        for depth in 2..=CASCADE_MAX_DEPTH {
            let mut next = Vec::new();
            for task_id in &frontier {
                for dependent in self.state.dependents(task_id).await? {
                    if visited.insert(dependent.clone()) {
                        transitive.push(CascadeEffect {
                            task_id: dependent.clone(),
                            action: EffectAction::Notify,
                            reason: format!("Transitively depends on {} (depth {})", source_task, depth),
                            depth,
                            auto_approvable: true,
                        });
                        next.push(dependent);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        let requires_review = direct
            .iter()
            .chain(transitive.iter())
            .filter(|e| !e.auto_approvable && !list_auto_approve)
            .count();
        let auto_approvable = direct.len() + transitive.len() - requires_review;

        debug!(
            source_task,
            change = %change.kind,
            direct = direct.len(),
            transitive = transitive.len(),
            requires_review,
            "Cascade analyzed"
        );

        Ok(CascadeReport {
            source_task: source_task.to_string(),
            change,
            total_affected: direct.len() + transitive.len(),
            direct,
            transitive,
            requires_review,
            auto_approvable,
            list_auto_approve,
        })
    }

    /// Apply a report: auto-approved effects execute their action, the rest
    /// land in the review queue. Re-applying an already-applied report is a
    /// no-op.
    pub async fn apply(&self, report: &CascadeReport, approve_all: bool) -> Result<AppliedCascade, StateError> {
        let mut outcome = AppliedCascade::default();

        for effect in report.effects() {
            let auto = report.list_auto_approve || effect.auto_approvable || approve_all;
            if auto {
                self.apply_effect(&report.source_task, report.change.kind, effect).await?;
                outcome.applied.push(effect.clone());
            } else {
                self.queue_for_review(&report.source_task, effect).await?;
                outcome.queued_for_review.push(effect.clone());
            }
        }

        info!(
            source_task = %report.source_task,
            applied = outcome.applied.len(),
            queued = outcome.queued_for_review.len(),
            "Cascade applied"
        );
        Ok(outcome)
    }

    async fn apply_effect(
        &self,
        source_task: &str,
        change: ChangeKind,
        effect: &CascadeEffect,
    ) -> Result<(), StateError> {
        match effect.action {
            EffectAction::AutoUpdate => {
                // Touch the timestamp; fields are unchanged so no version
                let task = self.state.get_task_required(&effect.task_id).await?;
                self.state.update_task(task, "cascade auto-update").await?;
            }
            EffectAction::Notify => {
                self.notify_once(&effect.task_id, &change.to_string(), &effect.reason).await?;
            }
            EffectAction::Block => {
                self.block_task(&effect.task_id, source_task, &effect.reason).await?;
            }
            EffectAction::Review => {
                let task = self.state.get_task_required(&effect.task_id).await?;
                if task.status == TaskStatus::Pending {
                    self.block_task(&effect.task_id, source_task, &effect.reason).await?;
                    self.notify_once(&effect.task_id, "review", &effect.reason).await?;
                }
                self.state
                    .flag_review(&effect.task_id, source_task, &effect.action.to_string(), &effect.reason)
                    .await?;
            }
        }
        Ok(())
    }

    async fn block_task(&self, task_id: &str, source_task: &str, reason: &str) -> Result<(), StateError> {
        let mut task = self
            .state
            .transition_task(Transition::new(task_id, TaskStatus::Blocked).with_reason(reason.to_string()))
            .await?;
        task.blocked_by = Some(source_task.to_string());
        self.state.update_task(task, "blocked by cascade").await?;
        Ok(())
    }

    /// Notification insert guarded against duplicates so re-application is
    /// a no-op
    async fn notify_once(&self, task_id: &str, kind: &str, message: &str) -> Result<(), StateError> {
        let notifications = self.state.notifications_for_task(task_id).await?;
        if notifications.iter().any(|(k, m)| k == kind && m == message) {
            return Ok(());
        }
        self.state.notify(task_id, kind, message).await?;
        Ok(())
    }

    /// Queue a non-auto effect, skipping identical pending flags
    async fn queue_for_review(&self, source_task: &str, effect: &CascadeEffect) -> Result<(), StateError> {
        self.state
            .flag_review(&effect.task_id, source_task, &effect.action.to_string(), &effect.reason)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Impact, ImpactKind, ImpactOp, Task, TaskList};

    async fn seeded(auto_approve: bool) -> (StateManager, CascadePropagator) {
        let state = StateManager::spawn_in_memory().unwrap();
        state
            .create_list(TaskList::with_id("list-1", "L").with_auto_approve(auto_approve))
            .await
            .unwrap();
        // Chain: b depends on a, c depends on b, d depends on c, e depends on d
        for id in ["a", "b", "c", "d", "e"] {
            state.create_task(Task::with_id(id, id, "list-1")).await.unwrap();
        }
        for (from, to) in [("b", "a"), ("c", "b"), ("d", "c"), ("e", "d")] {
            state.add_dependency(from, to).await.unwrap();
        }
        (state.clone(), CascadePropagator::new(state))
    }

    #[tokio::test]
    async fn test_direct_effect_action_per_trigger() {
        let (_state, propagator) = seeded(false).await;

        let report = propagator
            .analyze("a", TaskChange::new(ChangeKind::StatusChanged))
            .await
            .unwrap();
        assert_eq!(report.direct.len(), 1);
        assert_eq!(report.direct[0].task_id, "b");
        assert_eq!(report.direct[0].action, EffectAction::Notify);
        assert!(report.direct[0].auto_approvable);

        let report = propagator
            .analyze("a", TaskChange::new(ChangeKind::DependencyChanged))
            .await
            .unwrap();
        assert_eq!(report.direct[0].action, EffectAction::Review);
        assert!(!report.direct[0].auto_approvable);
    }

    #[tokio::test]
    async fn test_transitive_depth_capped_at_three() {
        let (_state, propagator) = seeded(false).await;

        let report = propagator
            .analyze("a", TaskChange::new(ChangeKind::StatusChanged))
            .await
            .unwrap();

        // b direct (depth 1); c depth 2; d depth 3; e is beyond the cap
        assert_eq!(report.direct.len(), 1);
        assert_eq!(report.transitive.len(), 2);
        let ids: Vec<&str> = report.transitive.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
        assert!(report.transitive.iter().all(|e| e.auto_approvable));
        assert_eq!(report.total_affected, 3);
    }

    #[tokio::test]
    async fn test_impact_overlap_produces_review_effects() {
        let (state, propagator) = seeded(false).await;
        state
            .add_impact(Impact::new("a", ImpactKind::File, ImpactOp::Update, "shared.rs"))
            .await
            .unwrap();
        // An unrelated task shares the target
        state.create_task(Task::with_id("x", "x", "list-1")).await.unwrap();
        state
            .add_impact(Impact::new("x", ImpactKind::File, ImpactOp::Read, "shared.rs"))
            .await
            .unwrap();

        let report = propagator
            .analyze("a", TaskChange::new(ChangeKind::ImpactChanged))
            .await
            .unwrap();

        let overlap: Vec<&CascadeEffect> = report.direct.iter().filter(|e| e.task_id == "x").collect();
        assert_eq!(overlap.len(), 1);
        assert_eq!(overlap[0].action, EffectAction::Review);
    }

    #[tokio::test]
    async fn test_analysis_is_idempotent() {
        let (_state, propagator) = seeded(false).await;
        let change = TaskChange::new(ChangeKind::StatusChanged);
        let first = propagator.analyze("a", change.clone()).await.unwrap();
        let second = propagator.analyze("a", change).await.unwrap();
        assert_eq!(first.direct, second.direct);
        assert_eq!(first.transitive, second.transitive);
        assert_eq!(first.total_affected, second.total_affected);
    }

    #[tokio::test]
    async fn test_apply_queues_reviews_without_auto_approve() {
        let (state, propagator) = seeded(false).await;
        let report = propagator
            .analyze("a", TaskChange::new(ChangeKind::DependencyChanged))
            .await
            .unwrap();

        let outcome = propagator.apply(&report, false).await.unwrap();
        // Direct review effect queued; transitive notifies auto-applied
        assert_eq!(outcome.queued_for_review.len(), 1);
        assert_eq!(outcome.applied.len(), 2);

        // The review effect did not block anything yet
        let b = state.get_task_required("b").await.unwrap();
        assert_eq!(b.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_apply_with_list_auto_approve_blocks_pending_reviewee() {
        let (state, propagator) = seeded(true).await;
        let report = propagator
            .analyze("a", TaskChange::new(ChangeKind::ImpactChanged))
            .await
            .unwrap();
        assert!(report.list_auto_approve);

        let outcome = propagator.apply(&report, false).await.unwrap();
        assert!(outcome.queued_for_review.is_empty());

        // The pending direct dependent was demoted to blocked with a
        // reference to the source
        let b = state.get_task_required("b").await.unwrap();
        assert_eq!(b.status, TaskStatus::Blocked);
        assert_eq!(b.blocked_by, Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_reapplication_is_noop_for_notifications() {
        let (state, propagator) = seeded(false).await;
        let report = propagator
            .analyze("a", TaskChange::new(ChangeKind::StatusChanged))
            .await
            .unwrap();

        propagator.apply(&report, false).await.unwrap();
        let first = state.notifications_for_task("b").await.unwrap();
        propagator.apply(&report, false).await.unwrap();
        let second = state.notifications_for_task("b").await.unwrap();
        assert_eq!(first.len(), second.len());
    }
}
