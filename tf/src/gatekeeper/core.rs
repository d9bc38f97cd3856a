//! The Gatekeeper - readiness cache and cross-task conflict queries
//!
//! Gates every pending task before scheduling: per-task atomicity scoring
//! with a short-TTL memoization, and the file-conflict checks the planner
//! and supervisor consult. The cache is per-process and never persisted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use crate::state::{StateError, StateManager};

use super::conflict::{self, ImpactConflict};
use super::readiness::{ReadinessReport, score_task};

/// Cached score lifetime
const CACHE_TTL: Duration = Duration::from_secs(60);

/// Cooperative debounce: a stale entry younger than this is served as-is so
/// a burst of edits collapses into one re-score
const INVALIDATION_DEBOUNCE: Duration = Duration::from_millis(250);

struct CacheEntry {
    report: ReadinessReport,
    computed_at: Instant,
    stale_since: Option<Instant>,
}

impl CacheEntry {
    fn fresh(report: ReadinessReport) -> Self {
        Self {
            report,
            computed_at: Instant::now(),
            stale_since: None,
        }
    }

    fn usable(&self) -> bool {
        if self.computed_at.elapsed() >= CACHE_TTL {
            return false;
        }
        match self.stale_since {
            None => true,
            // Debounce window: serve the stale copy, recompute after it
            Some(since) => since.elapsed() < INVALIDATION_DEBOUNCE,
        }
    }
}

/// Readiness and conflict gatekeeper
pub struct Gatekeeper {
    state: StateManager,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl Gatekeeper {
    pub fn new(state: StateManager) -> Self {
        Self {
            state,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Score one task, serving from cache within the TTL
    pub async fn calculate_readiness(&self, task_id: &str) -> Result<ReadinessReport, StateError> {
        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(task_id)
                && entry.usable()
            {
                return Ok(entry.report.clone());
            }
        }

        let report = self.score_uncached(task_id).await?;
        let mut cache = self.cache.lock().await;
        cache.insert(task_id.to_string(), CacheEntry::fresh(report.clone()));
        Ok(report)
    }

    async fn score_uncached(&self, task_id: &str) -> Result<ReadinessReport, StateError> {
        let task = self.state.get_task_required(task_id).await?;
        let impacts = self.state.list_impacts(task_id).await?;
        let appendices = self.state.list_appendices(task_id).await?;
        let unmet = self.state.unmet_dependency_count(task_id).await?;

        let report = score_task(&task, &impacts, &appendices, unmet);
        debug!(task_id, score = report.score, ready = report.is_ready, "Scored readiness");
        Ok(report)
    }

    /// Score every task in a list
    pub async fn bulk_readiness(&self, list_id: &str) -> Result<Vec<ReadinessReport>, StateError> {
        let tasks = self.state.list_tasks(list_id, None).await?;
        let mut reports = Vec::with_capacity(tasks.len());
        for task in &tasks {
            reports.push(self.calculate_readiness(&task.id).await?);
        }
        Ok(reports)
    }

    /// Drop a task's cached score (task edit, impact change, appendix change,
    /// or dependency-status change)
    pub async fn invalidate(&self, task_id: &str) {
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get_mut(task_id)
            && entry.stale_since.is_none()
        {
            entry.stale_since = Some(Instant::now());
        }
    }

    /// Invalidate every cached score for a list's tasks
    pub async fn invalidate_list(&self, list_id: &str) -> Result<(), StateError> {
        let tasks = self.state.list_tasks(list_id, None).await?;
        let mut cache = self.cache.lock().await;
        for task in &tasks {
            if let Some(entry) = cache.get_mut(&task.id)
                && entry.stale_since.is_none()
            {
                entry.stale_since = Some(Instant::now());
            }
        }
        Ok(())
    }

    /// May the two tasks share a wave? Symmetric.
    pub async fn can_run_parallel(&self, task_a: &str, task_b: &str) -> Result<bool, StateError> {
        let a = self.state.list_impacts(task_a).await?;
        let b = self.state.list_impacts(task_b).await?;
        Ok(conflict::can_run_parallel(&a, &b))
    }

    /// Every warning and blocking impact pair between two tasks
    pub async fn conflict_details(&self, task_a: &str, task_b: &str) -> Result<Vec<ImpactConflict>, StateError> {
        let a = self.state.list_impacts(task_a).await?;
        let b = self.state.list_impacts(task_b).await?;
        Ok(conflict::conflict_details(&a, &b))
    }

    /// Tasks that cannot run in parallel with the given one
    pub async fn conflicting_tasks(&self, task_id: &str) -> Result<Vec<(String, Vec<ImpactConflict>)>, StateError> {
        let mine = self.state.list_impacts(task_id).await?;
        let candidates = self.state.tasks_sharing_targets(task_id).await?;

        let mut conflicting = Vec::new();
        for other in candidates {
            let theirs = self.state.list_impacts(&other).await?;
            let details = conflict::conflict_details(&mine, &theirs);
            if details.iter().any(|c| c.class.is_blocking()) {
                conflicting.push((other, details));
            }
        }
        Ok(conflicting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Appendix, AppendixKind, Impact, ImpactKind, ImpactOp, Task, TaskList};

    async fn seeded() -> (StateManager, Gatekeeper) {
        let state = StateManager::spawn_in_memory().unwrap();
        state.create_list(TaskList::with_id("list-1", "L")).await.unwrap();
        let gatekeeper = Gatekeeper::new(state.clone());
        (state, gatekeeper)
    }

    async fn add_ready_task(state: &StateManager, id: &str) {
        state.create_task(Task::with_id(id, id, "list-1")).await.unwrap();
        state
            .add_appendix(Appendix::inline(id, AppendixKind::TestContext, "cargo test"))
            .await
            .unwrap();
        state
            .add_appendix(Appendix::inline(id, AppendixKind::AcceptanceCriteria, "done when green"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ready_task_passes_gate() {
        let (state, gatekeeper) = seeded().await;
        add_ready_task(&state, "t-1").await;

        let report = gatekeeper.calculate_readiness("t-1").await.unwrap();
        assert!(report.is_ready);
        assert_eq!(report.score, 100);
    }

    #[tokio::test]
    async fn test_bare_task_fails_gate() {
        let (state, gatekeeper) = seeded().await;
        state
            .create_task(Task::with_id("t-1", "Bare", "list-1"))
            .await
            .unwrap();

        let report = gatekeeper.calculate_readiness("t-1").await.unwrap();
        assert!(!report.is_ready);
        assert!(report.score <= 50);
        assert!(report.missing.iter().any(|m| m == "Missing test_context appendix"));
        assert!(report.missing.iter().any(|m| m == "Missing acceptance_criteria appendix"));
    }

    #[tokio::test]
    async fn test_cache_serves_within_ttl() {
        let (state, gatekeeper) = seeded().await;
        add_ready_task(&state, "t-1").await;

        let first = gatekeeper.calculate_readiness("t-1").await.unwrap();

        // Mutate the underlying data; without invalidation the cached
        // report is still served
        state.create_task(Task::with_id("dep", "dep", "list-1")).await.unwrap();
        state.add_dependency("t-1", "dep").await.unwrap();
        let cached = gatekeeper.calculate_readiness("t-1").await.unwrap();
        assert_eq!(first, cached);
    }

    #[tokio::test]
    async fn test_invalidation_triggers_rescore_after_debounce() {
        let (state, gatekeeper) = seeded().await;
        add_ready_task(&state, "t-1").await;
        gatekeeper.calculate_readiness("t-1").await.unwrap();

        state.create_task(Task::with_id("dep", "dep", "list-1")).await.unwrap();
        state.add_dependency("t-1", "dep").await.unwrap();
        gatekeeper.invalidate("t-1").await;

        tokio::time::sleep(INVALIDATION_DEBOUNCE + Duration::from_millis(50)).await;
        let rescored = gatekeeper.calculate_readiness("t-1").await.unwrap();
        assert!(rescored.score < 100, "unmet dependency should lower the score");
    }

    #[tokio::test]
    async fn test_conflict_queries() {
        let (state, gatekeeper) = seeded().await;
        add_ready_task(&state, "t-1").await;
        add_ready_task(&state, "t-2").await;
        state
            .add_impact(Impact::new("t-1", ImpactKind::File, ImpactOp::Update, "db/schema.sql"))
            .await
            .unwrap();
        state
            .add_impact(Impact::new("t-2", ImpactKind::File, ImpactOp::Update, "db/schema.sql"))
            .await
            .unwrap();

        assert!(!gatekeeper.can_run_parallel("t-1", "t-2").await.unwrap());
        assert_eq!(
            gatekeeper.can_run_parallel("t-1", "t-2").await.unwrap(),
            gatekeeper.can_run_parallel("t-2", "t-1").await.unwrap()
        );

        let details = gatekeeper.conflict_details("t-1", "t-2").await.unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(
            details[0].class,
            crate::gatekeeper::ConflictClass::Blocking(crate::gatekeeper::ConflictKind::WriteWrite)
        );

        let conflicting = gatekeeper.conflicting_tasks("t-1").await.unwrap();
        assert_eq!(conflicting.len(), 1);
        assert_eq!(conflicting[0].0, "t-2");
    }
}
