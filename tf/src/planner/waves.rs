//! Wave computation
//!
//! Pure over its inputs: pending tasks, the `depends_on` edges among them,
//! and each task's declared impacts. Re-invoked by consumers whenever tasks,
//! edges, impacts, or the cap change.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{Impact, Task};
use crate::error::CoreError;
use crate::gatekeeper::conflict::has_blocking_conflict;

/// One wave: tasks that may run concurrently
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub index: usize,
    pub task_ids: Vec<String>,
    pub count: usize,
    /// True when the per-list cap forced a split
    pub cap_limited: bool,
}

/// The full execution plan for a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub waves: Vec<Wave>,
    /// Widest wave width
    pub max_parallelism: usize,
}

impl ExecutionPlan {
    pub fn wave_for_task(&self, task_id: &str) -> Option<usize> {
        self.waves
            .iter()
            .find(|w| w.task_ids.iter().any(|id| id == task_id))
            .map(|w| w.index)
    }

    pub fn task_count(&self) -> usize {
        self.waves.iter().map(|w| w.count).sum()
    }
}

/// Find a `depends_on` cycle among the pending tasks, if any.
/// Edges run dependant -> dependency.
fn find_cycle(ids: &HashSet<&str>, deps: &HashMap<&str, Vec<&str>>) -> Option<Vec<String>> {
    fn dfs<'a>(
        node: &'a str,
        deps: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        on_stack: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        visited.insert(node);
        stack.push(node);
        on_stack.insert(node);

        if let Some(targets) = deps.get(node) {
            for &target in targets {
                if on_stack.contains(target) {
                    // Cycle: slice of the stack from the repeated node
                    let start = stack.iter().position(|&n| n == target).unwrap();
                    let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                    cycle.push(target.to_string());
                    return Some(cycle);
                }
                if !visited.contains(target)
                    && let Some(cycle) = dfs(target, deps, visited, stack, on_stack)
                {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        on_stack.remove(node);
        None
    }

    let mut visited = HashSet::new();
    let mut sorted: Vec<&&str> = ids.iter().collect();
    sorted.sort();
    for &&id in &sorted {
        if !visited.contains(id) {
            let mut stack = Vec::new();
            let mut on_stack = HashSet::new();
            if let Some(cycle) = dfs(id, deps, &mut visited, &mut stack, &mut on_stack) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Compute the execution plan for a list's pending tasks.
///
/// `edges` are `(dependant, dependency)` pairs; edges touching tasks outside
/// the pending set are ignored (those dependencies are already settled).
/// `cap` is the list's maximum-concurrent-workers soft limit.
///
/// Wave assignment is Kahn-style levelling with (position, display_id)
/// tie-break; tasks with a blocking file conflict against an earlier pick of
/// the same wave are demoted to the next wave (greedy first-fit, stable
/// across re-plans for unchanged inputs); waves wider than the cap split
/// into sub-waves.
pub fn plan(
    tasks: &[Task],
    edges: &[(String, String)],
    impacts: &HashMap<String, Vec<Impact>>,
    cap: usize,
) -> Result<ExecutionPlan, CoreError> {
    let pending: HashSet<&str> = tasks.iter().map(|t| t.id.as_str()).collect();

    // Dependencies restricted to the pending set
    let mut deps: HashMap<&str, Vec<&str>> = HashMap::new();
    for (from, to) in edges {
        if pending.contains(from.as_str()) && pending.contains(to.as_str()) {
            deps.entry(from.as_str()).or_default().push(to.as_str());
        }
    }

    if let Some(cycle) = find_cycle(&pending, &deps) {
        debug!(?cycle, "Plan rejected: dependency cycle");
        return Err(CoreError::CycleDetected { cycle });
    }

    let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let empty: Vec<Impact> = Vec::new();
    let impacts_of = |id: &str| impacts.get(id).unwrap_or(&empty);

    let cap = cap.max(1);
    let mut remaining: HashSet<&str> = pending.clone();
    let mut done: HashSet<&str> = HashSet::new();
    let mut waves: Vec<Wave> = Vec::new();

    while !remaining.is_empty() {
        // Tasks whose in-set dependencies are all placed in earlier waves
        let mut eligible: Vec<&Task> = remaining
            .iter()
            .filter(|id| {
                deps.get(*id)
                    .map(|targets| targets.iter().all(|t| done.contains(t)))
                    .unwrap_or(true)
            })
            .map(|id| by_id[*id])
            .collect();

        if eligible.is_empty() {
            // Unreachable after the cycle check above
            let cycle: Vec<String> = remaining.iter().map(|s| s.to_string()).collect();
            return Err(CoreError::CycleDetected { cycle });
        }

        eligible.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.display_id.cmp(&b.display_id)));

        // Greedy first-fit: a task conflicting with an earlier pick waits
        // for the next wave
        let mut picked: Vec<&Task> = Vec::new();
        for task in eligible {
            let blocked = picked
                .iter()
                .any(|other| has_blocking_conflict(impacts_of(&task.id), impacts_of(&other.id)));
            if !blocked {
                picked.push(task);
            }
        }

        let cap_limited = picked.len() > cap;
        for chunk in picked.chunks(cap) {
            waves.push(Wave {
                index: waves.len(),
                task_ids: chunk.iter().map(|t| t.id.clone()).collect(),
                count: chunk.len(),
                cap_limited,
            });
        }

        for task in &picked {
            remaining.remove(task.id.as_str());
            done.insert(task.id.as_str());
        }
    }

    let max_parallelism = waves.iter().map(|w| w.count).max().unwrap_or(0);
    debug!(waves = waves.len(), max_parallelism, "Plan computed");

    Ok(ExecutionPlan { waves, max_parallelism })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ImpactKind, ImpactOp};

    fn task(id: &str, position: i64) -> Task {
        Task::with_id(id, id, "list-1").with_position(position)
    }

    fn edge(from: &str, to: &str) -> (String, String) {
        (from.to_string(), to.to_string())
    }

    fn no_impacts() -> HashMap<String, Vec<Impact>> {
        HashMap::new()
    }

    #[test]
    fn test_single_task_single_wave() {
        let tasks = vec![task("t-1", 0)];
        let plan = plan(&tasks, &[], &no_impacts(), 5).unwrap();
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].count, 1);
        assert_eq!(plan.max_parallelism, 1);
    }

    #[test]
    fn test_dependency_levelling() {
        // t3 depends on t1; t1 and t2 independent
        let tasks = vec![task("t-1", 0), task("t-2", 1), task("t-3", 2)];
        let edges = vec![edge("t-3", "t-1")];
        let plan = plan(&tasks, &edges, &no_impacts(), 5).unwrap();

        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[0].task_ids, vec!["t-1", "t-2"]);
        assert_eq!(plan.waves[1].task_ids, vec!["t-3"]);
        assert_eq!(plan.max_parallelism, 2);
    }

    #[test]
    fn test_every_wave_task_has_deps_in_earlier_waves() {
        let tasks = vec![task("a", 0), task("b", 1), task("c", 2), task("d", 3)];
        let edges = vec![edge("b", "a"), edge("c", "a"), edge("d", "b"), edge("d", "c")];
        let plan = plan(&tasks, &edges, &no_impacts(), 10).unwrap();

        for wave in &plan.waves {
            for task_id in &wave.task_ids {
                for (from, to) in &edges {
                    if from == task_id {
                        let dep_wave = plan.wave_for_task(to).unwrap();
                        assert!(dep_wave < wave.index, "{} must run after {}", from, to);
                    }
                }
            }
        }
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let tasks = vec![task("a", 0), task("b", 1), task("c", 2)];
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("c", "a")];

        let err = plan(&tasks, &edges, &no_impacts(), 5).unwrap_err();
        match err {
            CoreError::CycleDetected { cycle } => {
                assert!(cycle.len() >= 3);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("Expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_edges_to_settled_tasks_ignored() {
        // t-1's dependency is not in the pending set (already completed)
        let tasks = vec![task("t-1", 0)];
        let edges = vec![edge("t-1", "t-0")];
        let plan = plan(&tasks, &edges, &no_impacts(), 5).unwrap();
        assert_eq!(plan.waves[0].task_ids, vec!["t-1"]);
    }

    #[test]
    fn test_conflicting_tasks_demoted() {
        let tasks = vec![task("t-1", 0), task("t-2", 1), task("t-3", 2)];
        let mut impacts = HashMap::new();
        for id in ["t-1", "t-2"] {
            impacts.insert(
                id.to_string(),
                vec![Impact::new(id, ImpactKind::File, ImpactOp::Update, "db/schema.sql")],
            );
        }

        let plan = plan(&tasks, &[], &impacts, 5).unwrap();
        // t-1 and t-2 collide: t-2 demoted; t-3 rides in wave 0
        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[0].task_ids, vec!["t-1", "t-3"]);
        assert_eq!(plan.waves[1].task_ids, vec!["t-2"]);
    }

    #[test]
    fn test_warning_conflicts_do_not_demote() {
        let tasks = vec![task("t-1", 0), task("t-2", 1)];
        let mut impacts = HashMap::new();
        impacts.insert(
            "t-1".to_string(),
            vec![Impact::new("t-1", ImpactKind::File, ImpactOp::Read, "config.yml")],
        );
        impacts.insert(
            "t-2".to_string(),
            vec![Impact::new("t-2", ImpactKind::File, ImpactOp::Update, "config.yml")],
        );

        let plan = plan(&tasks, &[], &impacts, 5).unwrap();
        assert_eq!(plan.waves.len(), 1);
        assert_eq!(plan.waves[0].count, 2);
    }

    #[test]
    fn test_cap_splits_waves() {
        let tasks: Vec<Task> = (0..5).map(|i| task(&format!("t-{}", i), i)).collect();
        let plan = plan(&tasks, &[], &no_impacts(), 2).unwrap();

        assert_eq!(plan.waves.len(), 3);
        assert!(plan.waves.iter().all(|w| w.count <= 2));
        assert!(plan.waves.iter().all(|w| w.cap_limited));
        assert_eq!(plan.max_parallelism, 2);
        assert_eq!(plan.task_count(), 5);
    }

    #[test]
    fn test_cap_not_binding_flag() {
        let tasks = vec![task("t-1", 0), task("t-2", 1)];
        let plan = plan(&tasks, &[], &no_impacts(), 5).unwrap();
        assert!(!plan.waves[0].cap_limited);
    }

    #[test]
    fn test_tie_break_position_then_display_id() {
        let mut a = task("t-a", 1);
        a.display_id = "TF-000002".to_string();
        let mut b = task("t-b", 1);
        b.display_id = "TF-000001".to_string();
        let mut c = task("t-c", 0);
        c.display_id = "TF-000009".to_string();

        let plan = plan(&[a, b, c], &[], &no_impacts(), 5).unwrap();
        assert_eq!(plan.waves[0].task_ids, vec!["t-c", "t-b", "t-a"]);
    }

    #[test]
    fn test_plan_is_stable_across_replans() {
        let tasks = vec![task("t-1", 0), task("t-2", 1), task("t-3", 2)];
        let edges = vec![edge("t-3", "t-1")];
        let first = plan(&tasks, &edges, &no_impacts(), 2).unwrap();
        let second = plan(&tasks, &edges, &no_impacts(), 2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_input_empty_plan() {
        let plan = plan(&[], &[], &no_impacts(), 5).unwrap();
        assert!(plan.waves.is_empty());
        assert_eq!(plan.max_parallelism, 0);
    }
}
