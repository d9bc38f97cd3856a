//! Dependency graph queries
//!
//! The graph is stored as edges only. Cycle detection and dependent-closure
//! walks are bounded recursive CTEs executed in the store, keeping the core
//! stateless with respect to graph topology.

use eyre::Result;
use workstore::Store;

use crate::domain::{RelationKind, Relationship};

/// Closure CTEs stop at this depth
pub const CLOSURE_MAX_DEPTH: i64 = 20;

/// Insert an edge (already canonicalised by `Relationship::new`).
/// Duplicate edges are ignored.
pub fn insert_edge(store: &mut Store, rel: &Relationship) -> Result<()> {
    store.execute(
        "INSERT OR IGNORE INTO relationships (id, from_task, to_task, kind, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        &[
            rel.id.as_str().into(),
            rel.from_task.as_str().into(),
            rel.to_task.as_str().into(),
            rel.kind.to_string().into(),
            rel.created_at.into(),
        ],
    )?;
    Ok(())
}

pub fn remove_edge(store: &mut Store, from_task: &str, to_task: &str, kind: RelationKind) -> Result<bool> {
    let changed = store.execute(
        "DELETE FROM relationships WHERE from_task = ?1 AND to_task = ?2 AND kind = ?3",
        &[from_task.into(), to_task.into(), kind.to_string().into()],
    )?;
    Ok(changed > 0)
}

/// Would adding `a depends_on b` close a cycle?
///
/// Returns the cycle path (ending back at `a`) when the transitive
/// `depends_on` closure of `b` already contains `a`.
pub fn dependency_cycle(store: &mut Store, a: &str, b: &str) -> Result<Option<Vec<String>>> {
    if a == b {
        return Ok(Some(vec![a.to_string(), a.to_string()]));
    }
    let row = store.query_one(
        "WITH RECURSIVE closure(id, path, depth) AS ( \
             SELECT to_task, ?1 || '>' || to_task, 1 \
             FROM relationships WHERE from_task = ?1 AND kind = 'depends_on' \
             UNION ALL \
             SELECT r.to_task, c.path || '>' || r.to_task, c.depth + 1 \
             FROM relationships r JOIN closure c ON r.from_task = c.id \
             WHERE r.kind = 'depends_on' AND c.depth < ?3 \
         ) \
         SELECT path FROM closure WHERE id = ?2 LIMIT 1",
        &[b.into(), a.into(), CLOSURE_MAX_DEPTH.into()],
    )?;

    match row {
        Some(row) => {
            // Path runs b > ... > a; the rejected edge a -> b closes the loop
            let mut cycle: Vec<String> = row.text("path")?.split('>').map(str::to_string).collect();
            cycle.push(b.to_string());
            Ok(Some(cycle))
        }
        None => Ok(None),
    }
}

/// Direct `depends_on` targets of a task
pub fn dependencies_of(store: &mut Store, task_id: &str) -> Result<Vec<String>> {
    let rows = store.query(
        "SELECT to_task FROM relationships WHERE from_task = ?1 AND kind = 'depends_on' ORDER BY to_task",
        &[task_id.into()],
    )?;
    rows.iter().map(|r| r.text("to_task")).collect()
}

/// Direct dependents (tasks with a `depends_on` arrow pointing at this task)
pub fn dependents_of(store: &mut Store, task_id: &str) -> Result<Vec<String>> {
    let rows = store.query(
        "SELECT from_task FROM relationships WHERE to_task = ?1 AND kind = 'depends_on' ORDER BY from_task",
        &[task_id.into()],
    )?;
    rows.iter().map(|r| r.text("from_task")).collect()
}

/// Count of a task's `depends_on` targets not yet completed or skipped
pub fn unmet_dependency_count(store: &mut Store, task_id: &str) -> Result<usize> {
    let row = store.query_one(
        "SELECT COUNT(*) AS n FROM relationships r JOIN tasks d ON d.id = r.to_task \
         WHERE r.from_task = ?1 AND r.kind = 'depends_on' \
           AND d.status NOT IN ('completed', 'skipped')",
        &[task_id.into()],
    )?;
    Ok(row.map(|r| r.integer("n")).transpose()?.unwrap_or(0) as usize)
}

/// Pending tasks in the same list reachable by following `depends_on` arrows
/// in reverse from `task_id`, bounded at depth 20. These are the tasks a
/// failure must block.
pub fn pending_dependents_closure(store: &mut Store, task_id: &str, list_id: &str) -> Result<Vec<String>> {
    let rows = store.query(
        "WITH RECURSIVE dependents(id, depth) AS ( \
             SELECT from_task, 1 FROM relationships WHERE to_task = ?1 AND kind = 'depends_on' \
             UNION \
             SELECT r.from_task, d.depth + 1 \
             FROM relationships r JOIN dependents d ON r.to_task = d.id \
             WHERE r.kind = 'depends_on' AND d.depth < ?3 \
         ) \
         SELECT DISTINCT t.id FROM dependents d JOIN tasks t ON t.id = d.id \
         WHERE t.task_list_id = ?2 AND t.status = 'pending' \
         ORDER BY t.id",
        &[task_id.into(), list_id.into(), CLOSURE_MAX_DEPTH.into()],
    )?;
    rows.iter().map(|r| r.text("id")).collect()
}

/// Inverse-dependency adjacency walk for the cascade propagator: direct
/// dependents of each task in `frontier`, regardless of status.
pub fn dependents_of_many(store: &mut Store, frontier: &[String]) -> Result<Vec<(String, String)>> {
    let mut edges = Vec::new();
    for task_id in frontier {
        for dependent in dependents_of(store, task_id)? {
            edges.push((task_id.clone(), dependent));
        }
    }
    Ok(edges)
}

/// All `depends_on` edges with both endpoints inside the list
pub fn edges_within_list(store: &mut Store, list_id: &str) -> Result<Vec<(String, String)>> {
    let rows = store.query(
        "SELECT r.from_task, r.to_task FROM relationships r \
         JOIN tasks f ON f.id = r.from_task \
         JOIN tasks t ON t.id = r.to_task \
         WHERE r.kind = 'depends_on' AND f.task_list_id = ?1 AND t.task_list_id = ?1",
        &[list_id.into()],
    )?;
    rows.iter()
        .map(|r| Ok((r.text("from_task")?, r.text("to_task")?)))
        .collect()
}
