//! Task row access

use eyre::{Result, eyre};
use workstore::{Row, SqlValue, Store, now_ms};

use crate::domain::{Task, TaskStatus};

const COLUMNS: &str = "id, display_id, title, description, category, status, priority, effort, phase, \
     task_list_id, project_id, position, consecutive_failures, last_error, escalated, \
     escalated_at, blocked_by, created_at, updated_at";

pub fn from_row(row: &Row) -> Result<Task> {
    Ok(Task {
        id: row.text("id")?,
        display_id: row.text("display_id")?,
        title: row.text("title")?,
        description: row.text("description")?,
        category: row.text("category")?.parse().map_err(|e: String| eyre!(e))?,
        status: row.text("status")?.parse().map_err(|e: String| eyre!(e))?,
        priority: row.text("priority")?.parse().map_err(|e: String| eyre!(e))?,
        effort: row.text("effort")?.parse().map_err(|e: String| eyre!(e))?,
        phase: row.integer("phase")? as u32,
        task_list_id: row.opt_text("task_list_id")?,
        project_id: row.opt_text("project_id")?,
        position: row.integer("position")?,
        consecutive_failures: row.integer("consecutive_failures")? as u32,
        last_error: row.opt_text("last_error")?,
        escalated: row.boolean("escalated")?,
        escalated_at: row.opt_integer("escalated_at")?,
        blocked_by: row.opt_text("blocked_by")?,
        created_at: row.integer("created_at")?,
        updated_at: row.integer("updated_at")?,
    })
}

pub fn insert(store: &mut Store, task: &Task) -> Result<()> {
    store.execute(
        "INSERT INTO tasks (id, display_id, title, description, category, status, priority, effort, phase, \
         task_list_id, project_id, position, consecutive_failures, last_error, escalated, escalated_at, \
         blocked_by, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        &[
            task.id.as_str().into(),
            task.display_id.as_str().into(),
            task.title.as_str().into(),
            task.description.as_str().into(),
            task.category.to_string().into(),
            task.status.to_string().into(),
            task.priority.to_string().into(),
            task.effort.to_string().into(),
            task.phase.into(),
            task.task_list_id.clone().into(),
            task.project_id.clone().into(),
            task.position.into(),
            task.consecutive_failures.into(),
            task.last_error.clone().into(),
            task.escalated.into(),
            task.escalated_at.into(),
            task.blocked_by.clone().into(),
            task.created_at.into(),
            task.updated_at.into(),
        ],
    )?;
    Ok(())
}

pub fn update(store: &mut Store, task: &Task) -> Result<()> {
    let changed = store.execute(
        "UPDATE tasks SET title = ?2, description = ?3, category = ?4, status = ?5, priority = ?6, \
         effort = ?7, phase = ?8, task_list_id = ?9, project_id = ?10, position = ?11, \
         consecutive_failures = ?12, last_error = ?13, escalated = ?14, escalated_at = ?15, \
         blocked_by = ?16, updated_at = ?17 WHERE id = ?1",
        &[
            task.id.as_str().into(),
            task.title.as_str().into(),
            task.description.as_str().into(),
            task.category.to_string().into(),
            task.status.to_string().into(),
            task.priority.to_string().into(),
            task.effort.to_string().into(),
            task.phase.into(),
            task.task_list_id.clone().into(),
            task.project_id.clone().into(),
            task.position.into(),
            task.consecutive_failures.into(),
            task.last_error.clone().into(),
            task.escalated.into(),
            task.escalated_at.into(),
            task.blocked_by.clone().into(),
            now_ms().into(),
        ],
    )?;
    if changed == 0 {
        return Err(eyre!("Task not found: {}", task.id));
    }
    Ok(())
}

pub fn get(store: &mut Store, id: &str) -> Result<Option<Task>> {
    let row = store.query_one(
        &format!("SELECT {} FROM tasks WHERE id = ?1", COLUMNS),
        &[id.into()],
    )?;
    row.as_ref().map(from_row).transpose()
}

/// Tasks in a list ordered by position, optionally filtered by status
pub fn list_for_list(store: &mut Store, list_id: &str, status: Option<TaskStatus>) -> Result<Vec<Task>> {
    let rows = match status {
        Some(status) => store.query(
            &format!(
                "SELECT {} FROM tasks WHERE task_list_id = ?1 AND status = ?2 ORDER BY position, display_id",
                COLUMNS
            ),
            &[list_id.into(), status.to_string().into()],
        )?,
        None => store.query(
            &format!(
                "SELECT {} FROM tasks WHERE task_list_id = ?1 ORDER BY position, display_id",
                COLUMNS
            ),
            &[list_id.into()],
        )?,
    };
    rows.iter().map(from_row).collect()
}

/// Tasks sitting in the evaluation queue (no list membership)
pub fn list_evaluation_queue(store: &mut Store) -> Result<Vec<Task>> {
    let rows = store.query(
        &format!(
            "SELECT {} FROM tasks WHERE task_list_id IS NULL ORDER BY created_at",
            COLUMNS
        ),
        &[],
    )?;
    rows.iter().map(from_row).collect()
}

/// Pending tasks in a list whose dependencies are all completed or skipped
/// and which are not owned by a live worker, ordered by position.
pub fn ready_tasks(store: &mut Store, list_id: &str) -> Result<Vec<Task>> {
    let rows = store.query(
        &format!(
            "SELECT {} FROM tasks t WHERE t.task_list_id = ?1 AND t.status = 'pending' \
             AND NOT EXISTS ( \
                 SELECT 1 FROM relationships r JOIN tasks d ON d.id = r.to_task \
                 WHERE r.from_task = t.id AND r.kind = 'depends_on' \
                   AND d.status NOT IN ('completed', 'skipped')) \
             AND NOT EXISTS ( \
                 SELECT 1 FROM workers w WHERE w.task_id = t.id AND w.status != 'terminated') \
             ORDER BY t.position, t.display_id",
            COLUMNS
        ),
        &[list_id.into()],
    )?;
    rows.iter().map(from_row).collect()
}

/// Count of tasks in the list still in non-settled states
pub fn unsettled_count(store: &mut Store, list_id: &str) -> Result<i64> {
    let row = store.query_one(
        "SELECT COUNT(*) AS n FROM tasks WHERE task_list_id = ?1 \
         AND status IN ('pending', 'in_progress', 'validating', 'blocked')",
        &[list_id.into()],
    )?;
    row.map(|r| r.integer("n")).transpose().map(|n| n.unwrap_or(0))
}

/// Delete a task and everything it owns; records each removal in cleanup_log
pub fn delete_cascade(store: &mut Store, id: &str) -> Result<()> {
    let now = now_ms();
    for table in ["impacts", "appendices", "task_versions", "state_history", "notifications"] {
        store.execute(
            &format!("DELETE FROM {} WHERE task_id = ?1", table),
            &[id.into()],
        )?;
    }
    store.execute(
        "DELETE FROM relationships WHERE from_task = ?1 OR to_task = ?1",
        &[id.into()],
    )?;
    store.execute("DELETE FROM tasks WHERE id = ?1", &[id.into()])?;
    store.execute(
        "INSERT INTO cleanup_log (table_name, row_id, reason, created_at) VALUES ('tasks', ?1, 'task deletion cascade', ?2)",
        &[id.into(), now.into()],
    )?;
    Ok(())
}

/// Refresh a list's task counters (commit flush points)
pub fn refresh_list_counters(store: &mut Store, list_id: &str) -> Result<()> {
    store.execute(
        "UPDATE task_lists SET \
         total_tasks = (SELECT COUNT(*) FROM tasks WHERE task_list_id = ?1), \
         completed_tasks = (SELECT COUNT(*) FROM tasks WHERE task_list_id = ?1 AND status = 'completed'), \
         failed_tasks = (SELECT COUNT(*) FROM tasks WHERE task_list_id = ?1 AND status = 'failed'), \
         updated_at = ?2 \
         WHERE id = ?1",
        &[list_id.into(), now_ms().into()],
    )?;
    Ok(())
}

pub fn insert_list(store: &mut Store, list: &crate::domain::TaskList) -> Result<()> {
    store.execute(
        "INSERT INTO task_lists (id, name, project_id, status, max_concurrent, auto_approve, \
         total_tasks, completed_tasks, failed_tasks, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        &[
            list.id.as_str().into(),
            list.name.as_str().into(),
            list.project_id.clone().into(),
            list.status.to_string().into(),
            list.max_concurrent.into(),
            list.auto_approve.into(),
            list.total_tasks.into(),
            list.completed_tasks.into(),
            list.failed_tasks.into(),
            list.created_at.into(),
            list.updated_at.into(),
        ],
    )?;
    Ok(())
}

pub fn get_list(store: &mut Store, id: &str) -> Result<Option<crate::domain::TaskList>> {
    let row = store.query_one(
        "SELECT id, name, project_id, status, max_concurrent, auto_approve, total_tasks, \
         completed_tasks, failed_tasks, created_at, updated_at FROM task_lists WHERE id = ?1",
        &[id.into()],
    )?;
    row.map(|r| {
        Ok::<_, eyre::Report>(crate::domain::TaskList {
            id: r.text("id")?,
            name: r.text("name")?,
            project_id: r.opt_text("project_id")?,
            status: r.text("status")?.parse().map_err(|e: String| eyre!(e))?,
            max_concurrent: r.integer("max_concurrent")? as u32,
            auto_approve: r.boolean("auto_approve")?,
            total_tasks: r.integer("total_tasks")? as u32,
            completed_tasks: r.integer("completed_tasks")? as u32,
            failed_tasks: r.integer("failed_tasks")? as u32,
            created_at: r.integer("created_at")?,
            updated_at: r.integer("updated_at")?,
        })
    })
    .transpose()
}

pub fn update_list(store: &mut Store, list: &crate::domain::TaskList) -> Result<()> {
    let changed = store.execute(
        "UPDATE task_lists SET name = ?2, project_id = ?3, status = ?4, max_concurrent = ?5, \
         auto_approve = ?6, updated_at = ?7 WHERE id = ?1",
        &[
            list.id.as_str().into(),
            list.name.as_str().into(),
            list.project_id.clone().into(),
            list.status.to_string().into(),
            list.max_concurrent.into(),
            list.auto_approve.into(),
            now_ms().into(),
        ],
    )?;
    if changed == 0 {
        return Err(eyre!("List not found: {}", list.id));
    }
    Ok(())
}

/// Helper: bare status write without history bookkeeping (recovery paths)
pub fn write_status(store: &mut Store, id: &str, status: TaskStatus) -> Result<()> {
    store.execute(
        "UPDATE tasks SET status = ?2, updated_at = ?3 WHERE id = ?1",
        &[id.into(), status.to_string().into(), SqlValue::from(now_ms())],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RelationKind, Relationship, TaskList};

    fn store_with_list() -> (Store, TaskList) {
        let mut store = Store::open_in_memory().unwrap();
        let list = TaskList::with_id("list-1", "L");
        insert_list(&mut store, &list).unwrap();
        (store, list)
    }

    #[test]
    fn test_insert_get_roundtrip() {
        let (mut store, _) = store_with_list();
        let task = Task::with_id("task-1", "Do things", "list-1");
        insert(&mut store, &task).unwrap();

        let loaded = get(&mut store, "task-1").unwrap().unwrap();
        assert_eq!(loaded.title, "Do things");
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.task_list_id, Some("list-1".to_string()));
    }

    #[test]
    fn test_update_missing_task_errors() {
        let (mut store, _) = store_with_list();
        let task = Task::with_id("ghost", "Ghost", "list-1");
        assert!(update(&mut store, &task).is_err());
    }

    #[test]
    fn test_list_for_list_orders_by_position() {
        let (mut store, _) = store_with_list();
        insert(&mut store, &Task::with_id("t-b", "B", "list-1").with_position(2)).unwrap();
        insert(&mut store, &Task::with_id("t-a", "A", "list-1").with_position(1)).unwrap();

        let tasks = list_for_list(&mut store, "list-1", None).unwrap();
        assert_eq!(tasks[0].id, "t-a");
        assert_eq!(tasks[1].id, "t-b");
    }

    #[test]
    fn test_ready_tasks_respects_dependencies() {
        let (mut store, _) = store_with_list();
        insert(&mut store, &Task::with_id("t-1", "One", "list-1")).unwrap();
        insert(&mut store, &Task::with_id("t-2", "Two", "list-1")).unwrap();

        let rel = Relationship::new("t-2", "t-1", RelationKind::DependsOn);
        super::super::graph::insert_edge(&mut store, &rel).unwrap();

        let ready = ready_tasks(&mut store, "list-1").unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "t-1");

        // Complete t-1; t-2 becomes ready
        write_status(&mut store, "t-1", TaskStatus::Completed).unwrap();
        let ready = ready_tasks(&mut store, "list-1").unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "t-2");
    }

    #[test]
    fn test_ready_tasks_skipped_dependency_satisfies() {
        let (mut store, _) = store_with_list();
        insert(&mut store, &Task::with_id("t-1", "One", "list-1")).unwrap();
        insert(&mut store, &Task::with_id("t-2", "Two", "list-1")).unwrap();
        let rel = Relationship::new("t-2", "t-1", RelationKind::DependsOn);
        super::super::graph::insert_edge(&mut store, &rel).unwrap();

        write_status(&mut store, "t-1", TaskStatus::Skipped).unwrap();
        let ready = ready_tasks(&mut store, "list-1").unwrap();
        assert!(ready.iter().any(|t| t.id == "t-2"));
    }

    #[test]
    fn test_delete_cascade_removes_owned_rows() {
        let (mut store, _) = store_with_list();
        insert(&mut store, &Task::with_id("t-1", "One", "list-1")).unwrap();
        store
            .execute(
                "INSERT INTO impacts (id, task_id, kind, op, target, created_at, updated_at) \
                 VALUES ('i1', 't-1', 'file', 'UPDATE', 'x.rs', 0, 0)",
                &[],
            )
            .unwrap();

        delete_cascade(&mut store, "t-1").unwrap();
        assert!(get(&mut store, "t-1").unwrap().is_none());
        let impacts = store.query("SELECT id FROM impacts", &[]).unwrap();
        assert!(impacts.is_empty());
        let log = store.query("SELECT row_id FROM cleanup_log", &[]).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_refresh_list_counters() {
        let (mut store, _) = store_with_list();
        insert(&mut store, &Task::with_id("t-1", "One", "list-1")).unwrap();
        insert(&mut store, &Task::with_id("t-2", "Two", "list-1")).unwrap();
        write_status(&mut store, "t-1", TaskStatus::Completed).unwrap();

        refresh_list_counters(&mut store, "list-1").unwrap();
        let list = get_list(&mut store, "list-1").unwrap().unwrap();
        assert_eq!(list.total_tasks, 2);
        assert_eq!(list.completed_tasks, 1);
        assert_eq!(list.failed_tasks, 0);
    }

    #[test]
    fn test_unsettled_count() {
        let (mut store, _) = store_with_list();
        insert(&mut store, &Task::with_id("t-1", "One", "list-1")).unwrap();
        insert(&mut store, &Task::with_id("t-2", "Two", "list-1")).unwrap();
        assert_eq!(unsettled_count(&mut store, "list-1").unwrap(), 2);

        write_status(&mut store, "t-1", TaskStatus::Completed).unwrap();
        write_status(&mut store, "t-2", TaskStatus::Failed).unwrap();
        assert_eq!(unsettled_count(&mut store, "list-1").unwrap(), 0);
    }
}
