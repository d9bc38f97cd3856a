//! Worker and heartbeat row access

use eyre::{Result, eyre};
use workstore::{Row, Store, now_ms};

use crate::domain::{Heartbeat, WorkerInstance, WorkerStatus};

const COLUMNS: &str = "id, task_id, task_list_id, pid, hostname, status, last_heartbeat_at, heartbeat_count, \
     missed_heartbeats, tasks_completed, tasks_failed, spawned_at, terminated_at, termination_reason, \
     last_error, last_error_hash, resume_of";

fn from_row(row: &Row) -> Result<WorkerInstance> {
    Ok(WorkerInstance {
        id: row.text("id")?,
        task_id: row.opt_text("task_id")?,
        task_list_id: row.opt_text("task_list_id")?,
        pid: row.opt_integer("pid")?.map(|p| p as u32),
        hostname: row.text("hostname")?,
        status: row.text("status")?.parse().map_err(|e: String| eyre!(e))?,
        last_heartbeat_at: row.opt_integer("last_heartbeat_at")?,
        heartbeat_count: row.integer("heartbeat_count")? as u32,
        missed_heartbeats: row.integer("missed_heartbeats")? as u32,
        tasks_completed: row.integer("tasks_completed")? as u32,
        tasks_failed: row.integer("tasks_failed")? as u32,
        spawned_at: row.integer("spawned_at")?,
        terminated_at: row.opt_integer("terminated_at")?,
        termination_reason: row.opt_text("termination_reason")?,
        last_error: row.opt_text("last_error")?,
        last_error_hash: row.opt_text("last_error_hash")?,
        resume_of: row.opt_text("resume_of")?,
    })
}

pub fn insert(store: &mut Store, worker: &WorkerInstance) -> Result<()> {
    store.execute(
        "INSERT INTO workers (id, task_id, task_list_id, pid, hostname, status, last_heartbeat_at, \
         heartbeat_count, missed_heartbeats, tasks_completed, tasks_failed, spawned_at, terminated_at, \
         termination_reason, last_error, last_error_hash, resume_of) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        &[
            worker.id.as_str().into(),
            worker.task_id.clone().into(),
            worker.task_list_id.clone().into(),
            worker.pid.map(|p| p as i64).into(),
            worker.hostname.as_str().into(),
            worker.status.to_string().into(),
            worker.last_heartbeat_at.into(),
            worker.heartbeat_count.into(),
            worker.missed_heartbeats.into(),
            worker.tasks_completed.into(),
            worker.tasks_failed.into(),
            worker.spawned_at.into(),
            worker.terminated_at.into(),
            worker.termination_reason.clone().into(),
            worker.last_error.clone().into(),
            worker.last_error_hash.clone().into(),
            worker.resume_of.clone().into(),
        ],
    )?;
    Ok(())
}

pub fn update(store: &mut Store, worker: &WorkerInstance) -> Result<()> {
    let changed = store.execute(
        "UPDATE workers SET task_id = ?2, task_list_id = ?3, pid = ?4, status = ?5, \
         last_heartbeat_at = ?6, heartbeat_count = ?7, missed_heartbeats = ?8, tasks_completed = ?9, \
         tasks_failed = ?10, terminated_at = ?11, termination_reason = ?12, last_error = ?13, \
         last_error_hash = ?14 WHERE id = ?1",
        &[
            worker.id.as_str().into(),
            worker.task_id.clone().into(),
            worker.task_list_id.clone().into(),
            worker.pid.map(|p| p as i64).into(),
            worker.status.to_string().into(),
            worker.last_heartbeat_at.into(),
            worker.heartbeat_count.into(),
            worker.missed_heartbeats.into(),
            worker.tasks_completed.into(),
            worker.tasks_failed.into(),
            worker.terminated_at.into(),
            worker.termination_reason.clone().into(),
            worker.last_error.clone().into(),
            worker.last_error_hash.clone().into(),
        ],
    )?;
    if changed == 0 {
        return Err(eyre!("Worker not found: {}", worker.id));
    }
    Ok(())
}

pub fn get(store: &mut Store, id: &str) -> Result<Option<WorkerInstance>> {
    let row = store.query_one(
        &format!("SELECT {} FROM workers WHERE id = ?1", COLUMNS),
        &[id.into()],
    )?;
    row.as_ref().map(from_row).transpose()
}

/// The live (non-terminated) worker owning a task, if any.
/// At most one exists per task by invariant.
pub fn live_worker_for_task(store: &mut Store, task_id: &str) -> Result<Option<WorkerInstance>> {
    let row = store.query_one(
        &format!(
            "SELECT {} FROM workers WHERE task_id = ?1 AND status != 'terminated' LIMIT 1",
            COLUMNS
        ),
        &[task_id.into()],
    )?;
    row.as_ref().map(from_row).transpose()
}

/// All non-terminated workers, optionally scoped to a list
pub fn list_active(store: &mut Store, list_id: Option<&str>) -> Result<Vec<WorkerInstance>> {
    let rows = match list_id {
        Some(list_id) => store.query(
            &format!(
                "SELECT {} FROM workers WHERE status != 'terminated' AND task_list_id = ?1 ORDER BY spawned_at",
                COLUMNS
            ),
            &[list_id.into()],
        )?,
        None => store.query(
            &format!(
                "SELECT {} FROM workers WHERE status != 'terminated' ORDER BY spawned_at",
                COLUMNS
            ),
            &[],
        )?,
    };
    rows.iter().map(from_row).collect()
}

/// Most recent workers for a task, newest first (post-mortem/diagnosis)
pub fn recent_for_task(store: &mut Store, task_id: &str, limit: usize) -> Result<Vec<WorkerInstance>> {
    let rows = store.query(
        &format!(
            "SELECT {} FROM workers WHERE task_id = ?1 ORDER BY spawned_at DESC LIMIT ?2",
            COLUMNS
        ),
        &[task_id.into(), limit.into()],
    )?;
    rows.iter().map(from_row).collect()
}

/// Distinct error messages recorded across a task's workers, newest first
pub fn distinct_errors_for_task(store: &mut Store, task_id: &str, limit: usize) -> Result<Vec<String>> {
    let rows = store.query(
        "SELECT last_error, MAX(spawned_at) AS latest FROM workers \
         WHERE task_id = ?1 AND last_error IS NOT NULL \
         GROUP BY last_error ORDER BY latest DESC LIMIT ?2",
        &[task_id.into(), limit.into()],
    )?;
    rows.iter().map(|r| r.text("last_error")).collect()
}

/// Append a heartbeat row and fold it into the worker aggregates.
///
/// Heartbeats for terminated workers are dropped (out-of-band arrival after
/// the exit event). A replay of the same heartbeat (same worker, same
/// timestamp) refreshes `last_heartbeat_at` without growing the count.
/// Returns whether the heartbeat was accepted.
pub fn record_heartbeat(store: &mut Store, hb: &Heartbeat) -> Result<bool> {
    let Some(worker) = get(store, &hb.worker_id)? else {
        return Ok(false);
    };
    if worker.status == WorkerStatus::Terminated {
        return Ok(false);
    }

    let replay = store
        .query_one(
            "SELECT 1 AS present FROM heartbeats WHERE worker_id = ?1 AND created_at = ?2 LIMIT 1",
            &[hb.worker_id.as_str().into(), hb.created_at.into()],
        )?
        .is_some();
    if replay {
        store.execute(
            "UPDATE workers SET last_heartbeat_at = ?2 WHERE id = ?1",
            &[hb.worker_id.as_str().into(), now_ms().into()],
        )?;
        return Ok(true);
    }

    store.execute(
        "INSERT INTO heartbeats (worker_id, task_id, status, progress, step, memory_mb, cpu_percent, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        &[
            hb.worker_id.as_str().into(),
            hb.task_id.clone().into(),
            hb.status.as_str().into(),
            hb.progress.map(|p| p as i64).into(),
            hb.step.clone().into(),
            hb.memory_mb.into(),
            hb.cpu_percent.into(),
            hb.created_at.into(),
        ],
    )?;
    store.execute(
        "UPDATE workers SET last_heartbeat_at = ?2, heartbeat_count = heartbeat_count + 1, \
         missed_heartbeats = 0, status = CASE WHEN status = 'spawning' THEN 'running' ELSE status END \
         WHERE id = ?1",
        &[hb.worker_id.as_str().into(), now_ms().into()],
    )?;
    Ok(true)
}

/// Heartbeat rows for a worker in receipt order
pub fn heartbeats_for_worker(store: &mut Store, worker_id: &str) -> Result<usize> {
    let row = store.query_one(
        "SELECT COUNT(*) AS n FROM heartbeats WHERE worker_id = ?1",
        &[worker_id.into()],
    )?;
    Ok(row.map(|r| r.integer("n")).transpose()?.unwrap_or(0) as usize)
}
