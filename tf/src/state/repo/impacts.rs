//! Impact row access

use eyre::{Result, eyre};
use workstore::{Row, Store, now_ms};

use crate::domain::Impact;

const COLUMNS: &str = "id, task_id, kind, op, target, symbol, signature, confidence, provenance, created_at, updated_at";

fn from_row(row: &Row) -> Result<Impact> {
    Ok(Impact {
        id: row.text("id")?,
        task_id: row.text("task_id")?,
        kind: row.text("kind")?.parse().map_err(|e: String| eyre!(e))?,
        op: row.text("op")?.parse().map_err(|e: String| eyre!(e))?,
        target: row.text("target")?,
        symbol: row.opt_text("symbol")?,
        signature: row.opt_text("signature")?,
        confidence: row.real("confidence")?,
        provenance: row.text("provenance")?.parse().map_err(|e: String| eyre!(e))?,
        created_at: row.integer("created_at")?,
        updated_at: row.integer("updated_at")?,
    })
}

pub fn insert(store: &mut Store, impact: &Impact) -> Result<()> {
    store.execute(
        "INSERT INTO impacts (id, task_id, kind, op, target, symbol, signature, confidence, provenance, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        &[
            impact.id.as_str().into(),
            impact.task_id.as_str().into(),
            impact.kind.to_string().into(),
            impact.op.to_string().into(),
            impact.target.as_str().into(),
            impact.symbol.clone().into(),
            impact.signature.clone().into(),
            impact.confidence.into(),
            impact.provenance.to_string().into(),
            impact.created_at.into(),
            impact.updated_at.into(),
        ],
    )?;
    Ok(())
}

pub fn update(store: &mut Store, impact: &Impact) -> Result<()> {
    store.execute(
        "UPDATE impacts SET kind = ?2, op = ?3, target = ?4, symbol = ?5, signature = ?6, \
         confidence = ?7, provenance = ?8, updated_at = ?9 WHERE id = ?1",
        &[
            impact.id.as_str().into(),
            impact.kind.to_string().into(),
            impact.op.to_string().into(),
            impact.target.as_str().into(),
            impact.symbol.clone().into(),
            impact.signature.clone().into(),
            impact.confidence.into(),
            impact.provenance.to_string().into(),
            now_ms().into(),
        ],
    )?;
    Ok(())
}

/// All impacts declared by a task, highest confidence first
pub fn list_for_task(store: &mut Store, task_id: &str) -> Result<Vec<Impact>> {
    let rows = store.query(
        &format!(
            "SELECT {} FROM impacts WHERE task_id = ?1 ORDER BY confidence DESC, target",
            COLUMNS
        ),
        &[task_id.into()],
    )?;
    rows.iter().map(from_row).collect()
}

/// Impacts for every task in a list, keyed by task at the call site
pub fn list_for_list(store: &mut Store, list_id: &str) -> Result<Vec<Impact>> {
    let rows = store.query(
        &format!(
            "SELECT {} FROM impacts WHERE task_id IN (SELECT id FROM tasks WHERE task_list_id = ?1) \
             ORDER BY task_id, target",
            COLUMNS
        ),
        &[list_id.into()],
    )?;
    rows.iter().map(from_row).collect()
}

/// Other tasks declaring an impact on any of the given task's targets
pub fn tasks_sharing_targets(store: &mut Store, task_id: &str) -> Result<Vec<String>> {
    let rows = store.query(
        "SELECT DISTINCT o.task_id FROM impacts o \
         JOIN impacts mine ON mine.target = o.target \
         WHERE mine.task_id = ?1 AND o.task_id != ?1 \
         ORDER BY o.task_id",
        &[task_id.into()],
    )?;
    rows.iter().map(|r| r.text("task_id")).collect()
}

pub fn delete_for_task(store: &mut Store, task_id: &str) -> Result<()> {
    store.execute("DELETE FROM impacts WHERE task_id = ?1", &[task_id.into()])?;
    Ok(())
}
