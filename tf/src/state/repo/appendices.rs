//! Appendix row access

use eyre::{Result, eyre};
use workstore::{Row, Store};

use crate::domain::{Appendix, AppendixBody, AppendixKind};

fn from_row(row: &Row) -> Result<Appendix> {
    let body = match row.opt_text("content")? {
        Some(content) => AppendixBody::Inline { content },
        None => AppendixBody::Reference {
            ref_id: row
                .opt_text("ref_id")?
                .ok_or_else(|| eyre!("Appendix without content or reference"))?,
            ref_table: row.opt_text("ref_table")?.unwrap_or_default(),
        },
    };
    Ok(Appendix {
        id: row.text("id")?,
        task_id: row.text("task_id")?,
        kind: row.text("kind")?.parse().map_err(|e: String| eyre!(e))?,
        body,
        position: row.integer("position")?,
        created_at: row.integer("created_at")?,
    })
}

pub fn insert(store: &mut Store, appendix: &Appendix) -> Result<()> {
    let (content, ref_id, ref_table) = match &appendix.body {
        AppendixBody::Inline { content } => (Some(content.clone()), None, None),
        AppendixBody::Reference { ref_id, ref_table } => (None, Some(ref_id.clone()), Some(ref_table.clone())),
    };
    store.execute(
        "INSERT INTO appendices (id, task_id, kind, content, ref_id, ref_table, position, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        &[
            appendix.id.as_str().into(),
            appendix.task_id.as_str().into(),
            appendix.kind.to_string().into(),
            content.into(),
            ref_id.into(),
            ref_table.into(),
            appendix.position.into(),
            appendix.created_at.into(),
        ],
    )?;
    Ok(())
}

/// Appendices for a task in position order
pub fn list_for_task(store: &mut Store, task_id: &str) -> Result<Vec<Appendix>> {
    let rows = store.query(
        "SELECT id, task_id, kind, content, ref_id, ref_table, position, created_at \
         FROM appendices WHERE task_id = ?1 ORDER BY position, created_at",
        &[task_id.into()],
    )?;
    rows.iter().map(from_row).collect()
}

/// Gotcha-list appendices attached to tasks that impact the given target
pub fn gotchas_for_target(store: &mut Store, target: &str, limit: usize) -> Result<Vec<Appendix>> {
    let rows = store.query(
        "SELECT a.id, a.task_id, a.kind, a.content, a.ref_id, a.ref_table, a.position, a.created_at \
         FROM appendices a \
         JOIN impacts i ON i.task_id = a.task_id \
         WHERE a.kind = 'gotcha_list' AND i.target = ?1 \
         ORDER BY a.created_at DESC LIMIT ?2",
        &[target.into(), limit.into()],
    )?;
    rows.iter().map(from_row).collect()
}

pub fn has_kind(store: &mut Store, task_id: &str, kind: AppendixKind) -> Result<bool> {
    let row = store.query_one(
        "SELECT 1 AS present FROM appendices WHERE task_id = ?1 AND kind = ?2 LIMIT 1",
        &[task_id.into(), kind.to_string().into()],
    )?;
    Ok(row.is_some())
}
