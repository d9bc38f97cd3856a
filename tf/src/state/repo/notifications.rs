//! Notification and review-flag row access

use eyre::Result;
use workstore::{Store, now_ms};

use crate::domain::generate_id;

/// Insert a notification row for a task
pub fn notify(store: &mut Store, task_id: &str, kind: &str, message: &str) -> Result<String> {
    let id = generate_id("notify", kind);
    store.execute(
        "INSERT INTO notifications (id, task_id, kind, message, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        &[
            id.as_str().into(),
            task_id.into(),
            kind.into(),
            message.into(),
            now_ms().into(),
        ],
    )?;
    Ok(id)
}

pub fn notifications_for_task(store: &mut Store, task_id: &str) -> Result<Vec<(String, String)>> {
    let rows = store.query(
        "SELECT kind, message FROM notifications WHERE task_id = ?1 ORDER BY created_at",
        &[task_id.into()],
    )?;
    rows.iter()
        .map(|r| Ok((r.text("kind")?, r.text("message")?)))
        .collect()
}

/// Queue an effect for manual review
pub fn flag_for_review(store: &mut Store, task_id: &str, source_task_id: &str, action: &str, reason: &str) -> Result<String> {
    let id = generate_id("review", action);
    store.execute(
        "INSERT INTO review_flags (id, task_id, source_task_id, action, reason, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        &[
            id.as_str().into(),
            task_id.into(),
            source_task_id.into(),
            action.into(),
            reason.into(),
            now_ms().into(),
        ],
    )?;
    Ok(id)
}

pub fn pending_reviews_for_task(store: &mut Store, task_id: &str) -> Result<usize> {
    let row = store.query_one(
        "SELECT COUNT(*) AS n FROM review_flags WHERE task_id = ?1 AND status = 'pending'",
        &[task_id.into()],
    )?;
    Ok(row.map(|r| r.integer("n")).transpose()?.unwrap_or(0) as usize)
}
