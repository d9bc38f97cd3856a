//! Task version and state history row access

use eyre::{Result, eyre};
use workstore::{Row, Store};

use crate::domain::{StateHistoryEntry, TaskVersion};

fn version_from_row(row: &Row) -> Result<TaskVersion> {
    Ok(TaskVersion {
        id: row.text("id")?,
        task_id: row.text("task_id")?,
        version: row.integer("version")? as u32,
        snapshot: serde_json::from_str(&row.text("snapshot")?)?,
        change_reason: row.text("change_reason")?,
        actor: row.text("actor")?,
        checkpoint: row.opt_text("checkpoint")?,
        created_at: row.integer("created_at")?,
    })
}

pub fn insert_version(store: &mut Store, version: &TaskVersion) -> Result<()> {
    store.execute(
        "INSERT INTO task_versions (id, task_id, version, snapshot, change_reason, actor, checkpoint, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        &[
            version.id.as_str().into(),
            version.task_id.as_str().into(),
            version.version.into(),
            serde_json::to_string(&version.snapshot)?.into(),
            version.change_reason.as_str().into(),
            version.actor.as_str().into(),
            version.checkpoint.clone().into(),
            version.created_at.into(),
        ],
    )?;
    Ok(())
}

pub fn latest_version(store: &mut Store, task_id: &str) -> Result<Option<TaskVersion>> {
    let row = store.query_one(
        "SELECT id, task_id, version, snapshot, change_reason, actor, checkpoint, created_at \
         FROM task_versions WHERE task_id = ?1 ORDER BY version DESC LIMIT 1",
        &[task_id.into()],
    )?;
    row.as_ref().map(version_from_row).transpose()
}

pub fn list_versions(store: &mut Store, task_id: &str) -> Result<Vec<TaskVersion>> {
    let rows = store.query(
        "SELECT id, task_id, version, snapshot, change_reason, actor, checkpoint, created_at \
         FROM task_versions WHERE task_id = ?1 ORDER BY version",
        &[task_id.into()],
    )?;
    rows.iter().map(version_from_row).collect()
}

pub fn append_history(store: &mut Store, entry: &StateHistoryEntry) -> Result<()> {
    store.execute(
        "INSERT INTO state_history (task_id, from_status, to_status, actor, actor_kind, reason, metadata, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        &[
            entry.task_id.as_str().into(),
            entry.from_status.as_str().into(),
            entry.to_status.as_str().into(),
            entry.actor.as_str().into(),
            entry.actor_kind.to_string().into(),
            entry.reason.clone().into(),
            entry
                .metadata
                .as_ref()
                .map(|m| serde_json::to_string(m))
                .transpose()?
                .into(),
            entry.created_at.into(),
        ],
    )?;
    Ok(())
}

pub fn list_history(store: &mut Store, task_id: &str) -> Result<Vec<StateHistoryEntry>> {
    let rows = store.query(
        "SELECT task_id, from_status, to_status, actor, actor_kind, reason, metadata, created_at \
         FROM state_history WHERE task_id = ?1 ORDER BY id",
        &[task_id.into()],
    )?;
    rows.iter()
        .map(|r| {
            Ok(StateHistoryEntry {
                task_id: r.text("task_id")?,
                from_status: r.text("from_status")?,
                to_status: r.text("to_status")?,
                actor: r.text("actor")?,
                actor_kind: r.text("actor_kind")?.parse().map_err(|e: String| eyre!(e))?,
                reason: r.opt_text("reason")?,
                metadata: r
                    .opt_text("metadata")?
                    .map(|m| serde_json::from_str(&m))
                    .transpose()?,
                created_at: r.integer("created_at")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_roundtrip_and_monotony() {
        let mut store = Store::open_in_memory().unwrap();
        insert_version(&mut store, &TaskVersion::new("t-1", 1, json!({"title": "A"}), "created")).unwrap();
        insert_version(&mut store, &TaskVersion::new("t-1", 2, json!({"title": "B"}), "renamed")).unwrap();

        let latest = latest_version(&mut store, "t-1").unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.snapshot["title"], "B");

        let all = list_versions(&mut store, "t-1").unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].version, 1);
    }

    #[test]
    fn test_duplicate_version_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        insert_version(&mut store, &TaskVersion::new("t-1", 1, json!({}), "created")).unwrap();
        assert!(insert_version(&mut store, &TaskVersion::new("t-1", 1, json!({}), "dup")).is_err());
    }

    #[test]
    fn test_history_append_order() {
        let mut store = Store::open_in_memory().unwrap();
        append_history(&mut store, &StateHistoryEntry::new("t-1", "pending", "in_progress")).unwrap();
        append_history(
            &mut store,
            &StateHistoryEntry::new("t-1", "in_progress", "completed").with_reason("exit 0"),
        )
        .unwrap();

        let history = list_history(&mut store, "t-1").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].to_status, "in_progress");
        assert_eq!(history[1].reason, Some("exit 0".to_string()));
    }
}
