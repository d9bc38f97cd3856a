//! The Store - a locked SQLite connection with buffered writes
//!
//! Writes open a transaction lazily; `commit` flushes it. Queries run on the
//! same connection and therefore observe buffered writes, which lets a
//! handler read back its own uncommitted state before the final flush.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use fs2::FileExt;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::schema;
use crate::value::{Row, SqlValue};

/// Database file name inside the store directory
const DB_FILE: &str = "forge.db";

/// Lock file name inside the store directory
const LOCK_FILE: &str = ".lock";

/// Row-oriented SQLite store
pub struct Store {
    conn: Connection,
    /// Held for the lifetime of the store; protects against a second
    /// orchestrator opening the same directory.
    _lock: Option<File>,
    path: Option<PathBuf>,
    in_tx: bool,
}

impl Store {
    /// Open (or create) a store in the given directory
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).context("Failed to create store directory")?;

        let lock_path = dir.join(LOCK_FILE);
        let lock = File::create(&lock_path).context("Failed to create lock file")?;
        lock.try_lock_exclusive()
            .map_err(|_| eyre!("Store is locked by another process: {}", dir.display()))?;

        let db_path = dir.join(DB_FILE);
        let conn = Connection::open(&db_path).context("Failed to open database")?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("Failed to enable WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        schema::apply(&conn)?;

        info!(path = %db_path.display(), "Store opened");
        Ok(Self {
            conn,
            _lock: Some(lock),
            path: Some(db_path),
            in_tx: false,
        })
    }

    /// Open an in-memory store (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        schema::apply(&conn)?;
        Ok(Self {
            conn,
            _lock: None,
            path: None,
            in_tx: false,
        })
    }

    /// Path of the backing database file, if file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn ensure_tx(&mut self) -> Result<()> {
        if !self.in_tx {
            self.conn
                .execute_batch("BEGIN IMMEDIATE")
                .context("Failed to begin transaction")?;
            self.in_tx = true;
        }
        Ok(())
    }

    /// Execute a write statement; returns affected row count.
    ///
    /// The write lands in the buffered transaction and is not durable until
    /// [`Store::commit`].
    pub fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        self.ensure_tx()?;
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .with_context(|| format!("Failed to prepare: {}", sql))?;
        let changed = stmt
            .execute(rusqlite::params_from_iter(params.iter()))
            .with_context(|| format!("Failed to execute: {}", sql))?;
        Ok(changed)
    }

    /// Run a read query, returning all rows
    pub fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .with_context(|| format!("Failed to prepare: {}", sql))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt
            .query(rusqlite::params_from_iter(params.iter()))
            .with_context(|| format!("Failed to query: {}", sql))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().context("Failed to read row")? {
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).map(SqlValue::from_ref))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read column")?;
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    /// Run a read query expected to return at most one row
    pub fn query_one(&mut self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Flush all buffered writes. No-op when nothing is buffered.
    pub fn commit(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn
                .execute_batch("COMMIT")
                .context("Failed to commit")?;
            self.in_tx = false;
            debug!("Committed");
        }
        Ok(())
    }

    /// Discard all buffered writes
    pub fn rollback(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn
                .execute_batch("ROLLBACK")
                .context("Failed to rollback")?;
            self.in_tx = false;
            debug!("Rolled back");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn insert_task(store: &mut Store, id: &str) {
        store
            .execute(
                "INSERT INTO tasks (id, display_id, title, category, status, priority, effort, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'task', 'pending', 'P2', 'small', 0, 0)",
                &[id.into(), format!("T-{id}").into(), "Test".into()],
            )
            .unwrap();
    }

    #[test]
    fn test_open_creates_directory() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("nested").join("store");
        let store = Store::open(&dir).unwrap();
        assert!(store.path().unwrap().exists());
    }

    #[test]
    fn test_second_open_is_rejected_while_locked() {
        let temp = tempdir().unwrap();
        let _store = Store::open(temp.path()).unwrap();
        assert!(Store::open(temp.path()).is_err());
    }

    #[test]
    fn test_execute_and_query() {
        let mut store = Store::open_in_memory().unwrap();
        insert_task(&mut store, "task-1");
        insert_task(&mut store, "task-2");

        let rows = store
            .query("SELECT id FROM tasks ORDER BY id", &[])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("id").unwrap(), "task-1");
    }

    #[test]
    fn test_query_one() {
        let mut store = Store::open_in_memory().unwrap();
        insert_task(&mut store, "task-1");

        let row = store
            .query_one("SELECT title FROM tasks WHERE id = ?1", &["task-1".into()])
            .unwrap();
        assert_eq!(row.unwrap().text("title").unwrap(), "Test");

        let none = store
            .query_one("SELECT title FROM tasks WHERE id = ?1", &["missing".into()])
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_rollback_discards_buffered_writes() {
        let mut store = Store::open_in_memory().unwrap();
        insert_task(&mut store, "task-1");
        store.rollback().unwrap();

        let rows = store.query("SELECT id FROM tasks", &[]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_commit_persists_across_reopen() {
        let temp = tempdir().unwrap();
        {
            let mut store = Store::open(temp.path()).unwrap();
            insert_task(&mut store, "task-1");
            store.commit().unwrap();
        }
        let mut store = Store::open(temp.path()).unwrap();
        let rows = store.query("SELECT id FROM tasks", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_uncommitted_writes_visible_to_same_connection() {
        let mut store = Store::open_in_memory().unwrap();
        insert_task(&mut store, "task-1");
        // No commit yet - same connection still sees the row
        let rows = store.query("SELECT id FROM tasks", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_commit_without_writes_is_noop() {
        let mut store = Store::open_in_memory().unwrap();
        store.commit().unwrap();
        store.commit().unwrap();
    }
}
