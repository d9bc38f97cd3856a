//! Persisted state layout
//!
//! Every table the orchestrator core reads or writes lives here. The schema
//! is applied idempotently on open. Rows are only removed by the core within
//! a single task-deletion cascade; the `cleanup_log` table is consulted by an
//! external retention job and never read by the core.

use eyre::{Context, Result};
use rusqlite::Connection;
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS tasks (
    id                    TEXT PRIMARY KEY,
    display_id            TEXT NOT NULL UNIQUE,
    title                 TEXT NOT NULL,
    description           TEXT NOT NULL DEFAULT '',
    category              TEXT NOT NULL,
    status                TEXT NOT NULL,
    priority              TEXT NOT NULL,
    effort                TEXT NOT NULL,
    phase                 INTEGER NOT NULL DEFAULT 1,
    task_list_id          TEXT,
    project_id            TEXT,
    position              INTEGER NOT NULL DEFAULT 0,
    consecutive_failures  INTEGER NOT NULL DEFAULT 0,
    last_error            TEXT,
    escalated             INTEGER NOT NULL DEFAULT 0,
    escalated_at          INTEGER,
    blocked_by            TEXT,
    created_at            INTEGER NOT NULL,
    updated_at            INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_list ON tasks(task_list_id);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);

CREATE TABLE IF NOT EXISTS task_lists (
    id               TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    project_id       TEXT,
    status           TEXT NOT NULL,
    max_concurrent   INTEGER NOT NULL DEFAULT 4,
    auto_approve     INTEGER NOT NULL DEFAULT 0,
    total_tasks      INTEGER NOT NULL DEFAULT 0,
    completed_tasks  INTEGER NOT NULL DEFAULT 0,
    failed_tasks     INTEGER NOT NULL DEFAULT 0,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS relationships (
    id          TEXT PRIMARY KEY,
    from_task   TEXT NOT NULL,
    to_task     TEXT NOT NULL,
    kind        TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    UNIQUE(from_task, to_task, kind)
);
CREATE INDEX IF NOT EXISTS idx_rel_from ON relationships(from_task);
CREATE INDEX IF NOT EXISTS idx_rel_to ON relationships(to_task);

CREATE TABLE IF NOT EXISTS impacts (
    id          TEXT PRIMARY KEY,
    task_id     TEXT NOT NULL,
    kind        TEXT NOT NULL,
    op          TEXT NOT NULL,
    target      TEXT NOT NULL,
    symbol      TEXT,
    signature   TEXT,
    confidence  REAL NOT NULL DEFAULT 0.5,
    provenance  TEXT NOT NULL DEFAULT 'ai',
    created_at  INTEGER NOT NULL,
    updated_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_impacts_task ON impacts(task_id);
CREATE INDEX IF NOT EXISTS idx_impacts_target ON impacts(target);

CREATE TABLE IF NOT EXISTS appendices (
    id          TEXT PRIMARY KEY,
    task_id     TEXT NOT NULL,
    kind        TEXT NOT NULL,
    content     TEXT,
    ref_id      TEXT,
    ref_table   TEXT,
    position    INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_appendices_task ON appendices(task_id);

CREATE TABLE IF NOT EXISTS task_versions (
    id             TEXT PRIMARY KEY,
    task_id        TEXT NOT NULL,
    version        INTEGER NOT NULL,
    snapshot       TEXT NOT NULL,
    change_reason  TEXT NOT NULL DEFAULT '',
    actor          TEXT NOT NULL DEFAULT 'system',
    checkpoint     TEXT,
    created_at     INTEGER NOT NULL,
    UNIQUE(task_id, version)
);
CREATE INDEX IF NOT EXISTS idx_versions_task ON task_versions(task_id);

CREATE TABLE IF NOT EXISTS state_history (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id      TEXT NOT NULL,
    from_status  TEXT NOT NULL,
    to_status    TEXT NOT NULL,
    actor        TEXT NOT NULL DEFAULT 'system',
    actor_kind   TEXT NOT NULL DEFAULT 'system',
    reason       TEXT,
    metadata     TEXT,
    created_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_task ON state_history(task_id);

CREATE TABLE IF NOT EXISTS workers (
    id                  TEXT PRIMARY KEY,
    task_id             TEXT,
    task_list_id        TEXT,
    pid                 INTEGER,
    hostname            TEXT NOT NULL DEFAULT '',
    status              TEXT NOT NULL,
    last_heartbeat_at   INTEGER,
    heartbeat_count     INTEGER NOT NULL DEFAULT 0,
    missed_heartbeats   INTEGER NOT NULL DEFAULT 0,
    tasks_completed     INTEGER NOT NULL DEFAULT 0,
    tasks_failed        INTEGER NOT NULL DEFAULT 0,
    spawned_at          INTEGER NOT NULL,
    terminated_at       INTEGER,
    termination_reason  TEXT,
    last_error          TEXT,
    last_error_hash     TEXT,
    resume_of           TEXT
);
CREATE INDEX IF NOT EXISTS idx_workers_task ON workers(task_id);
CREATE INDEX IF NOT EXISTS idx_workers_status ON workers(status);

CREATE TABLE IF NOT EXISTS heartbeats (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    worker_id    TEXT NOT NULL,
    task_id      TEXT,
    status       TEXT NOT NULL,
    progress     INTEGER,
    step         TEXT,
    memory_mb    REAL,
    cpu_percent  REAL,
    created_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_heartbeats_worker ON heartbeats(worker_id);

CREATE TABLE IF NOT EXISTS notifications (
    id          TEXT PRIMARY KEY,
    task_id     TEXT NOT NULL,
    kind        TEXT NOT NULL,
    message     TEXT NOT NULL,
    read        INTEGER NOT NULL DEFAULT 0,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS review_flags (
    id              TEXT PRIMARY KEY,
    task_id         TEXT NOT NULL,
    source_task_id  TEXT NOT NULL,
    action          TEXT NOT NULL,
    reason          TEXT NOT NULL DEFAULT '',
    status          TEXT NOT NULL DEFAULT 'pending',
    created_at      INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS prds (
    id                TEXT PRIMARY KEY,
    title             TEXT NOT NULL,
    success_criteria  TEXT NOT NULL DEFAULT '[]',
    constraints       TEXT NOT NULL DEFAULT '[]',
    created_at        INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS prd_links (
    id               TEXT PRIMARY KEY,
    prd_id           TEXT NOT NULL,
    task_id          TEXT NOT NULL,
    link_type        TEXT NOT NULL DEFAULT 'implements',
    requirement_ref  TEXT,
    created_at       INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_prd_links_prd ON prd_links(prd_id);

CREATE TABLE IF NOT EXISTS cleanup_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name  TEXT NOT NULL,
    row_id      TEXT NOT NULL,
    reason      TEXT NOT NULL DEFAULT '',
    created_at  INTEGER NOT NULL
);
"#;

/// Apply the schema to a fresh or existing database
pub fn apply(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).context("Failed to apply schema")?;
    debug!("Schema applied");
    Ok(())
}
