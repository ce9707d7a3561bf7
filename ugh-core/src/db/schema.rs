//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: tasks with project/context links and metadata
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        title            TEXT NOT NULL,
        notes            TEXT,
        state            TEXT NOT NULL DEFAULT 'inbox',
        due_on           TEXT,
        created_at       DATETIME NOT NULL DEFAULT (datetime('now')),
        updated_at       DATETIME NOT NULL DEFAULT (datetime('now')),
        completed_at     DATETIME
    );

    CREATE TABLE IF NOT EXISTS projects (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        name             TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS contexts (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        name             TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS task_project_links (
        task_id          INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        project_id       INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        PRIMARY KEY (task_id, project_id)
    );

    CREATE TABLE IF NOT EXISTS task_context_links (
        task_id          INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        context_id       INTEGER NOT NULL REFERENCES contexts(id) ON DELETE CASCADE,
        PRIMARY KEY (task_id, context_id)
    );

    CREATE TABLE IF NOT EXISTS task_meta (
        task_id          INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
        key              TEXT NOT NULL,
        value            TEXT NOT NULL,
        PRIMARY KEY (task_id, key)
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_state ON tasks(state);
    CREATE INDEX IF NOT EXISTS idx_tasks_due_on ON tasks(due_on);
    CREATE INDEX IF NOT EXISTS idx_tasks_updated_at ON tasks(updated_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Applying database migration");
            conn.execute_batch(migration)?;
            conn.pragma_update(None, "user_version", version)?;
        }
    }

    Ok(())
}
