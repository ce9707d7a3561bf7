//! Database repository layer
//!
//! Task insert and filtered listing. Listing only accepts a
//! [`CompiledFilter`], so every WHERE condition that reaches SQLite was
//! produced by the filter compiler.

use crate::error::{Error, Result};
use crate::filter::{CompiledFilter, DONE_STATE};
use crate::types::{NewTask, Task, INBOX_STATE};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite's `datetime()` output format. Timestamps are stored this way so
/// that `datetime('now', ?)` comparisons work on the raw column.
const SQLITE_TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const TASK_COLUMNS: &str =
    "t.id, t.title, t.notes, t.state, t.due_on, t.created_at, t.updated_at, t.completed_at";

/// Database connection wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.connection();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock leaves the connection itself usable.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ============================================
    // Task operations
    // ============================================

    /// Insert a task with its project, context and meta links.
    /// Returns the new task id.
    pub fn insert_task(&self, task: &NewTask) -> Result<i64> {
        if task.title.trim().is_empty() {
            return Err(Error::InvalidInput("task title must not be empty".to_string()));
        }

        let mut conn = self.connection();
        let tx = conn.transaction()?;

        let state = task.state.as_deref().unwrap_or(INBOX_STATE);
        let completed_at = (state == DONE_STATE).then(|| format_ts(Utc::now()));
        tx.execute(
            r#"
            INSERT INTO tasks (title, notes, state, due_on, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![task.title.trim(), task.notes, state, task.due_on, completed_at],
        )?;
        let id = tx.last_insert_rowid();

        for name in &task.projects {
            tx.execute(
                "INSERT OR IGNORE INTO projects (name) VALUES (?1)",
                [name],
            )?;
            tx.execute(
                r#"
                INSERT OR IGNORE INTO task_project_links (task_id, project_id)
                SELECT ?1, id FROM projects WHERE name = ?2
                "#,
                params![id, name],
            )?;
        }

        for name in &task.contexts {
            tx.execute(
                "INSERT OR IGNORE INTO contexts (name) VALUES (?1)",
                [name],
            )?;
            tx.execute(
                r#"
                INSERT OR IGNORE INTO task_context_links (task_id, context_id)
                SELECT ?1, id FROM contexts WHERE name = ?2
                "#,
                params![id, name],
            )?;
        }

        for (key, value) in &task.meta {
            tx.execute(
                "INSERT OR REPLACE INTO task_meta (task_id, key, value) VALUES (?1, ?2, ?3)",
                params![id, key, value],
            )?;
        }

        tx.commit()?;
        tracing::debug!(task_id = id, state, "Inserted task");
        Ok(id)
    }

    /// Get a task by ID
    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let conn = self.connection();
        let sql = format!("SELECT {TASK_COLUMNS} FROM tasks t WHERE t.id = ?1");
        let task = conn
            .query_row(&sql, [id], Self::row_to_task)
            .optional()?;
        match task {
            Some(mut task) => {
                load_links(&conn, &mut task)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// List tasks matching a compiled filter, ordered by id.
    pub fn list_tasks(&self, filter: &CompiledFilter) -> Result<Vec<Task>> {
        let conn = self.connection();
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t WHERE {} ORDER BY t.id",
            filter.sql()
        );
        tracing::trace!(%sql, args = filter.args().len(), "Listing tasks");

        let mut stmt = conn.prepare(&sql)?;
        let mut tasks = stmt
            .query_map(filter.params().as_slice(), Self::row_to_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for task in &mut tasks {
            load_links(&conn, task)?;
        }
        Ok(tasks)
    }

    /// Move a task to a new state. Entering `done` stamps `completed_at`;
    /// leaving it clears the stamp. Returns false when no such task exists.
    pub fn set_task_state(&self, id: i64, state: &str) -> Result<bool> {
        let conn = self.connection();
        let now = format_ts(Utc::now());
        let completed_at = (state == DONE_STATE).then(|| now.clone());
        let changed = conn.execute(
            r#"
            UPDATE tasks
            SET state = ?2, completed_at = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
            params![id, state, completed_at, now],
        )?;
        Ok(changed > 0)
    }

    /// Total number of stored tasks
    pub fn count_tasks(&self) -> Result<i64> {
        let conn = self.connection();
        conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))
            .map_err(Error::from)
    }

    fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;
        Ok(Task {
            id: row.get("id")?,
            title: row.get("title")?,
            notes: row.get("notes")?,
            state: row.get("state")?,
            due_on: row.get("due_on")?,
            projects: Vec::new(),
            contexts: Vec::new(),
            meta: BTreeMap::new(),
            created_at: parse_ts(&created_at),
            updated_at: parse_ts(&updated_at),
            completed_at: completed_at.as_deref().map(parse_ts),
        })
    }
}

fn load_links(conn: &Connection, task: &mut Task) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        r#"
        SELECT p.name FROM task_project_links tpl
        JOIN projects p ON p.id = tpl.project_id
        WHERE tpl.task_id = ?1 ORDER BY p.name
        "#,
    )?;
    task.projects = stmt
        .query_map([task.id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut stmt = conn.prepare_cached(
        r#"
        SELECT c.name FROM task_context_links tcl
        JOIN contexts c ON c.id = tcl.context_id
        WHERE tcl.task_id = ?1 ORDER BY c.name
        "#,
    )?;
    task.contexts = stmt
        .query_map([task.id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut stmt = conn.prepare_cached("SELECT key, value FROM task_meta WHERE task_id = ?1")?;
    task.meta = stmt
        .query_map([task.id], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<BTreeMap<String, String>>>()?;

    Ok(())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(SQLITE_TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, SQLITE_TS_FORMAT)
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .unwrap_or_else(|_| Utc::now())
}
