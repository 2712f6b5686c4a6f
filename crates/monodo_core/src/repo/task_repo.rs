//! Task repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD and toggle APIs over canonical `tasks` storage.
//! - Persist scheduler bookkeeping (`last_notified_at`, legacy alerts).
//!
//! # Invariants
//! - Write paths call `Task::validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Scheduler bookkeeping for one pass is written in one transaction.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::task::{Category, NotificationSettings, Task, TaskId, TaskValidationError};
use log::warn;
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const TASK_SELECT_SQL: &str = "SELECT
    id,
    title,
    deadline,
    completed,
    created_at,
    completed_at,
    category,
    notify_enabled,
    notify_start_before_minutes,
    notify_interval_minutes,
    last_notified_at
FROM tasks";

const REQUIRED_TABLES: &[&str] = &["tasks", "legacy_alerts"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for task persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(TaskValidationError),
    Db(DbError),
    NotFound(TaskId),
    InvalidData(String),
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "task not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted task data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "connection schema version {actual_version} does not match expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "required table `{table}` is missing"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TaskValidationError> for RepoError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// One bookkeeping write produced by a scheduler pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationRecord {
    /// Configured reminder fired; becomes the task's `last_notified_at`.
    Configured { task_id: TaskId, at: i64 },
    /// Legacy one-shot warning fired; the id joins the alerted set.
    Legacy { task_id: TaskId, at: i64 },
}

/// Task store contract.
pub trait TaskRepository {
    /// Lists all tasks, newest first.
    fn list_tasks(&self) -> RepoResult<Vec<Task>>;
    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>>;
    /// Inserts a new task or replaces the stored record with the same id.
    fn upsert_task(&self, task: &Task) -> RepoResult<()>;
    fn remove_task(&self, id: TaskId) -> RepoResult<()>;
    /// Flips completion state and returns the updated record.
    fn toggle_completed(&self, id: TaskId, now: i64) -> RepoResult<Task>;
    fn record_notifications(&self, records: &[NotificationRecord]) -> RepoResult<()>;
    /// Ids that already received their legacy one-shot warning.
    fn legacy_alerted(&self) -> RepoResult<BTreeSet<TaskId>>;
}

/// Lists tasks, treating unreadable storage as an empty task list.
///
/// Partial recovery is never attempted: one bad row empties the result.
pub fn list_tasks_or_empty(repo: &impl TaskRepository) -> Vec<Task> {
    match repo.list_tasks() {
        Ok(tasks) => tasks,
        Err(err) => {
            warn!("event=tasks_load module=repo status=fallback_empty error={err}");
            Vec::new()
        }
    }
}

/// SQLite-backed task repository.
pub struct SqliteTaskRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteTaskRepository<'conn> {
    /// Wraps a connection after checking it was opened through `db::open_*`.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let expected_version = latest_version();
        let actual_version = current_user_version(conn)?;
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        for table in REQUIRED_TABLES {
            let exists: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
                [table],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(RepoError::MissingRequiredTable(*table));
            }
        }

        Ok(Self { conn })
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn list_tasks(&self) -> RepoResult<Vec<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} ORDER BY created_at DESC, id ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(parse_task_row(row)?);
        }
        Ok(tasks)
    }

    fn get_task(&self, id: TaskId) -> RepoResult<Option<Task>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_task_row(row)?));
        }
        Ok(None)
    }

    fn upsert_task(&self, task: &Task) -> RepoResult<()> {
        task.validate()?;
        write_task(self.conn, task)
    }

    fn remove_task(&self, id: TaskId) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1;", [id.to_string()])?;
        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }
        Ok(())
    }

    fn toggle_completed(&self, id: TaskId, now: i64) -> RepoResult<Task> {
        let tx = self.conn.unchecked_transaction()?;
        let mut task = self.get_task(id)?.ok_or(RepoError::NotFound(id))?;
        task.toggle_completed(now);
        task.validate()?;
        write_task(&tx, &task)?;
        tx.commit()?;
        Ok(task)
    }

    fn record_notifications(&self, records: &[NotificationRecord]) -> RepoResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        for record in records {
            match *record {
                NotificationRecord::Configured { task_id, at } => {
                    // A task deleted since the pass started simply matches no row.
                    tx.execute(
                        "UPDATE tasks SET last_notified_at = ?1 WHERE id = ?2;",
                        params![at, task_id.to_string()],
                    )?;
                }
                NotificationRecord::Legacy { task_id, at } => {
                    tx.execute(
                        "INSERT OR IGNORE INTO legacy_alerts (task_id, alerted_at)
                         SELECT ?1, ?2
                         WHERE EXISTS (SELECT 1 FROM tasks WHERE id = ?1);",
                        params![task_id.to_string(), at],
                    )?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn legacy_alerted(&self) -> RepoResult<BTreeSet<TaskId>> {
        let mut stmt = self.conn.prepare("SELECT task_id FROM legacy_alerts;")?;
        let mut rows = stmt.query([])?;
        let mut ids = BTreeSet::new();
        while let Some(row) = rows.next()? {
            let text: String = row.get(0)?;
            ids.insert(parse_task_id(&text, "legacy_alerts.task_id")?);
        }
        Ok(ids)
    }
}

fn write_task(conn: &Connection, task: &Task) -> RepoResult<()> {
    let settings = task.notification;
    conn.execute(
        "INSERT INTO tasks (
            id,
            title,
            deadline,
            completed,
            created_at,
            completed_at,
            category,
            notify_enabled,
            notify_start_before_minutes,
            notify_interval_minutes,
            last_notified_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        ON CONFLICT (id) DO UPDATE SET
            title = excluded.title,
            deadline = excluded.deadline,
            completed = excluded.completed,
            completed_at = excluded.completed_at,
            category = excluded.category,
            notify_enabled = excluded.notify_enabled,
            notify_start_before_minutes = excluded.notify_start_before_minutes,
            notify_interval_minutes = excluded.notify_interval_minutes,
            last_notified_at = excluded.last_notified_at;",
        params![
            task.id.to_string(),
            task.title.as_str(),
            task.deadline,
            bool_to_int(task.completed),
            task.created_at,
            task.completed_at,
            task.category.map(Category::as_str),
            settings.map(|value| bool_to_int(value.enabled)),
            settings.map(|value| value.start_before_minutes),
            settings.map(|value| value.interval_minutes),
            task.last_notified_at,
        ],
    )?;
    Ok(())
}

fn parse_task_row(row: &Row<'_>) -> RepoResult<Task> {
    let id_text: String = row.get("id")?;
    let id = parse_task_id(&id_text, "tasks.id")?;

    let category = match row.get::<_, Option<String>>("category")? {
        Some(value) => Some(Category::parse(&value).ok_or_else(|| {
            RepoError::InvalidData(format!("invalid category `{value}` in tasks.category"))
        })?),
        None => None,
    };

    let notification = match row.get::<_, Option<i64>>("notify_enabled")? {
        Some(enabled) => Some(NotificationSettings {
            enabled: int_to_bool(enabled, "tasks.notify_enabled")?,
            start_before_minutes: read_minutes(row, "notify_start_before_minutes")?,
            interval_minutes: read_minutes(row, "notify_interval_minutes")?,
        }),
        None => None,
    };

    let task = Task {
        id,
        title: row.get("title")?,
        deadline: row.get("deadline")?,
        completed: int_to_bool(row.get("completed")?, "tasks.completed")?,
        created_at: row.get("created_at")?,
        completed_at: row.get("completed_at")?,
        category,
        notification,
        last_notified_at: row.get("last_notified_at")?,
    };
    task.validate()?;
    Ok(task)
}

fn parse_task_id(value: &str, column: &str) -> RepoResult<TaskId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

fn read_minutes(row: &Row<'_>, column: &'static str) -> RepoResult<u32> {
    let value: Option<i64> = row.get(column)?;
    value
        .and_then(|minutes| u32::try_from(minutes).ok())
        .ok_or_else(|| {
            RepoError::InvalidData(format!("invalid minutes value {value:?} in tasks.{column}"))
        })
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
