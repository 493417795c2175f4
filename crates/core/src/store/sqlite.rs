//! Embedded SQLite task store
//!
//! A single worker thread owns the `rusqlite::Connection`; async callers send
//! it closures and await the reply on a oneshot channel. The bootstrap script
//! runs inside one transaction before the store is handed out, so a failing
//! script leaves no partial schema behind.

use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::schema::{split_statements, SQLITE_INIT};
use crate::task::{validate_name, Report, Task, TaskStore, LATEST_LIMIT, SESSION_OWNER};
use crate::{Error, Result};

const TASK_COLUMNS: &str = "t.id, t.task_name, t.start_time, t.elapsed_time, t.stopped";

type DbJob = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbJob),
    Shutdown,
}

struct WorkerInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for WorkerInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to SQLite worker: {err}");
            }
            let join = move || {
                if let Err(join_err) = handle.join() {
                    error!("Failed to join SQLite worker: {join_err:?}");
                }
            };
            // Queued jobs drain before the worker exits; keep runtime threads free meanwhile
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn_blocking(join);
                }
                Err(_) => join(),
            }
        }
    }
}

enum Target {
    File(PathBuf),
    Memory,
}

/// Task store backed by a local SQLite file
#[derive(Clone)]
pub struct SqliteTaskStore {
    inner: Arc<WorkerInner>,
    path: Arc<PathBuf>,
}

impl SqliteTaskStore {
    /// Open (or create) the database file and apply the embedded schema.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::spawn(Target::File(path.into()), SQLITE_INIT.to_string()).await
    }

    /// Open the database file and apply an external schema script.
    pub async fn open_with_script(
        path: impl Into<PathBuf>,
        script_path: impl AsRef<Path>,
    ) -> Result<Self> {
        let script_path = script_path.as_ref();
        let script = tokio::fs::read_to_string(script_path).await.map_err(|e| {
            Error::SchemaInit(format!(
                "failed to read schema script {}: {e}",
                script_path.display()
            ))
        })?;
        Self::spawn(Target::File(path.into()), script).await
    }

    /// Private in-memory database, mainly for tests.
    pub async fn open_in_memory() -> Result<Self> {
        Self::spawn(Target::Memory, SQLITE_INIT.to_string()).await
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    async fn spawn(target: Target, script: String) -> Result<Self> {
        let path = match &target {
            Target::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
                path.clone()
            }
            Target::Memory => PathBuf::from(":memory:"),
        };

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let worker = thread::Builder::new()
            .name("timetracker-sqlite".into())
            .spawn(move || {
                let mut conn = match open_connection(&target) {
                    Ok(conn) => conn,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                let init_result = apply_script(&mut conn, &script);
                let init_failed = init_result.is_err();
                if ready_tx.send(init_result).is_err() {
                    error!("SQLite opener dropped before ready signal");
                    return;
                }
                if init_failed {
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(job) => job(&mut conn),
                        DbCommand::Shutdown => break,
                    }
                }

                debug!("SQLite worker shutting down");
            })
            .map_err(|e| Error::Persistence(format!("failed to spawn SQLite worker: {e}")))?;

        let ready = ready_rx
            .await
            .map_err(|_| Error::SchemaInit("SQLite worker exited before signaling readiness".into()));
        if let Err(err) = ready.and_then(|r| r) {
            let _ = worker.join();
            return Err(err);
        }

        info!(path = %path.display(), "SQLite task store opened");

        Ok(Self {
            inner: Arc::new(WorkerInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            path: Arc::new(path),
        })
    }

    async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();

        let command = DbCommand::Execute(Box::new(move |conn| {
            if reply_tx.send(job(conn)).is_err() {
                debug!("SQLite caller dropped before receiving result");
            }
        }));

        self.inner
            .sender
            .send(command)
            .map_err(|e| Error::Persistence(format!("failed to send command to SQLite worker: {e}")))?;

        reply_rx
            .await
            .map_err(|_| Error::Persistence("SQLite worker terminated unexpectedly".into()))?
    }
}

fn open_connection(target: &Target) -> Result<Connection> {
    let conn = match target {
        Target::File(path) => Connection::open(path),
        Target::Memory => Connection::open_in_memory(),
    }
    .map_err(|e| Error::SchemaInit(format!("failed to open SQLite database: {e}")))?;

    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| Error::SchemaInit(format!("failed to enable foreign keys: {e}")))?;

    if let Target::File(_) = target {
        if let Err(err) =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        {
            warn!("Failed to enable WAL mode: {err}");
        }
    }

    Ok(conn)
}

/// Apply every statement of `script` or none of them.
fn apply_script(conn: &mut Connection, script: &str) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| Error::SchemaInit(format!("failed to begin schema transaction: {e}")))?;

    for statement in split_statements(script) {
        // Dropping `tx` on the error path rolls the whole script back
        tx.execute_batch(&statement)
            .map_err(|e| Error::SchemaInit(format!("statement `{statement}` failed: {e}")))?;
    }

    tx.commit()
        .map_err(|e| Error::SchemaInit(format!("failed to commit schema: {e}")))
}

fn db_err(context: &'static str) -> impl FnOnce(rusqlite::Error) -> Error {
    move |err| match &err {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound(context.to_string()),
        rusqlite::Error::SqliteFailure(code, _) if code.code == ErrorCode::ConstraintViolation => {
            Error::Conflict(format!("{context}: {err}"))
        }
        _ => Error::Persistence(format!("{context}: {err}")),
    }
}

fn format_time(value: &DateTime<Utc>) -> String {
    // Fixed width keeps lexical order equal to chronological order
    value.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Persistence(format!("invalid start_time '{value}': {e}")))
}

struct TaskRow {
    id: i64,
    name: String,
    start_time: String,
    elapsed_time: f64,
    stopped: bool,
}

impl TaskRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            start_time: row.get(2)?,
            elapsed_time: row.get(3)?,
            stopped: row.get(4)?,
        })
    }

    fn into_task(self) -> Result<Task> {
        Ok(Task {
            id: Some(self.id),
            name: self.name,
            start_time: Some(parse_time(&self.start_time)?),
            elapsed_time: self.elapsed_time,
            stopped: self.stopped,
        })
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, task: &Task) -> Result<i64> {
        let start_time = task.validate_for_create()?;
        let name = task.name.clone();
        let id = self
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (task_name, start_time) VALUES (?1, ?2)",
                    params![name, format_time(&start_time)],
                )
                .map_err(db_err("failed to insert task"))?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        debug!(task_id = id, "task row inserted");
        Ok(id)
    }

    async fn new_task_session(&self, task: &Task) -> Result<()> {
        let id = task
            .id
            .ok_or_else(|| Error::Validation("cannot bind a session to an unsaved task".into()))?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO task_session (owner, taskid) VALUES (?1, ?2)
                 ON CONFLICT (owner) DO UPDATE SET taskid = excluded.taskid",
                params![SESSION_OWNER, id],
            )
            .map_err(db_err("failed to upsert task session"))?;
            Ok(())
        })
        .await
    }

    async fn get_task_by_session(&self) -> Result<Task> {
        let row = self
            .execute(|conn| {
                conn.query_row(
                    &format!(
                        "SELECT {TASK_COLUMNS} FROM tasks t
                         INNER JOIN task_session s ON t.id = s.taskid
                         WHERE s.owner = ?1"
                    ),
                    params![SESSION_OWNER],
                    TaskRow::from_row,
                )
                .optional()
                .map_err(db_err("failed to read session task"))
            })
            .await?;

        row.ok_or_else(|| Error::NotFound("no task is bound to the session".into()))?
            .into_task()
    }

    async fn get_task_by_name(&self, name: &str) -> Result<Report> {
        validate_name(name)?;
        let name = name.to_string();
        let lookup = name.clone();
        let report = self
            .execute(move |conn| {
                conn.query_row(
                    "SELECT task_name, SUM(elapsed_time) FROM tasks
                     WHERE task_name = ?1 GROUP BY task_name",
                    params![lookup],
                    |row| Ok(Report::new(row.get::<_, String>(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(db_err("failed to total task by name"))
            })
            .await?;

        report.ok_or_else(|| Error::NotFound(format!("no task named '{name}'")))
    }

    async fn update_stopped(&self, task: &Task) -> Result<()> {
        task.validate_for_stop()?;
        let elapsed = task.elapsed_time;
        let target = task.id;
        self.execute(move |conn| {
            let changed = match target {
                Some(id) => conn
                    .execute(
                        "UPDATE tasks SET elapsed_time = ?1, stopped = 1
                         WHERE id = ?2 AND stopped = 0",
                        params![elapsed, id],
                    )
                    .map_err(db_err("failed to update elapsed time"))?,
                None => conn
                    .execute(
                        "UPDATE tasks SET elapsed_time = ?1, stopped = 1
                         WHERE stopped = 0
                           AND id = (SELECT taskid FROM task_session WHERE owner = ?2)",
                        params![elapsed, SESSION_OWNER],
                    )
                    .map_err(db_err("failed to update elapsed time"))?,
            };
            if changed > 0 {
                return Ok(());
            }

            let id = match target {
                Some(id) => id,
                None => conn
                    .query_row(
                        "SELECT taskid FROM task_session WHERE owner = ?1",
                        params![SESSION_OWNER],
                        |row| row.get(0),
                    )
                    .map_err(db_err("no task is bound to the session"))?,
            };
            let exists = conn
                .query_row("SELECT 1 FROM tasks WHERE id = ?1", params![id], |_| Ok(()))
                .optional()
                .map_err(db_err("failed to look up task"))?;
            match exists {
                Some(()) => Err(Error::Conflict(format!("task {id} is already stopped"))),
                None => Err(Error::NotFound(format!("task {id} does not exist"))),
            }
        })
        .await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.execute(move |conn| {
            let removed = conn
                .execute("DELETE FROM tasks WHERE id = ?1", params![id])
                .map_err(db_err("failed to delete task"))?;
            Ok(removed > 0)
        })
        .await
    }

    async fn get_report(&self) -> Result<Vec<Report>> {
        self.execute(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT task_name, SUM(elapsed_time) AS total_time FROM tasks
                     GROUP BY task_name
                     ORDER BY total_time DESC, task_name ASC",
                )
                .map_err(db_err("failed to prepare report"))?;
            let rows = stmt
                .query_map([], |row| Ok(Report::new(row.get::<_, String>(0)?, row.get(1)?)))
                .map_err(db_err("failed to read report"))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(db_err("failed to scan report"))
        })
        .await
    }

    async fn get_latest(&self) -> Result<Vec<Task>> {
        let rows = self
            .execute(|conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {TASK_COLUMNS} FROM tasks t
                         ORDER BY t.start_time DESC, t.id DESC
                         LIMIT ?1"
                    ))
                    .map_err(db_err("failed to prepare latest tasks"))?;
                let rows = stmt
                    .query_map(params![LATEST_LIMIT as i64], TaskRow::from_row)
                    .map_err(db_err("failed to read latest tasks"))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(db_err("failed to scan latest tasks"))
            })
            .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
