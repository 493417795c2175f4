//! Postgres task store
//!
//! Queries run against a shared `sqlx` connection pool. Each call checks a
//! connection out and returns it when the future completes or is dropped.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};

use super::schema::{split_statements, POSTGRES_INIT};
use crate::task::{validate_name, Report, Task, TaskStore, LATEST_LIMIT, SESSION_OWNER};
use crate::{Error, Result};

const SELECT_BY_NAME: &str = "SELECT task_name, SUM(elapsed_time) AS total_time FROM tasks \
     WHERE task_name = $1 GROUP BY task_name";
const SELECT_BY_SESSION: &str = "SELECT t.id, t.task_name, t.start_time, t.elapsed_time, t.stopped \
     FROM tasks t INNER JOIN task_session s ON t.id = s.taskid WHERE s.owner = $1";
const INSERT_TASK: &str = "INSERT INTO tasks (task_name, start_time) VALUES ($1, $2) RETURNING id";
const SELECT_REPORT: &str = "SELECT task_name, SUM(elapsed_time) AS total_time FROM tasks \
     GROUP BY task_name ORDER BY total_time DESC, task_name COLLATE \"C\" ASC";
const SELECT_LATEST: &str = "SELECT id, task_name, start_time, elapsed_time, stopped FROM tasks \
     ORDER BY start_time DESC, id DESC LIMIT $1";
const UPDATE_STOPPED_BY_ID: &str = "UPDATE tasks SET elapsed_time = $1, stopped = TRUE \
     WHERE id = $2 AND stopped = FALSE";
const UPDATE_STOPPED_BY_SESSION: &str = "UPDATE tasks t SET elapsed_time = $1, stopped = TRUE \
     FROM task_session s WHERE t.id = s.taskid AND s.owner = $2 AND t.stopped = FALSE";
const DELETE_TASK: &str = "DELETE FROM tasks WHERE id = $1";
const UPSERT_TASK_SESSION: &str = "INSERT INTO task_session (owner, taskid) VALUES ($1, $2) \
     ON CONFLICT (owner) DO UPDATE SET taskid = EXCLUDED.taskid";

/// Connection pool tuning
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// Longest a call waits for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    task_name: String,
    start_time: DateTime<Utc>,
    elapsed_time: f64,
    stopped: bool,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Self {
            id: Some(row.id),
            name: row.task_name,
            start_time: Some(row.start_time),
            elapsed_time: row.elapsed_time,
            stopped: row.stopped,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReportRow {
    task_name: String,
    total_time: f64,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        Report::new(row.task_name, row.total_time)
    }
}

/// Task store backed by a Postgres server
#[derive(Clone)]
pub struct PgTaskStore {
    pool: PgPool,
    acquire_timeout: Duration,
}

impl PgTaskStore {
    /// Connect a pool to `url`, failing if the first connection cannot be made.
    pub async fn connect(url: &str, settings: &PoolSettings) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| Error::Persistence(format!("failed to connect to Postgres: {e}")))?;

        info!(
            max_connections = settings.max_connections,
            "Postgres task store connected"
        );
        Ok(Self::from_pool(pool, settings.acquire_timeout))
    }

    pub fn from_pool(pool: PgPool, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
        }
    }

    /// Apply the embedded schema script.
    pub async fn init_schema(&self) -> Result<()> {
        self.apply_script(POSTGRES_INIT).await
    }

    /// Apply every statement of `script` in one transaction, or none.
    pub async fn apply_script(&self, script: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::SchemaInit(format!("failed to begin schema transaction: {e}")))?;

        for statement in split_statements(script) {
            sqlx::raw_sql(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::SchemaInit(format!("statement `{statement}` failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| Error::SchemaInit(format!("failed to commit schema: {e}")))?;
        debug!("Postgres schema applied");
        Ok(())
    }

    fn db_err(&self, context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
        let acquire_timeout = self.acquire_timeout;
        move |err| match &err {
            sqlx::Error::RowNotFound => Error::NotFound(context.to_string()),
            sqlx::Error::PoolTimedOut => Error::Timeout(acquire_timeout),
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation => {
                    Error::Conflict(format!("{context}: {err}"))
                }
                _ => Error::Persistence(format!("{context}: {err}")),
            },
            _ => Error::Persistence(format!("{context}: {err}")),
        }
    }

    /// Classify an update that matched no rows.
    async fn explain_missed_stop(&self, target: Option<i64>) -> Error {
        let id = match target {
            Some(id) => id,
            None => {
                let bound: std::result::Result<Option<i64>, _> =
                    sqlx::query_scalar("SELECT taskid FROM task_session WHERE owner = $1")
                        .bind(SESSION_OWNER)
                        .fetch_optional(&self.pool)
                        .await;
                match bound {
                    Ok(Some(id)) => id,
                    Ok(None) => return Error::NotFound("no task is bound to the session".into()),
                    Err(e) => return self.db_err("failed to read task session")(e),
                }
            }
        };

        let exists: std::result::Result<Option<i32>, _> =
            sqlx::query_scalar("SELECT 1 FROM tasks WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;
        match exists {
            Ok(Some(_)) => Error::Conflict(format!("task {id} is already stopped")),
            Ok(None) => Error::NotFound(format!("task {id} does not exist")),
            Err(e) => self.db_err("failed to look up task")(e),
        }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn create(&self, task: &Task) -> Result<i64> {
        let start_time = task.validate_for_create()?;
        let id: i64 = sqlx::query_scalar(INSERT_TASK)
            .bind(&task.name)
            .bind(start_time)
            .fetch_one(&self.pool)
            .await
            .map_err(self.db_err("failed to insert task"))?;
        debug!(task_id = id, "task row inserted");
        Ok(id)
    }

    async fn new_task_session(&self, task: &Task) -> Result<()> {
        let id = task
            .id
            .ok_or_else(|| Error::Validation("cannot bind a session to an unsaved task".into()))?;
        sqlx::query(UPSERT_TASK_SESSION)
            .bind(SESSION_OWNER)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(self.db_err("failed to upsert task session"))?;
        Ok(())
    }

    async fn get_task_by_session(&self) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(SELECT_BY_SESSION)
            .bind(SESSION_OWNER)
            .fetch_optional(&self.pool)
            .await
            .map_err(self.db_err("failed to read session task"))?;
        row.map(Task::from)
            .ok_or_else(|| Error::NotFound("no task is bound to the session".into()))
    }

    async fn get_task_by_name(&self, name: &str) -> Result<Report> {
        validate_name(name)?;
        let row = sqlx::query_as::<_, ReportRow>(SELECT_BY_NAME)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(self.db_err("failed to total task by name"))?;
        row.map(Report::from)
            .ok_or_else(|| Error::NotFound(format!("no task named '{name}'")))
    }

    async fn update_stopped(&self, task: &Task) -> Result<()> {
        task.validate_for_stop()?;
        let result = match task.id {
            Some(id) => {
                sqlx::query(UPDATE_STOPPED_BY_ID)
                    .bind(task.elapsed_time)
                    .bind(id)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query(UPDATE_STOPPED_BY_SESSION)
                    .bind(task.elapsed_time)
                    .bind(SESSION_OWNER)
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(self.db_err("failed to update elapsed time"))?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_stop(task.id).await);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(DELETE_TASK)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(self.db_err("failed to delete task"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_report(&self) -> Result<Vec<Report>> {
        let rows = sqlx::query_as::<_, ReportRow>(SELECT_REPORT)
            .fetch_all(&self.pool)
            .await
            .map_err(self.db_err("failed to read report"))?;
        Ok(rows.into_iter().map(Report::from).collect())
    }

    async fn get_latest(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(SELECT_LATEST)
            .bind(LATEST_LIMIT as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(self.db_err("failed to read latest tasks"))?;
        Ok(rows.into_iter().map(Task::from).collect())
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
