//! Task store trait
//!
//! Defines the storage contract every backend implements.

use std::sync::Arc;

use async_trait::async_trait;

use super::model::{Report, Task};
use crate::Result;

/// Number of rows returned by [`TaskStore::get_latest`].
pub const LATEST_LIMIT: usize = 10;

/// Fixed key of the single session binding row.
pub const SESSION_OWNER: &str = "app";

/// Storage interface for tasks and the session binding.
///
/// All operations may block on I/O. Callers must not hold a lock across them.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new task from its name and start time, returning the assigned id.
    async fn create(&self, task: &Task) -> Result<i64>;

    /// Bind `task.id` as the one current session, replacing any prior binding.
    async fn new_task_session(&self, task: &Task) -> Result<()>;

    /// Resolve the task the session is bound to.
    async fn get_task_by_session(&self) -> Result<Task>;

    /// Sum of elapsed time across every record with this name.
    async fn get_task_by_name(&self, name: &str) -> Result<Report>;

    /// Write `task.elapsed_time` and mark the task stopped.
    ///
    /// With `task.id` set the row is addressed directly, otherwise through
    /// the session binding. Stopping an already stopped task is a `Conflict`.
    async fn update_stopped(&self, task: &Task) -> Result<()>;

    /// Remove a task by id. Returns `false` when no such row existed.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Totals per name, largest first, ties by name ascending.
    async fn get_report(&self) -> Result<Vec<Report>>;

    /// The most recent [`LATEST_LIMIT`] tasks by start time.
    async fn get_latest(&self) -> Result<Vec<Task>>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

#[async_trait]
impl<S: TaskStore + ?Sized> TaskStore for Arc<S> {
    async fn create(&self, task: &Task) -> Result<i64> {
        (**self).create(task).await
    }

    async fn new_task_session(&self, task: &Task) -> Result<()> {
        (**self).new_task_session(task).await
    }

    async fn get_task_by_session(&self) -> Result<Task> {
        (**self).get_task_by_session().await
    }

    async fn get_task_by_name(&self, name: &str) -> Result<Report> {
        (**self).get_task_by_name(name).await
    }

    async fn update_stopped(&self, task: &Task) -> Result<()> {
        (**self).update_stopped(task).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        (**self).delete(id).await
    }

    async fn get_report(&self) -> Result<Vec<Report>> {
        (**self).get_report().await
    }

    async fn get_latest(&self) -> Result<Vec<Task>> {
        (**self).get_latest().await
    }

    fn backend(&self) -> &'static str {
        (**self).backend()
    }
}
