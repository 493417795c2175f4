//! Session binding
//!
//! Ties "start" (create a task, bind the session) and "stop" (resolve the
//! session, write the elapsed time) together so only one task runs at a time.
//! The binding itself lives in the store as a single upserted row; this type
//! holds no lock of its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::task::{validate_name, Task, TaskStore};
use crate::{Error, Result};

/// Where the tracking scope currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Running(Task),
}

/// Start/stop protocol over any [`TaskStore`]
#[derive(Clone)]
pub struct TimeTracker {
    store: Arc<dyn TaskStore>,
}

impl TimeTracker {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Create a task named `name` started at `now` and bind the session to it.
    ///
    /// A task that was still running is left behind unstopped. If the bind
    /// fails after the row was created, the error carries the new task id.
    pub async fn start(&self, name: &str, now: DateTime<Utc>) -> Result<Task> {
        validate_name(name)?;

        if let Some(previous) = self.current().await? {
            warn!(
                task_id = previous.id,
                name = %previous.name,
                "starting a new task while another is running; the previous task is left unstopped"
            );
        }

        let mut task = Task::new(name.trim()).started_at(now);
        let id = self.store.create(&task).await?;
        task.id = Some(id);

        if let Err(err) = self.store.new_task_session(&task).await {
            warn!(task_id = id, error = %err, "task created but session could not be bound");
            return Err(Error::SessionNotStarted {
                task_id: id,
                source: Box::new(err),
            });
        }

        info!(task_id = id, name = %task.name, "task started");
        Ok(task)
    }

    /// Stop the running task at `now` and return it with its elapsed time.
    pub async fn stop(&self, now: DateTime<Utc>) -> Result<Task> {
        let mut task = self
            .current()
            .await?
            .ok_or_else(|| Error::NotFound("no task is running".into()))?;

        task.stop(now)?;
        self.store.update_stopped(&task).await?;

        info!(
            task_id = task.id,
            name = %task.name,
            elapsed = task.elapsed_time,
            "task stopped"
        );
        Ok(task)
    }

    /// The running task, if any. A binding to a stopped task counts as idle.
    pub async fn current(&self) -> Result<Option<Task>> {
        match self.store.get_task_by_session().await {
            Ok(task) if task.is_active() => Ok(Some(task)),
            Ok(_) | Err(Error::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn state(&self) -> Result<SessionState> {
        Ok(match self.current().await? {
            Some(task) => SessionState::Running(task),
            None => SessionState::Idle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryTaskStore, SqliteTaskStore};
    use crate::task::Report;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, h, m, s).unwrap()
    }

    async fn trackers() -> Vec<TimeTracker> {
        vec![
            TimeTracker::new(Arc::new(MemoryTaskStore::new())),
            TimeTracker::new(Arc::new(SqliteTaskStore::open_in_memory().await.unwrap())),
        ]
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        for tracker in trackers().await {
            assert_eq!(tracker.state().await.unwrap(), SessionState::Idle);

            let started = tracker.start("piano", at(0, 0, 0)).await.unwrap();
            assert!(started.id.is_some());
            assert!(matches!(tracker.state().await.unwrap(), SessionState::Running(t) if t.id == started.id));

            let stopped = tracker.stop(at(0, 10, 0)).await.unwrap();
            assert_eq!(stopped.id, started.id);
            assert_eq!(stopped.elapsed_time, 600.0);
            assert_eq!(tracker.state().await.unwrap(), SessionState::Idle);
        }
    }

    #[tokio::test]
    async fn test_piano_scenario_totals() {
        for tracker in trackers().await {
            tracker.start("piano", at(0, 0, 0)).await.unwrap();
            tracker.stop(at(0, 10, 0)).await.unwrap();
            tracker.start("piano", at(1, 0, 0)).await.unwrap();
            tracker.stop(at(1, 5, 0)).await.unwrap();

            let total = tracker.store().get_task_by_name("piano").await.unwrap();
            assert_eq!(total, Report::new("piano", 900.0));
        }
    }

    #[tokio::test]
    async fn test_second_start_orphans_first() {
        for tracker in trackers().await {
            let first = tracker.start("piano", at(0, 0, 0)).await.unwrap();
            let second = tracker.start("swim", at(0, 1, 0)).await.unwrap();

            let current = tracker.current().await.unwrap().unwrap();
            assert_eq!(current.id, second.id);

            tracker.stop(at(0, 2, 0)).await.unwrap();
            let latest = tracker.store().get_latest().await.unwrap();
            let orphan = latest.iter().find(|t| t.id == first.id).unwrap();
            assert_eq!(orphan.elapsed_time, 0.0);
            assert!(!orphan.stopped);
        }
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_not_found() {
        for tracker in trackers().await {
            assert!(matches!(tracker.stop(at(0, 0, 0)).await, Err(Error::NotFound(_))));

            tracker.start("piano", at(0, 0, 0)).await.unwrap();
            tracker.stop(at(0, 0, 1)).await.unwrap();
            assert!(matches!(tracker.stop(at(0, 0, 2)).await, Err(Error::NotFound(_))));
        }
    }

    #[tokio::test]
    async fn test_empty_name_rejected_before_io() {
        let store = Arc::new(MemoryTaskStore::new());
        let tracker = TimeTracker::new(store.clone());
        assert!(matches!(tracker.start("   ", at(0, 0, 0)).await, Err(Error::Validation(_))));
        assert!(store.get_latest().await.unwrap().is_empty());
    }

    /// Memory store whose session bind always fails.
    struct UnbindableStore(MemoryTaskStore);

    #[async_trait]
    impl TaskStore for UnbindableStore {
        async fn create(&self, task: &Task) -> Result<i64> {
            self.0.create(task).await
        }

        async fn new_task_session(&self, _task: &Task) -> Result<()> {
            Err(Error::Persistence("connection lost".into()))
        }

        async fn get_task_by_session(&self) -> Result<Task> {
            self.0.get_task_by_session().await
        }

        async fn get_task_by_name(&self, name: &str) -> Result<Report> {
            self.0.get_task_by_name(name).await
        }

        async fn update_stopped(&self, task: &Task) -> Result<()> {
            self.0.update_stopped(task).await
        }

        async fn delete(&self, id: i64) -> Result<bool> {
            self.0.delete(id).await
        }

        async fn get_report(&self) -> Result<Vec<Report>> {
            self.0.get_report().await
        }

        async fn get_latest(&self) -> Result<Vec<Task>> {
            self.0.get_latest().await
        }

        fn backend(&self) -> &'static str {
            "unbindable"
        }
    }

    #[tokio::test]
    async fn test_bind_failure_reports_created_task() {
        let tracker = TimeTracker::new(Arc::new(UnbindableStore(MemoryTaskStore::new())));

        match tracker.start("piano", at(0, 0, 0)).await {
            Err(Error::SessionNotStarted { task_id, source }) => {
                assert_eq!(task_id, 1);
                assert!(matches!(*source, Error::Persistence(_)));
            }
            other => panic!("Expected SessionNotStarted, got: {:?}", other),
        }

        // The row exists but nothing is running
        assert_eq!(tracker.store().get_latest().await.unwrap().len(), 1);
        assert_eq!(tracker.state().await.unwrap(), SessionState::Idle);
    }
}
