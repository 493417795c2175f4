//! Per-operation deadline for any task store

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::task::{Report, Task, TaskStore};
use crate::{Error, Result};

/// Wraps a store so every call fails with [`Error::Timeout`] once `limit`
/// elapses. The inner future is dropped on expiry, which hands pooled
/// connections back.
#[derive(Clone)]
pub struct DeadlineStore {
    inner: Arc<dyn TaskStore>,
    limit: Duration,
}

impl DeadlineStore {
    pub fn new(inner: Arc<dyn TaskStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    async fn run<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, limit_ms = self.limit.as_millis() as u64, "task store call timed out");
                Err(Error::Timeout(self.limit))
            }
        }
    }
}

#[async_trait]
impl TaskStore for DeadlineStore {
    async fn create(&self, task: &Task) -> Result<i64> {
        self.run("create", self.inner.create(task)).await
    }

    async fn new_task_session(&self, task: &Task) -> Result<()> {
        self.run("new_task_session", self.inner.new_task_session(task)).await
    }

    async fn get_task_by_session(&self) -> Result<Task> {
        self.run("get_task_by_session", self.inner.get_task_by_session()).await
    }

    async fn get_task_by_name(&self, name: &str) -> Result<Report> {
        self.run("get_task_by_name", self.inner.get_task_by_name(name)).await
    }

    async fn update_stopped(&self, task: &Task) -> Result<()> {
        self.run("update_stopped", self.inner.update_stopped(task)).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.run("delete", self.inner.delete(id)).await
    }

    async fn get_report(&self) -> Result<Vec<Report>> {
        self.run("get_report", self.inner.get_report()).await
    }

    async fn get_latest(&self) -> Result<Vec<Task>> {
        self.run("get_latest", self.inner.get_latest()).await
    }

    fn backend(&self) -> &'static str {
        self.inner.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTaskStore;
    use chrono::Utc;

    /// Delegates to a memory store after sleeping.
    struct SlowStore {
        delay: Duration,
        inner: MemoryTaskStore,
    }

    #[async_trait]
    impl TaskStore for SlowStore {
        async fn create(&self, task: &Task) -> Result<i64> {
            tokio::time::sleep(self.delay).await;
            self.inner.create(task).await
        }

        async fn new_task_session(&self, task: &Task) -> Result<()> {
            self.inner.new_task_session(task).await
        }

        async fn get_task_by_session(&self) -> Result<Task> {
            self.inner.get_task_by_session().await
        }

        async fn get_task_by_name(&self, name: &str) -> Result<Report> {
            self.inner.get_task_by_name(name).await
        }

        async fn update_stopped(&self, task: &Task) -> Result<()> {
            self.inner.update_stopped(task).await
        }

        async fn delete(&self, id: i64) -> Result<bool> {
            self.inner.delete(id).await
        }

        async fn get_report(&self) -> Result<Vec<Report>> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_report().await
        }

        async fn get_latest(&self) -> Result<Vec<Task>> {
            self.inner.get_latest().await
        }

        fn backend(&self) -> &'static str {
            "slow"
        }
    }

    fn slow(delay_ms: u64) -> Arc<dyn TaskStore> {
        Arc::new(SlowStore {
            delay: Duration::from_millis(delay_ms),
            inner: MemoryTaskStore::new(),
        })
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let store = DeadlineStore::new(slow(500), Duration::from_millis(20));
        assert_eq!(store.limit(), Duration::from_millis(20));
        match store.get_report().await {
            Err(Error::Timeout(limit)) => assert_eq!(limit, Duration::from_millis(20)),
            other => panic!("Expected Timeout, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fast_call_passes_through() {
        let store = DeadlineStore::new(slow(0), Duration::from_secs(5));
        let id = store
            .create(&Task::new("piano").started_at(Utc::now()))
            .await
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(store.backend(), "slow");
    }
}
