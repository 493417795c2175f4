//! Application state

use std::sync::Arc;
use std::time::Duration;

use tt_core::{
    DeadlineStore, MemoryTaskStore, PgTaskStore, SqliteTaskStore, TaskStore, TimeTracker,
};

use crate::config::{Config, StoreKind};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn TaskStore>,
    tracker: TimeTracker,
}

impl AppState {
    /// Open the configured backend and wrap it with the operation deadline.
    pub async fn from_config(config: &Config) -> tt_core::Result<Self> {
        let backend: Arc<dyn TaskStore> = match &config.store {
            StoreKind::Postgres { url } => {
                let store = PgTaskStore::connect(url, &config.pool).await?;
                store.init_schema().await?;
                Arc::new(store)
            }
            StoreKind::Sqlite { path, init_script } => match init_script {
                Some(script) => Arc::new(SqliteTaskStore::open_with_script(path, script).await?),
                None => Arc::new(SqliteTaskStore::open(path).await?),
            },
            StoreKind::Memory => Arc::new(MemoryTaskStore::new()),
        };

        Ok(Self::with_store(backend, config.op_timeout))
    }

    pub fn with_store(backend: Arc<dyn TaskStore>, op_timeout: Duration) -> Self {
        let store: Arc<dyn TaskStore> = Arc::new(DeadlineStore::new(backend, op_timeout));
        let tracker = TimeTracker::new(Arc::clone(&store));
        Self {
            inner: Arc::new(AppStateInner { store, tracker }),
        }
    }

    /// Get reference to the task store
    pub fn task_store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.store
    }

    pub fn tracker(&self) -> &TimeTracker {
        &self.inner.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tt_core::PoolSettings;

    fn sqlite_config(path: std::path::PathBuf) -> Config {
        Config {
            store: StoreKind::Sqlite {
                path,
                init_script: None,
            },
            pool: PoolSettings::default(),
            op_timeout: Duration::from_secs(5),
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }

    #[tokio::test]
    async fn test_from_config_opens_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = sqlite_config(dir.path().join("tracker.db"));

        let state = AppState::from_config(&config).await.unwrap();
        assert_eq!(state.task_store().backend(), "sqlite");

        let task = state
            .tracker()
            .start("piano", chrono::Utc::now())
            .await
            .unwrap();
        assert!(task.id.is_some());
    }

    #[tokio::test]
    async fn test_missing_init_script_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = sqlite_config(dir.path().join("tracker.db"));
        config.store = StoreKind::Sqlite {
            path: dir.path().join("tracker.db"),
            init_script: Some(dir.path().join("missing.sql")),
        };

        match AppState::from_config(&config).await {
            Err(tt_core::Error::SchemaInit(_)) => {}
            Err(other) => panic!("Expected SchemaInit, got: {:?}", other),
            Ok(_) => panic!("Expected SchemaInit, got a running state"),
        }
    }
}
