//! In-memory task storage implementation
//!
//! Holds tasks and the session binding behind one lock. Nothing survives a
//! restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::task::report::aggregate;
use crate::task::{validate_name, Report, Task, TaskStore, LATEST_LIMIT};
use crate::{Error, Result};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    tasks: BTreeMap<i64, Task>,
    session: Option<i64>,
}

/// Task store kept entirely in process memory
#[derive(Default)]
pub struct MemoryTaskStore {
    state: RwLock<MemoryState>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: &Task) -> Result<i64> {
        let start_time = task.validate_for_create()?;
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        let record = Task {
            id: Some(id),
            name: task.name.clone(),
            start_time: Some(start_time),
            elapsed_time: 0.0,
            stopped: false,
        };
        state.tasks.insert(id, record);
        Ok(id)
    }

    async fn new_task_session(&self, task: &Task) -> Result<()> {
        let id = task
            .id
            .ok_or_else(|| Error::Validation("cannot bind a session to an unsaved task".into()))?;
        let mut state = self.state.write().await;
        if !state.tasks.contains_key(&id) {
            return Err(Error::Conflict(format!("task {id} does not exist")));
        }
        state.session = Some(id);
        Ok(())
    }

    async fn get_task_by_session(&self) -> Result<Task> {
        let state = self.state.read().await;
        state
            .session
            .and_then(|id| state.tasks.get(&id))
            .cloned()
            .ok_or_else(|| Error::NotFound("no task is bound to the session".into()))
    }

    async fn get_task_by_name(&self, name: &str) -> Result<Report> {
        validate_name(name)?;
        let state = self.state.read().await;
        aggregate(state.tasks.values().filter(|t| t.name == name))
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no task named '{name}'")))
    }

    async fn update_stopped(&self, task: &Task) -> Result<()> {
        task.validate_for_stop()?;
        let mut state = self.state.write().await;
        let id = match task.id.or(state.session) {
            Some(id) => id,
            None => return Err(Error::NotFound("no task is bound to the session".into())),
        };
        let record = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("task {id} does not exist")))?;
        if record.stopped {
            return Err(Error::Conflict(format!("task {id} is already stopped")));
        }
        record.elapsed_time = task.elapsed_time;
        record.stopped = true;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        let removed = state.tasks.remove(&id).is_some();
        if removed && state.session == Some(id) {
            state.session = None;
        }
        Ok(removed)
    }

    async fn get_report(&self) -> Result<Vec<Report>> {
        let state = self.state.read().await;
        Ok(aggregate(state.tasks.values()))
    }

    async fn get_latest(&self) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state.tasks.values().cloned().collect();
        // Newest first; ids break ties between equal start times
        tasks.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        tasks.truncate(LATEST_LIMIT);
        Ok(tasks)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
