//! Task model definitions

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One tracked unit of work.
///
/// `id` is assigned by the store on creation. `elapsed_time` is written once,
/// when the task is stopped, as seconds between start and stop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Option<i64>,
    pub name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub elapsed_time: f64,
    pub stopped: bool,
}

impl Task {
    /// Create an unsaved, not yet started task with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            start_time: None,
            elapsed_time: 0.0,
            stopped: false,
        }
    }

    /// Set the start time
    pub fn started_at(mut self, now: DateTime<Utc>) -> Self {
        self.start(now);
        self
    }

    /// Set the store-assigned id
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Start at `now`, kept to microseconds so every backend stores it as given.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.start_time = Some(now.trunc_subsecs(6));
        self.elapsed_time = 0.0;
        self.stopped = false;
    }

    /// Record the stop time, returning the elapsed seconds.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Result<f64> {
        if self.stopped {
            return Err(Error::Conflict(format!("task '{}' is already stopped", self.name)));
        }
        let start = self.start_time.ok_or_else(|| {
            Error::Validation(format!("task '{}' has no start time", self.name))
        })?;
        if now < start {
            return Err(Error::Validation(format!(
                "stop time {now} is before start time {start}"
            )));
        }

        let delta = now - start;
        let elapsed = match delta.num_microseconds() {
            Some(us) => us as f64 / 1_000_000.0,
            None => delta.num_milliseconds() as f64 / 1_000.0,
        };
        self.elapsed_time = elapsed;
        self.stopped = true;
        Ok(elapsed)
    }

    /// Started and not yet stopped.
    pub fn is_active(&self) -> bool {
        self.start_time.is_some() && !self.stopped
    }

    pub fn summary(&self) -> String {
        format!(
            "You spent {:.1} seconds on the {} task",
            self.elapsed_time, self.name
        )
    }

    /// Checks run by every backend before a write.
    pub fn validate_for_create(&self) -> Result<DateTime<Utc>> {
        validate_name(&self.name)?;
        let start = self.start_time.ok_or_else(|| {
            Error::Validation(format!("task '{}' has no start time", self.name))
        })?;
        if start.trunc_subsecs(6) != start {
            return Err(Error::Validation(format!(
                "start time {start} is finer than microsecond precision"
            )));
        }
        Ok(start)
    }

    pub fn validate_for_stop(&self) -> Result<()> {
        if !self.elapsed_time.is_finite() || self.elapsed_time < 0.0 {
            return Err(Error::Validation(format!(
                "elapsed time must be a non-negative number, got {}",
                self.elapsed_time
            )));
        }
        Ok(())
    }
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("task name cannot be empty".to_string()));
    }
    Ok(())
}

/// Total elapsed time for one task name, summed across its records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub task: String,
    pub total_time: f64,
}

impl Report {
    pub fn new(task: impl Into<String>, total_time: f64) -> Self {
        Self {
            task: task.into(),
            total_time,
        }
    }
}
