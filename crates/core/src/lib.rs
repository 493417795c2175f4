//! Core library for the task time tracker
//!
//! This crate contains:
//! - The task and report model
//! - The `TaskStore` contract and its Postgres, SQLite and in-memory backends
//! - The session binder that enforces a single running task

pub mod error;
pub mod session;
pub mod store;
pub mod task;

pub use error::{Error, ErrorKind};
pub use session::{SessionState, TimeTracker};
pub use store::{DeadlineStore, MemoryTaskStore, PgTaskStore, PoolSettings, SqliteTaskStore};
pub use task::{Report, Task, TaskStore};

pub type Result<T> = std::result::Result<T, Error>;
