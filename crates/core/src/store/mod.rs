//! Task store backends
//!
//! Every backend implements the full [`TaskStore`](crate::task::TaskStore)
//! contract so callers stay backend-agnostic.

mod deadline;
mod memory;
mod postgres;
pub mod schema;
mod sqlite;

pub use deadline::DeadlineStore;
pub use memory::MemoryTaskStore;
pub use postgres::{PgTaskStore, PoolSettings};
pub use sqlite::SqliteTaskStore;
