//! Task module
//!
//! This module contains the task model, the storage contract and the
//! report aggregator.

mod model;
pub mod report;
mod repository;

pub use model::*;
pub use repository::{TaskStore, LATEST_LIMIT, SESSION_OWNER};
