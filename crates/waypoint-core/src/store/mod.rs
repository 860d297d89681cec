//! Store module
//!
//! Storage abstractions:
//! - TaskStore: Task persistence plus the per-task log trail (async trait)
//! - TaskLogEntry: one structured log line attached to a task
//!
//! Note: Implementations are in waypoint-stores crate

mod task_store;

pub use task_store::{LogLevel, TaskLogEntry, TaskStore};

use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
