//! # Waypoint Stores
//!
//! Minimal store implementations for the Waypoint runtime.
//!
//! This crate provides:
//! - InMemory TaskStore with per-task log trail
//! - In-process EventBus publishing task lifecycle events

mod event_bus;
mod task_store;

pub use event_bus::BroadcastEventBus;
pub use task_store::InMemoryTaskStore;

// Re-export core traits for convenience
pub use waypoint_core::events::{EventPublisher, TaskEvent};
pub use waypoint_core::store::{LogLevel, StoreError, TaskLogEntry, TaskStore};
