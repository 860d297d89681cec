//! # Waypoint Runtime
//!
//! Runs tasks end to end:
//! - TaskOrchestrator: task lifecycle around a plan run
//! - TaskQueue / WorkerPool: the named "task" queue and its consumers
//! - RuntimeApp: wiring from `waypoint.yaml`

pub mod bootstrap;
pub mod orchestrator;
pub mod queue;
pub mod worker;

pub use bootstrap::{BootstrapError, RuntimeApp, RuntimeError};
pub use orchestrator::{OrchestratorError, TaskOrchestrator};
pub use queue::{InMemoryTaskQueue, QueueError, TaskJob, TaskQueue};
pub use worker::WorkerPool;
