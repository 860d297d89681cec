//! Core type definitions for Waypoint
//!
//! - IntentClassification: typed goal produced by the classifier
//! - Plan: ordered list of tool-invocation steps
//! - Step: one planned tool call with dependencies and retry flags
//! - Task: persisted lifecycle of one plan execution

mod intent;
mod plan;
mod step;
mod task;

pub use intent::{IntentClassification, IntentType};
pub use plan::{Plan, PlanComplexity, PlanMetadata};
pub use step::{Step, StepId, DEFAULT_STEP_MAX_RETRIES};
pub use task::{
    validate_transition, Task, TaskError, TaskId, TaskPriority, TaskStatus, TransitionError,
};
