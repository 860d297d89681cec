//! # Waypoint Core
//!
//! Core abstractions and deterministic logic for the Waypoint task runtime.
//!
//! This crate contains:
//! - Intent / Plan / Step / Task definitions and the task state machine
//! - Tool contract, handler registry and tool catalog
//! - Plan validation and the sequential step/plan executor
//! - Store and event-publisher traits, plan generation contract
//!
//! This crate does NOT care about:
//! - Where tasks come from (queue, chat, API)
//! - How tasks and events are persisted or delivered
//! - Which external services the tool handlers call

pub mod events;
pub mod executor;
pub mod planner;
pub mod schema;
pub mod store;
pub mod tool;
pub mod types;
pub mod validator;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::events::{EventPublisher, NoopPublisher, TaskEvent};
    pub use crate::executor::{
        HaltReason, PlanExecutionResult, StepProgressEvent, StepProgressReporter, ToolExecutor,
    };
    pub use crate::planner::{
        CompletionClient, CompletionRequest, CompletionResponse, LlmPlanGenerator, PlanError,
        PlanGenerator, PlanningOutcome, PlanningService,
    };
    pub use crate::store::{LogLevel, StoreError, TaskLogEntry, TaskStore};
    pub use crate::tool::{
        CancellationToken, ExecutionContext, HandlerError, HandlerRegistry, StepExecutionResult,
        ToolCatalog, ToolDefinition, ToolError, ToolErrorCode, ToolHandler, ToolResult,
    };
    pub use crate::types::{
        IntentClassification, IntentType, Plan, Step, StepId, Task, TaskError, TaskId,
        TaskPriority, TaskStatus, TransitionError,
    };
    pub use crate::validator::{PlanValidationResult, PlanValidator, ValidationCode};
}

// Re-export key types at crate root
pub use executor::{PlanExecutionResult, ToolExecutor};
pub use tool::{ExecutionContext, HandlerRegistry, ToolHandler, ToolResult};
pub use types::{Plan, Step, Task, TaskStatus};
pub use validator::{PlanValidationResult, PlanValidator};
