//! Task lifecycle events
//!
//! Published by the orchestrator for external progress observers. Delivery
//! belongs to the publisher implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tool::StepExecutionResult;
use crate::types::{TaskError, TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum TaskEvent {
    #[serde(rename = "task.status.changed", rename_all = "camelCase")]
    StatusChanged {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[serde(rename = "task.step.completed", rename_all = "camelCase")]
    StepCompleted {
        task_id: TaskId,
        step_index: usize,
        total_steps: usize,
        result: StepExecutionResult,
    },
    #[serde(rename = "task.completed", rename_all = "camelCase")]
    Completed {
        task_id: TaskId,
        result: Value,
    },
    #[serde(rename = "task.failed", rename_all = "camelCase")]
    Failed {
        task_id: TaskId,
        error: TaskError,
    },
}

impl TaskEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "task.status.changed",
            Self::StepCompleted { .. } => "task.step.completed",
            Self::Completed { .. } => "task.completed",
            Self::Failed { .. } => "task.failed",
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Self::StatusChanged { task_id, .. }
            | Self::StepCompleted { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. } => task_id,
        }
    }
}

/// Publish contract for lifecycle events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: TaskEvent) -> Result<(), String>;
}

/// Publisher that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: TaskEvent) -> Result<(), String> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let event = TaskEvent::StatusChanged {
            task_id: "t1".to_string(),
            from: TaskStatus::Pending,
            to: TaskStatus::Running,
        };
        assert_eq!(event.name(), "task.status.changed");
        assert_eq!(event.task_id(), "t1");

        let failed = TaskEvent::Failed {
            task_id: "t1".to_string(),
            error: TaskError::new("boom"),
        };
        assert_eq!(failed.name(), "task.failed");
        let json = serde_json::to_value(&failed).expect("serialize");
        assert_eq!(json["event"], "task.failed");
        assert_eq!(json["taskId"], "t1");
        assert_eq!(json["event"], failed.name());
    }

    #[test]
    fn test_step_completed_wire_shape() {
        let event = TaskEvent::StepCompleted {
            task_id: "t1".to_string(),
            step_index: 0,
            total_steps: 2,
            result: StepExecutionResult::new(
                "a",
                "web_search",
                crate::tool::ToolResult::success("web_search", serde_json::json!({})),
                3,
            ),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "task.step.completed");
        assert_eq!(json["taskId"], "t1");
        assert_eq!(json["stepIndex"], 0);
        assert_eq!(json["totalSteps"], 2);
        assert_eq!(json["result"]["stepId"], "a");
    }
}
