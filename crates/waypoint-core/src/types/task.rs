//! Task type definitions
//!
//! Task is the persisted unit of work with a lifecycle state machine:
//!
//! ```text
//! PENDING -> RUNNING | CANCELLED
//! RUNNING -> PAUSED | SUCCEEDED | FAILED | CANCELLED
//! PAUSED  -> RUNNING | CANCELLED
//! ```
//!
//! SUCCEEDED, FAILED and CANCELLED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::tool::{StepExecutionResult, ToolErrorCode};

use super::{Plan, StepId};

/// Type alias for Task ID
pub type TaskId = String;

/// Task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Paused,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 6] = [
        TaskStatus::Pending,
        TaskStatus::Running,
        TaskStatus::Paused,
        TaskStatus::Succeeded,
        TaskStatus::Failed,
        TaskStatus::Cancelled,
    ];

    /// States reachable from this one in a single transition
    pub fn valid_next_states(&self) -> &'static [TaskStatus] {
        match self {
            TaskStatus::Pending => &[TaskStatus::Running, TaskStatus::Cancelled],
            TaskStatus::Running => &[
                TaskStatus::Paused,
                TaskStatus::Succeeded,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ],
            TaskStatus::Paused => &[TaskStatus::Running, TaskStatus::Cancelled],
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        self.valid_next_states().contains(&to)
    }

    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.valid_next_states().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Paused => "PAUSED",
            TaskStatus::Succeeded => "SUCCEEDED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure transition check
pub fn validate_transition(from: TaskStatus, to: TaskStatus) -> bool {
    from.can_transition_to(to)
}

/// Rejected lifecycle transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "invalid task transition {from} -> {to}; valid next states: [{}]",
    format_states(.valid_next)
)]
pub struct TransitionError {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub valid_next: Vec<TaskStatus>,
}

fn format_states(states: &[TaskStatus]) -> String {
    states
        .iter()
        .map(TaskStatus::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Structured failure retained on a failed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ToolErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl TaskError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step_id: None,
            code: None,
            details: None,
        }
    }
}

/// Task - the persisted unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub chat_id: String,
    pub user_id: String,
    pub intent_text: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Plan snapshot taken at creation time
    pub plan_snapshot: Plan,
    /// Index of the next step to run (number of steps already recorded)
    #[serde(default)]
    pub current_step: usize,
    pub total_steps: usize,
    /// Step results recorded so far, used as a resume checkpoint
    #[serde(default)]
    pub step_results: Vec<StepExecutionResult>,
    #[serde(default)]
    pub user_profile: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a PENDING task holding a snapshot of `plan`
    pub fn new(
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        intent_text: impl Into<String>,
        plan: Plan,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            intent_text: intent_text.into(),
            status: TaskStatus::Pending,
            priority: TaskPriority::Normal,
            total_steps: plan.steps.len(),
            plan_snapshot: plan,
            current_step: 0,
            step_results: Vec::new(),
            user_profile: None,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_user_profile(mut self, profile: Value) -> Self {
        self.user_profile = Some(profile);
        self
    }

    /// Move to `to`, rejecting illegal transitions
    pub fn transition(&mut self, to: TaskStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
                valid_next: self.status.valid_next_states().to_vec(),
            });
        }

        let now = Utc::now();
        if to == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// RUNNING -> SUCCEEDED with the result payload attached
    pub fn succeed(&mut self, result: Value) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Succeeded)?;
        self.result = Some(result);
        self.error = None;
        Ok(())
    }

    /// RUNNING -> FAILED with the structured error attached
    pub fn fail(&mut self, error: TaskError) -> Result<(), TransitionError> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    /// Update execution checkpoint data
    pub fn set_checkpoint(&mut self, step_results: Vec<StepExecutionResult>) {
        self.current_step = step_results.len();
        self.step_results = step_results;
        self.updated_at = Utc::now();
    }
}
