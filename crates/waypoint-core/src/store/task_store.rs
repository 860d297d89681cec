//! TaskStore - Task persistence trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StoreError;
use crate::types::{StepId, Task, TaskId, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry of a task's log trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLogEntry {
    pub task_id: TaskId,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl TaskLogEntry {
    pub fn new(task_id: impl Into<TaskId>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            level,
            message: message.into(),
            step_id: None,
            data: Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn info(task_id: impl Into<TaskId>, message: impl Into<String>) -> Self {
        Self::new(task_id, LogLevel::Info, message)
    }

    pub fn error(task_id: impl Into<TaskId>, message: impl Into<String>) -> Self {
        Self::new(task_id, LogLevel::Error, message)
    }

    pub fn with_step_id(mut self, step_id: impl Into<StepId>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// TaskStore trait - async interface for task persistence
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Save a task (insert or update)
    async fn save(&self, task: &Task) -> Result<(), StoreError>;

    /// Load a task by ID
    async fn load(&self, task_id: &str) -> Result<Option<Task>, StoreError>;

    /// List tasks by status
    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError>;

    /// Delete a task and its log trail
    async fn delete(&self, task_id: &str) -> Result<bool, StoreError>;

    /// Append an entry to a task's log trail
    async fn append_log(&self, entry: TaskLogEntry) -> Result<(), StoreError>;

    /// Log trail of a task in append order
    async fn logs(&self, task_id: &str) -> Result<Vec<TaskLogEntry>, StoreError>;
}
