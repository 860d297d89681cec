//! Queue boundary: named task queue feeding the worker pool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use waypoint_core::types::TaskId;

/// One queued request to execute a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskJob {
    pub task_id: TaskId,
    pub user_id: String,
    #[serde(default)]
    pub payload: Value,
}

impl TaskJob {
    pub fn new(task_id: impl Into<TaskId>, user_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            user_id: user_id.into(),
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue '{0}' is closed")]
    Closed(String),
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    fn name(&self) -> &str;

    async fn enqueue(&self, job: TaskJob) -> Result<(), QueueError>;

    /// Next job; `None` once the queue is closed and drained
    async fn dequeue(&self) -> Option<TaskJob>;
}

/// In-process bounded queue on a tokio mpsc channel.
pub struct InMemoryTaskQueue {
    name: String,
    tx: mpsc::Sender<TaskJob>,
    rx: Mutex<mpsc::Receiver<TaskJob>>,
}

impl InMemoryTaskQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            name: name.into(),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Stop accepting jobs; already queued jobs can still be dequeued.
    pub async fn close(&self) {
        self.rx.lock().await.close();
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, job: TaskJob) -> Result<(), QueueError> {
        tracing::debug!(queue = %self.name, task_id = %job.task_id, "enqueue task job");
        self.tx
            .send(job)
            .await
            .map_err(|_| QueueError::Closed(self.name.clone()))
    }

    async fn dequeue(&self) -> Option<TaskJob> {
        self.rx.lock().await.recv().await
    }
}
