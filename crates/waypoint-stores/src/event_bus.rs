//! In-process EventBus based on tokio broadcast channels.

use async_trait::async_trait;
use tokio::sync::broadcast;

use waypoint_core::events::{EventPublisher, TaskEvent};

/// Fans task lifecycle events out to live subscribers.
pub struct BroadcastEventBus {
    tx: broadcast::Sender<TaskEvent>,
    capacity: usize,
}

impl BroadcastEventBus {
    /// Create a new broadcast bus with channel capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Return the configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to lifecycle events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventBus {
    async fn publish(&self, event: TaskEvent) -> Result<(), String> {
        tracing::debug!(event = event.name(), task_id = %event.task_id(), "publishing task event");
        // No subscribers is not an error.
        match self.tx.send(event) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }
}
