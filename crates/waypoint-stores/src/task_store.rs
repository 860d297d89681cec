//! TaskStore in-memory implementation.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use waypoint_core::store::{StoreError, TaskLogEntry, TaskStore};
use waypoint_core::types::{Task, TaskStatus};

const DEFAULT_IN_MEMORY_TASK_LIMIT: usize = 5_000;

/// In-memory implementation for development and testing.
///
/// Holds at most `max_tasks` tasks; saving a new task beyond the limit
/// evicts the least recently written one together with its log trail.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    order: RwLock<VecDeque<String>>,
    logs: RwLock<HashMap<String, Vec<TaskLogEntry>>>,
    max_tasks: usize,
}

impl InMemoryTaskStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::with_max_tasks(DEFAULT_IN_MEMORY_TASK_LIMIT)
    }

    /// Create a new in-memory store with a hard capacity limit.
    pub fn with_max_tasks(max_tasks: usize) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            order: RwLock::new(VecDeque::new()),
            logs: RwLock::new(HashMap::new()),
            max_tasks: max_tasks.max(1),
        }
    }

    fn touch_order(order: &mut VecDeque<String>, task_id: &str) {
        order.retain(|id| id != task_id);
        order.push_back(task_id.to_string());
    }

    fn drop_logs(&self, task_id: &str) -> Result<(), StoreError> {
        let mut logs = self
            .logs
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        logs.remove(task_id);
        Ok(())
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: &Task) -> Result<(), StoreError> {
        let evicted = {
            let mut tasks = self
                .tasks
                .write()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            let mut order = self
                .order
                .write()
                .map_err(|e| StoreError::Internal(e.to_string()))?;

            let mut evicted = None;
            if !tasks.contains_key(task.id.as_str()) && tasks.len() >= self.max_tasks {
                if let Some(oldest_id) = order.pop_front() {
                    tasks.remove(&oldest_id);
                    evicted = Some(oldest_id);
                }
            }
            tasks.insert(task.id.clone(), task.clone());
            Self::touch_order(&mut order, task.id.as_str());
            evicted
        };

        if let Some(oldest_id) = evicted {
            tracing::debug!(task_id = %oldest_id, "evicted task from in-memory store");
            self.drop_logs(&oldest_id)?;
        }
        Ok(())
    }

    async fn load(&self, task_id: &str) -> Result<Option<Task>, StoreError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(tasks.get(task_id).cloned())
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, StoreError> {
        let tasks = self
            .tasks
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let order = self
            .order
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(order
            .iter()
            .filter_map(|id| tasks.get(id))
            .filter(|t| t.status == status)
            .cloned()
            .collect())
    }

    async fn delete(&self, task_id: &str) -> Result<bool, StoreError> {
        let removed = {
            let mut tasks = self
                .tasks
                .write()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            tasks.remove(task_id).is_some()
        };
        if removed {
            let mut order = self
                .order
                .write()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            order.retain(|id| id != task_id);
        }
        self.drop_logs(task_id)?;
        Ok(removed)
    }

    async fn append_log(&self, entry: TaskLogEntry) -> Result<(), StoreError> {
        {
            let tasks = self
                .tasks
                .read()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            if !tasks.contains_key(entry.task_id.as_str()) {
                return Err(StoreError::NotFound(entry.task_id));
            }
        }
        let mut logs = self
            .logs
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        logs.entry(entry.task_id.clone()).or_default().push(entry);
        Ok(())
    }

    async fn logs(&self, task_id: &str) -> Result<Vec<TaskLogEntry>, StoreError> {
        let logs = self
            .logs
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(logs.get(task_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waypoint_core::store::LogLevel;
    use waypoint_core::types::{IntentType, Plan, Step};

    fn task(intent_text: &str) -> Task {
        Task::new(
            "chat-1",
            "user-1",
            intent_text,
            Plan::new(IntentType::WebResearch, vec![Step::new("s1", "web_search")]),
        )
    }

    #[test]
    fn test_in_memory_task_store_limit() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::with_max_tasks(2);
            let t1 = task("a");
            let t2 = task("b");
            let t3 = task("c");
            store.save(&t1).await.unwrap();
            store
                .append_log(TaskLogEntry::info(t1.id.clone(), "created"))
                .await
                .unwrap();
            store.save(&t2).await.unwrap();
            store.save(&t3).await.unwrap();

            assert!(store.load(t1.id.as_str()).await.unwrap().is_none());
            assert!(store.logs(t1.id.as_str()).await.unwrap().is_empty());
            assert!(store.load(t2.id.as_str()).await.unwrap().is_some());
            assert!(store.load(t3.id.as_str()).await.unwrap().is_some());
        });
    }

    #[test]
    fn test_save_overwrites_and_lists_by_status() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let mut running = task("a");
            let pending = task("b");
            store.save(&running).await.unwrap();
            store.save(&pending).await.unwrap();

            running.transition(TaskStatus::Running).unwrap();
            store.save(&running).await.unwrap();

            let listed = store.list_by_status(TaskStatus::Running).await.unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].id, running.id);
            let pending_list = store.list_by_status(TaskStatus::Pending).await.unwrap();
            assert_eq!(pending_list.len(), 1);
        });
    }

    #[test]
    fn test_log_trail_is_append_ordered() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let t = task("a");
            store.save(&t).await.unwrap();
            store
                .append_log(TaskLogEntry::info(t.id.clone(), "started"))
                .await
                .unwrap();
            store
                .append_log(
                    TaskLogEntry::error(t.id.clone(), "step failed")
                        .with_step_id("s1")
                        .with_data(json!({"code": "TIMEOUT"})),
                )
                .await
                .unwrap();

            let logs = store.logs(&t.id).await.unwrap();
            assert_eq!(logs.len(), 2);
            assert_eq!(logs[0].message, "started");
            assert_eq!(logs[1].level, LogLevel::Error);
            assert_eq!(logs[1].data["code"], "TIMEOUT");
            assert!(logs[0].timestamp <= logs[1].timestamp);
        });
    }

    #[test]
    fn test_log_for_unknown_task_rejected() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let err = store
                .append_log(TaskLogEntry::info("ghost", "hello"))
                .await
                .unwrap_err();
            assert!(matches!(err, StoreError::NotFound(_)));
        });
    }

    #[test]
    fn test_delete_removes_task_and_logs() {
        tokio_test::block_on(async {
            let store = InMemoryTaskStore::new();
            let t = task("a");
            store.save(&t).await.unwrap();
            store
                .append_log(TaskLogEntry::info(t.id.clone(), "created"))
                .await
                .unwrap();
            assert!(store.delete(&t.id).await.unwrap());
            assert!(!store.delete(&t.id).await.unwrap());
            assert!(store.logs(&t.id).await.unwrap().is_empty());
        });
    }
}
