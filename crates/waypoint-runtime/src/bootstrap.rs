//! Runtime bootstrap: wires stores, executor, orchestrator, queue and
//! planner from a `WaypointConfig`.

use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;

use waypoint_config::{load_config, ConfigError, ObservabilityConfig, WaypointConfig};
use waypoint_core::planner::{
    templates, CompletionClient, CompletionOptions, LlmPlanGenerator, PlanSource, PlanningService,
};
use waypoint_core::tool::{HandlerRegistry, ToolCatalog};
use waypoint_core::types::{IntentClassification, Task, TaskId, TaskStatus, TransitionError};
use waypoint_core::validator::PlanValidator;
use waypoint_core::ToolExecutor;
use waypoint_stores::{BroadcastEventBus, InMemoryTaskStore};

use crate::orchestrator::{OrchestratorError, TaskOrchestrator};
use crate::queue::{InMemoryTaskQueue, QueueError, TaskJob, TaskQueue};
use crate::worker::WorkerPool;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("unsupported task store backend: {0}")]
    UnsupportedStoreBackend(String),
}

/// Errors surfaced by the application-level task API
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Fully wired Waypoint runtime.
pub struct RuntimeApp {
    pub config: WaypointConfig,
    pub orchestrator: Arc<TaskOrchestrator>,
    pub queue: Arc<InMemoryTaskQueue>,
    pub events: Arc<BroadcastEventBus>,
    pub catalog: Arc<ToolCatalog>,
    planning: Option<PlanningService>,
}

impl RuntimeApp {
    /// Build from a config file.
    pub fn from_path(path: &Path, registry: HandlerRegistry) -> Result<Self, BootstrapError> {
        let config = load_config(path)?;
        Self::from_config(config, registry)
    }

    /// Build from an already loaded config.
    pub fn from_config(
        config: WaypointConfig,
        registry: HandlerRegistry,
    ) -> Result<Self, BootstrapError> {
        init_tracing_if_needed(&config.observability);

        let store = match config.stores.task.backend.as_str() {
            "in_memory" => Arc::new(InMemoryTaskStore::with_max_tasks(config.stores.task.max_tasks)),
            other => return Err(BootstrapError::UnsupportedStoreBackend(other.to_string())),
        };

        let executor = ToolExecutor::new(Arc::new(registry))
            .with_default_timeout(Duration::from_millis(config.executor.default_timeout_ms))
            .with_default_max_retries(config.executor.max_retries)
            .with_retry_policy(
                Duration::from_millis(config.executor.retry_base_delay_ms),
                Duration::from_millis(config.executor.retry_max_delay_ms),
            );
        let events = Arc::new(BroadcastEventBus::new(config.events.capacity));
        let orchestrator = Arc::new(TaskOrchestrator::new(
            store,
            Arc::new(executor),
            events.clone(),
        ));
        let queue = Arc::new(InMemoryTaskQueue::new(
            config.worker.queue_name.clone(),
            config.worker.queue_capacity,
        ));

        tracing::info!(
            app = %config.app.name,
            environment = %config.app.environment,
            concurrency = config.worker.concurrency,
            "runtime bootstrapped"
        );

        Ok(Self {
            config,
            orchestrator,
            queue,
            events,
            catalog: Arc::new(ToolCatalog::builtin()),
            planning: None,
        })
    }

    /// Replace the tool catalog used for planning and validation.
    pub fn with_catalog(mut self, catalog: ToolCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    /// Generate plans through a completion client instead of templates only.
    pub fn with_completion_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        let options = CompletionOptions {
            temperature: self.config.planner.temperature,
            max_tokens: self.config.planner.max_tokens,
            timeout_ms: self.config.planner.timeout_ms,
        };
        let generator = LlmPlanGenerator::new(client, self.catalog.clone()).with_options(options);
        self.planning = Some(PlanningService::new(
            Arc::new(generator),
            PlanValidator::new(self.catalog.clone()),
        ));
        self
    }

    /// Start the worker pool with the configured concurrency.
    pub fn start_workers(&self) -> WorkerPool {
        WorkerPool::spawn(
            self.queue.clone(),
            self.orchestrator.clone(),
            self.config.worker.concurrency,
        )
    }

    /// Plan an intent, persist the task with its plan snapshot and enqueue it.
    pub async fn submit_intent(
        &self,
        chat_id: &str,
        user_id: &str,
        intent_text: &str,
        intent: &IntentClassification,
    ) -> Result<Task, RuntimeError> {
        let plan = match &self.planning {
            Some(planning) => {
                let outcome = planning.plan(intent).await;
                if outcome.source == PlanSource::Template {
                    tracing::info!(
                        intent = %intent.intent_type,
                        reason = outcome.fallback_reason.as_deref().unwrap_or(""),
                        "using template plan"
                    );
                }
                outcome.plan
            }
            None => templates::template_plan(intent),
        };
        let task = Task::new(chat_id, user_id, intent_text, plan);
        self.submit(task).await
    }

    /// Persist a task and enqueue it for execution.
    pub async fn submit(&self, task: Task) -> Result<Task, RuntimeError> {
        let task = self.orchestrator.create_task(task).await?;
        self.queue
            .enqueue(TaskJob::new(task.id.clone(), task.user_id.clone()))
            .await?;
        Ok(task)
    }

    /// Re-enqueue a PAUSED task; execution continues from its checkpoint.
    pub async fn resume(&self, task_id: &TaskId) -> Result<(), RuntimeError> {
        let task = self.orchestrator.get_task(task_id).await?;
        if task.status != TaskStatus::Paused {
            return Err(OrchestratorError::from(TransitionError {
                from: task.status,
                to: TaskStatus::Running,
                valid_next: task.status.valid_next_states().to_vec(),
            })
            .into());
        }
        if self.orchestrator.is_running(&task.id) {
            return Err(OrchestratorError::AlreadyRunning(task.id.clone()).into());
        }
        self.queue
            .enqueue(TaskJob::new(task.id.clone(), task.user_id.clone()))
            .await?;
        Ok(())
    }
}

fn init_tracing_if_needed(observability: &ObservabilityConfig) {
    TRACING_INIT.get_or_init(|| {
        let log_file_path = std::env::var("WAYPOINT_LOG_FILE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| observability.log_file.clone());
        let file_writer = log_file_path.as_deref().and_then(create_log_writer);
        let fallback_level = match observability.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => "info",
        };

        let make_filter = || {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        };

        match (observability.json, file_writer) {
            (true, Some(writer)) => {
                let _ = tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_writer(writer)
                    .try_init();
            }
            (true, None) => {
                let _ = tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .try_init();
            }
            (false, Some(writer)) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .try_init();
            }
            (false, None) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .try_init();
            }
        }

        tracing::info!(
            log_level = %observability.log_level,
            json = observability.json,
            log_file = log_file_path.as_deref().unwrap_or("(stdout)"),
            "tracing initialized"
        );
    });
}

fn create_log_writer(path: &str) -> Option<std::sync::Mutex<std::fs::File>> {
    use std::fs::{create_dir_all, OpenOptions};

    let file_path = Path::new(path);
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = create_dir_all(parent) {
                eprintln!(
                    "failed to create log directory '{}': {}",
                    parent.display(),
                    err
                );
                return None;
            }
        }
    }
    match OpenOptions::new().create(true).append(true).open(file_path) {
        Ok(file) => Some(std::sync::Mutex::new(file)),
        Err(err) => {
            eprintln!("failed to open log file '{}': {}", file_path.display(), err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use waypoint_core::types::IntentType;

    #[test]
    fn test_from_path_wires_runtime() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "app:\n  name: wp-test\nworker:\n  concurrency: 2\n  queue_name: jobs\n"
        )
        .unwrap();
        let app = RuntimeApp::from_path(file.path(), HandlerRegistry::new()).unwrap();
        assert_eq!(app.config.worker.concurrency, 2);
        assert_eq!(app.queue.name(), "jobs");
    }

    #[test]
    fn test_from_config_rejects_unknown_backend() {
        let mut config = WaypointConfig::default();
        config.stores.task.backend = "postgres".to_string();
        assert!(matches!(
            RuntimeApp::from_config(config, HandlerRegistry::new()),
            Err(BootstrapError::UnsupportedStoreBackend(_))
        ));
    }

    #[test]
    fn test_submit_intent_uses_template_and_enqueues() {
        tokio_test::block_on(async {
            let app = RuntimeApp::from_config(WaypointConfig::default(), HandlerRegistry::new())
                .unwrap();
            let intent = IntentClassification::new(IntentType::WebResearch)
                .with_param("query", serde_json::json!("rust"));
            let task = app
                .submit_intent("chat-1", "user-1", "research rust", &intent)
                .await
                .unwrap();
            assert_eq!(task.status, TaskStatus::Pending);
            assert_eq!(task.total_steps, 2);

            let job = app.queue.dequeue().await.unwrap();
            assert_eq!(job.task_id, task.id);
        });
    }

    #[test]
    fn test_resume_requires_paused_task() {
        tokio_test::block_on(async {
            let app = RuntimeApp::from_config(WaypointConfig::default(), HandlerRegistry::new())
                .unwrap();
            let task = app
                .submit(Task::new(
                    "chat-1",
                    "user-1",
                    "nothing",
                    waypoint_core::types::Plan::empty(IntentType::Unknown),
                ))
                .await
                .unwrap();
            assert!(matches!(
                app.resume(&task.id).await,
                Err(RuntimeError::Orchestrator(OrchestratorError::Transition(_)))
            ));
        });
    }
}
