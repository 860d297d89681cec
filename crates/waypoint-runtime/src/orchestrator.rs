//! Task orchestrator
//!
//! Drives one task through the state machine around a plan run: loads the
//! task, runs its plan snapshot, checkpoints after every step and records the
//! outcome. Pause and cancel stop scheduling of the next step only.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use waypoint_core::events::{EventPublisher, TaskEvent};
use waypoint_core::executor::{
    truncate_for_log, HaltReason, PlanExecutionResult, StepProgressEvent, StepProgressReporter,
    ToolExecutor,
};
use waypoint_core::store::{LogLevel, StoreError, TaskLogEntry, TaskStore};
use waypoint_core::tool::{ExecutionContext, ToolResult};
use waypoint_core::types::{StepId, Task, TaskError, TaskId, TaskStatus, TransitionError};

const MAX_LOG_TEXT_CHARS: usize = 2_000;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("task not found: {0}")]
    TaskNotFound(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("task {0} already has a run in flight")]
    AlreadyRunning(String),
}

/// Identity of one plan run; only the owner may release its slot
struct InFlightRun {
    generation: u64,
    token: CancellationToken,
}

/// Serialized task mutations plus their log trail and events
struct TaskLedger {
    store: Arc<dyn TaskStore>,
    events: Arc<dyn EventPublisher>,
    write_lock: tokio::sync::Mutex<()>,
}

impl TaskLedger {
    async fn load(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        self.store
            .load(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::TaskNotFound(task_id.to_string()))
    }

    /// Load, mutate and save a task under the ledger lock
    async fn update<F>(&self, task_id: &str, mutate: F) -> Result<Task, OrchestratorError>
    where
        F: FnOnce(&mut Task) -> Result<(), OrchestratorError> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut task = self.load(task_id).await?;
        mutate(&mut task)?;
        self.store.save(&task).await?;
        Ok(task)
    }

    async fn transition(&self, task_id: &str, to: TaskStatus) -> Result<Task, OrchestratorError> {
        let mut from = to;
        let task = self
            .update(task_id, |task| {
                from = task.status;
                task.transition(to)?;
                Ok(())
            })
            .await?;
        self.status_changed(&task, from).await;
        Ok(task)
    }

    async fn status_changed(&self, task: &Task, from: TaskStatus) {
        tracing::info!(task_id = %task.id, from = %from, to = %task.status, "task status changed");
        self.log(
            TaskLogEntry::info(task.id.clone(), format!("status {} -> {}", from, task.status))
                .with_data(json!({ "from": from, "to": task.status })),
        )
        .await;
        self.publish(TaskEvent::StatusChanged {
            task_id: task.id.clone(),
            from,
            to: task.status,
        })
        .await;
    }

    async fn log(&self, entry: TaskLogEntry) {
        if let Err(err) = self.store.append_log(entry).await {
            tracing::warn!("failed to append task log: {}", err);
        }
    }

    async fn publish(&self, event: TaskEvent) {
        let name = event.name();
        if let Err(err) = self.events.publish(event).await {
            tracing::warn!(event = name, "failed to publish task event: {}", err);
        }
    }
}

/// Persists a checkpoint and emits `task.step.completed` after every step
struct CheckpointReporter {
    ledger: Arc<TaskLedger>,
}

#[async_trait]
impl StepProgressReporter for CheckpointReporter {
    async fn step_completed(&self, event: StepProgressEvent) -> Result<(), String> {
        let results = event.results_so_far;
        self.ledger
            .update(&event.task_id, move |task| {
                task.set_checkpoint(results);
                Ok(())
            })
            .await
            .map_err(|e| e.to_string())?;

        let step = &event.result;
        let entry = if step.success {
            TaskLogEntry::info(event.task_id.clone(), format!("step {} succeeded", step.step_id))
        } else {
            TaskLogEntry::new(
                event.task_id.clone(),
                LogLevel::Error,
                format!(
                    "step {} failed: {}",
                    step.step_id,
                    step.result.error_message().unwrap_or("unknown error")
                ),
            )
            .with_data(json!({ "error": step.result.error }))
        };
        self.ledger
            .log(entry.with_step_id(step.step_id.clone()))
            .await;

        self.ledger
            .publish(TaskEvent::StepCompleted {
                task_id: event.task_id,
                step_index: event.step_index,
                total_steps: event.total_steps,
                result: event.result,
            })
            .await;
        Ok(())
    }
}

/// Thin integration layer between stores, executor and events
pub struct TaskOrchestrator {
    ledger: Arc<TaskLedger>,
    executor: Arc<ToolExecutor>,
    in_flight: Mutex<HashMap<TaskId, InFlightRun>>,
    next_generation: AtomicU64,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        executor: Arc<ToolExecutor>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            ledger: Arc::new(TaskLedger {
                store,
                events,
                write_lock: tokio::sync::Mutex::new(()),
            }),
            executor,
            in_flight: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Persist a new PENDING task
    pub async fn create_task(&self, task: Task) -> Result<Task, OrchestratorError> {
        self.ledger.store.save(&task).await?;
        self.ledger
            .log(
                TaskLogEntry::info(task.id.clone(), "task created").with_data(json!({
                    "intent": task.plan_snapshot.intent_type,
                    "totalSteps": task.total_steps,
                })),
            )
            .await;
        tracing::info!(task_id = %task.id, total_steps = task.total_steps, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        self.ledger.load(task_id).await
    }

    pub async fn task_logs(&self, task_id: &str) -> Result<Vec<TaskLogEntry>, OrchestratorError> {
        Ok(self.ledger.store.logs(task_id).await?)
    }

    /// Run a PENDING or PAUSED task to its next resting state.
    ///
    /// Plan failures are recorded on the task and returned as `Ok`; `Err`
    /// means the task could not be driven at all. A task with a run still in
    /// flight is rejected with `AlreadyRunning`, even after a pause.
    pub async fn execute_task(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        let (generation, token) = self.claim(task_id)?;
        let outcome = self.drive(task_id, token).await;
        self.release(task_id, generation);
        outcome
    }

    async fn drive(
        &self,
        task_id: &str,
        token: CancellationToken,
    ) -> Result<Task, OrchestratorError> {
        let task = self.ledger.transition(task_id, TaskStatus::Running).await?;

        match self.run(task, token).await {
            Ok(task) => Ok(task),
            Err(err) => {
                tracing::error!(task_id = %task_id, error = %err, "task execution aborted");
                self.fail(task_id, TaskError::new(err.to_string())).await?;
                Err(err)
            }
        }
    }

    /// RUNNING -> PAUSED; the in-flight run stops before its next step
    pub async fn pause_task(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        let task = self.ledger.transition(task_id, TaskStatus::Paused).await?;
        self.trip(task_id);
        Ok(task)
    }

    /// Cancel a non-terminal task; the in-flight run stops before its next step
    pub async fn cancel_task(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        let task = self.ledger.transition(task_id, TaskStatus::Cancelled).await?;
        self.trip(task_id);
        Ok(task)
    }

    /// PAUSED -> RUNNING, continuing after the last checkpoint
    pub async fn resume_task(&self, task_id: &str) -> Result<Task, OrchestratorError> {
        let task = self.ledger.load(task_id).await?;
        if task.status != TaskStatus::Paused {
            return Err(TransitionError {
                from: task.status,
                to: TaskStatus::Running,
                valid_next: task.status.valid_next_states().to_vec(),
            }
            .into());
        }
        self.execute_task(task_id).await
    }

    /// Whether a plan run for `task_id` is currently in flight
    pub fn is_running(&self, task_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(task_id)
    }

    fn trip(&self, task_id: &str) {
        let map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(run) = map.get(task_id) {
            run.token.cancel();
        }
    }

    fn claim(&self, task_id: &str) -> Result<(u64, CancellationToken), OrchestratorError> {
        let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if map.contains_key(task_id) {
            return Err(OrchestratorError::AlreadyRunning(task_id.to_string()));
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        map.insert(
            task_id.to_string(),
            InFlightRun {
                generation,
                token: token.clone(),
            },
        );
        Ok((generation, token))
    }

    fn release(&self, task_id: &str, generation: u64) {
        let mut map = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if map.get(task_id).is_some_and(|run| run.generation == generation) {
            map.remove(task_id);
        }
    }

    async fn run(&self, task: Task, token: CancellationToken) -> Result<Task, OrchestratorError> {
        let seeded: HashMap<StepId, ToolResult> = task
            .step_results
            .iter()
            .filter(|r| r.success)
            .map(|r| (r.step_id.clone(), r.result.clone()))
            .collect();
        if !seeded.is_empty() {
            tracing::info!(task_id = %task.id, resumed_steps = seeded.len(), "resuming from checkpoint");
        }

        let ctx = ExecutionContext::new(task.user_id.clone(), task.id.clone())
            .with_user_profile(task.user_profile.clone())
            .with_dry_run(false)
            .with_cancellation_token(token)
            .with_previous_results(seeded)
            .with_progress_reporter(Arc::new(CheckpointReporter {
                ledger: self.ledger.clone(),
            }));

        let outcome = self.executor.execute_plan(&task.plan_snapshot, &ctx).await;
        self.finish(&task.id, outcome).await
    }

    async fn finish(
        &self,
        task_id: &str,
        outcome: PlanExecutionResult,
    ) -> Result<Task, OrchestratorError> {
        let current = self.ledger.load(task_id).await?;
        let cancelled = outcome.halted == Some(HaltReason::Cancelled);
        if cancelled && current.status == TaskStatus::Running {
            tracing::warn!(task_id = %task_id, "run cancelled without a status change");
        }
        if cancelled || current.status != TaskStatus::Running {
            // paused or cancelled; never a failure
            let results = outcome.step_results;
            let task = self
                .ledger
                .update(task_id, move |task| {
                    task.set_checkpoint(results);
                    Ok(())
                })
                .await?;
            self.ledger
                .log(TaskLogEntry::info(
                    task_id,
                    format!("execution halted with status {}", task.status),
                ))
                .await;
            tracing::info!(task_id = %task_id, status = %task.status, "execution halted");
            return Ok(task);
        }

        if outcome.success {
            let payload = serde_json::to_value(&outcome.step_results).map_err(StoreError::from)?;
            let results = outcome.step_results;
            let result_payload = payload.clone();
            let task = self
                .ledger
                .update(task_id, move |task| {
                    task.set_checkpoint(results);
                    task.succeed(result_payload)?;
                    Ok(())
                })
                .await?;
            self.ledger.status_changed(&task, TaskStatus::Running).await;
            self.ledger
                .publish(TaskEvent::Completed {
                    task_id: task.id.clone(),
                    result: payload,
                })
                .await;
            tracing::info!(
                task_id = %task_id,
                completed_steps = outcome.completed_steps,
                execution_time_ms = outcome.execution_time_ms,
                "task succeeded"
            );
            return Ok(task);
        }

        let error = task_error_from(&outcome);
        let results = outcome.step_results;
        let failure = error.clone();
        let task = self
            .ledger
            .update(task_id, move |task| {
                task.set_checkpoint(results);
                task.fail(failure)?;
                Ok(())
            })
            .await?;
        self.record_failure(&task, error).await;
        Ok(task)
    }

    /// Best-effort FAILED transition for a flow that could not complete
    async fn fail(&self, task_id: &str, error: TaskError) -> Result<(), OrchestratorError> {
        let failure = error.clone();
        let result = self
            .ledger
            .update(task_id, move |task| {
                if task.status == TaskStatus::Running {
                    task.fail(failure)?;
                }
                Ok(())
            })
            .await;
        match result {
            Ok(task) if task.status == TaskStatus::Failed => {
                self.record_failure(&task, error).await;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(err) => {
                tracing::error!(task_id = %task_id, error = %err, "failed to mark task as failed");
                Ok(())
            }
        }
    }

    async fn record_failure(&self, task: &Task, error: TaskError) {
        tracing::error!(
            task_id = %task.id,
            step_id = ?error.step_id,
            error = %truncate_for_log(&error.message, MAX_LOG_TEXT_CHARS),
            "task failed"
        );
        self.ledger.status_changed(task, TaskStatus::Running).await;
        let mut entry = TaskLogEntry::error(task.id.clone(), error.message.clone())
            .with_data(json!({ "error": error }));
        if let Some(step_id) = &error.step_id {
            entry = entry.with_step_id(step_id.clone());
        }
        self.ledger.log(entry).await;
        self.ledger
            .publish(TaskEvent::Failed {
                task_id: task.id.clone(),
                error,
            })
            .await;
    }
}

fn task_error_from(outcome: &PlanExecutionResult) -> TaskError {
    let message = outcome
        .failure_message()
        .unwrap_or_else(|| "plan execution failed".to_string());
    let mut error = TaskError::new(message);
    if let Some(failed) = outcome.first_failure() {
        error.step_id = Some(failed.step_id.clone());
        if let Some(tool_error) = &failed.result.error {
            error.code = Some(tool_error.code);
            error.details = tool_error.details.clone();
        }
    } else if let Some(HaltReason::StepFailed { step_id }) = &outcome.halted {
        error.step_id = Some(step_id.clone());
    }
    error
}
