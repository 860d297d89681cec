//! Executor module
//!
//! Runs tool calls and plans:
//! - `execute_tool`: one tool call with timeout race, retry and backoff
//! - `execute_plan`: walks `plan.steps` in list order, gating each step on
//!   its dependencies and short-circuiting on required-step failure
//!
//! Neither entry point returns an error: every failure is reported as a
//! `ToolResult` with `success = false`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};

use crate::tool::{
    ExecutionContext, HandlerRegistry, StepExecutionResult, ToolError, ToolErrorCode, ToolResult,
};
use crate::types::{Plan, Step, StepId, TaskId};

const MAX_LOG_TEXT_CHARS: usize = 2_000;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(1_000);
const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_millis(10_000);

/// Cap a string for log output
pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

/// Delay before retry number `attempt + 1`: `min(base * 2^attempt, max)`
pub fn retry_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis();
    if base_ms == 0 {
        return Duration::ZERO;
    }
    let max_ms = max.as_millis().max(base_ms);
    let shift = attempt.min(20);
    let multiplier = 1u128 << shift;
    let backoff_ms = base_ms.saturating_mul(multiplier).min(max_ms);
    Duration::from_millis(u64::try_from(backoff_ms).unwrap_or(u64::MAX))
}

/// Why a plan run stopped before reaching the last step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum HaltReason {
    /// A required step failed
    StepFailed { step_id: StepId },
    /// The run's cancellation token fired between steps
    Cancelled,
}

/// Aggregate outcome of a plan run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanExecutionResult {
    pub success: bool,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub step_results: Vec<StepExecutionResult>,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted: Option<HaltReason>,
}

impl PlanExecutionResult {
    /// First recorded step that did not succeed
    pub fn first_failure(&self) -> Option<&StepExecutionResult> {
        self.step_results.iter().find(|r| !r.success)
    }

    /// Message describing why the run failed, if it did
    pub fn failure_message(&self) -> Option<String> {
        if self.success {
            return None;
        }
        if let Some(failed) = self.first_failure() {
            let message = failed
                .result
                .error_message()
                .unwrap_or("step failed without an error message");
            return Some(message.to_string());
        }
        match self.halted {
            Some(HaltReason::Cancelled) => Some("execution cancelled".to_string()),
            _ => Some(format!(
                "completed {} of {} steps",
                self.completed_steps, self.total_steps
            )),
        }
    }
}

/// Per-step progress notification
#[derive(Debug, Clone)]
pub struct StepProgressEvent {
    pub task_id: TaskId,
    /// Position of the step in the plan
    pub step_index: usize,
    pub total_steps: usize,
    pub result: StepExecutionResult,
    /// All results recorded so far in this run, including `result`
    pub results_so_far: Vec<StepExecutionResult>,
}

/// Sink interface for step progress reporting.
#[async_trait]
pub trait StepProgressReporter: Send + Sync {
    async fn step_completed(&self, event: StepProgressEvent) -> Result<(), String>;
}

async fn report_progress(ctx: &ExecutionContext, event: StepProgressEvent) {
    if let Some(reporter) = &ctx.progress_reporter {
        if let Err(err) = reporter.step_completed(event).await {
            tracing::warn!("failed to report step progress: {}", err);
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// The executor - runs tool calls and plans against a handler registry
pub struct ToolExecutor {
    registry: Arc<HandlerRegistry>,
    /// Retries applied when the context does not set a budget
    pub default_max_retries: u32,
    /// Per-attempt timeout applied when the context does not set one
    pub default_timeout: Duration,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            default_max_retries: DEFAULT_MAX_RETRIES,
            default_timeout: DEFAULT_TIMEOUT,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
        }
    }

    /// Configure exponential backoff between attempts.
    pub fn with_retry_policy(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.retry_base_delay = base_delay;
        self.retry_max_delay = max_delay.max(base_delay);
        self
    }

    pub fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute one tool call. Never fails; errors are carried in the result.
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        params: Value,
        ctx: &ExecutionContext,
    ) -> ToolResult {
        let started = Instant::now();
        let finish = |result: ToolResult, attempts: u32| {
            let mut result = result.with_execution_time_ms(elapsed_ms(started));
            result.metadata.attempts = attempts;
            result.metadata.tool_name = tool_name.to_string();
            if let Some(step_id) = &ctx.step_id {
                result.metadata.step_id = Some(step_id.clone());
            }
            result
        };

        let Some(handler) = self.registry.get_handler(tool_name) else {
            tracing::error!(task_id = %ctx.task_id, tool = %tool_name, "no handler registered");
            return finish(
                ToolResult::failure(
                    tool_name,
                    ToolError::non_retryable(
                        ToolErrorCode::ExecutionError,
                        format!("no handler registered for tool '{}'", tool_name),
                    ),
                ),
                0,
            );
        };

        if !handler.supports_context(ctx) {
            return finish(
                ToolResult::failure(
                    tool_name,
                    ToolError::non_retryable(
                        ToolErrorCode::AuthRequired,
                        format!("tool '{}' requires an authenticated user", tool_name),
                    ),
                ),
                0,
            );
        }

        if let Err(reason) = handler.validate(&params) {
            return finish(
                ToolResult::failure(
                    tool_name,
                    ToolError::non_retryable(ToolErrorCode::InvalidParams, reason),
                ),
                0,
            );
        }

        if ctx.dry_run {
            return finish(
                ToolResult::success(
                    tool_name,
                    serde_json::json!({ "dryRun": true, "params": params }),
                ),
                0,
            );
        }

        let max_retries = ctx.max_retries.unwrap_or(self.default_max_retries);
        let attempt_timeout = ctx.timeout.unwrap_or(self.default_timeout);
        let mut attempt: u32 = 0;

        loop {
            let call = AssertUnwindSafe(handler.execute(params.clone(), ctx)).catch_unwind();
            let result = match timeout(attempt_timeout, call).await {
                Ok(Ok(Ok(result))) => result,
                Ok(Ok(Err(err))) => ToolResult::failure(
                    tool_name,
                    ToolError::non_retryable(ToolErrorCode::UnknownError, err.to_string()),
                ),
                Ok(Err(payload)) => ToolResult::failure(
                    tool_name,
                    ToolError::non_retryable(
                        ToolErrorCode::UnknownError,
                        panic_message(payload.as_ref()),
                    ),
                ),
                Err(_) => ToolResult::failure(
                    tool_name,
                    ToolError::new(
                        ToolErrorCode::Timeout,
                        format!(
                            "tool '{}' timed out after {}ms",
                            tool_name,
                            attempt_timeout.as_millis()
                        ),
                    ),
                ),
            };

            if result.is_success() {
                if attempt > 0 {
                    tracing::info!(
                        task_id = %ctx.task_id,
                        tool = %tool_name,
                        attempts = attempt + 1,
                        "tool succeeded after retries"
                    );
                }
                return finish(result, attempt + 1);
            }

            let retryable = result.error.as_ref().is_some_and(ToolError::is_retryable);
            if !retryable || attempt >= max_retries {
                return finish(result, attempt + 1);
            }

            let delay = retry_delay(attempt, self.retry_base_delay, self.retry_max_delay);
            tracing::warn!(
                task_id = %ctx.task_id,
                tool = %tool_name,
                message = %truncate_for_log(result.error_message().unwrap_or_default(), MAX_LOG_TEXT_CHARS),
                attempt = attempt + 1,
                max_retries = max_retries,
                retry_in_ms = delay.as_millis() as u64,
                "retrying tool after retryable error"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
            attempt += 1;
        }
    }

    /// Execute the steps of `plan` in list order.
    pub async fn execute_plan(&self, plan: &Plan, ctx: &ExecutionContext) -> PlanExecutionResult {
        let started = Instant::now();
        let total_steps = plan.steps.len();
        let mut results: HashMap<StepId, ToolResult> = ctx.previous_step_results.clone();
        let mut step_results: Vec<StepExecutionResult> = Vec::with_capacity(total_steps);
        let mut halted = None;

        for (index, step) in plan.steps.iter().enumerate() {
            if let Some(seeded) = ctx.previous_step_results.get(&step.id) {
                if seeded.is_success() {
                    tracing::debug!(
                        task_id = %ctx.task_id,
                        step_id = %step.id,
                        "skipping step completed in an earlier run"
                    );
                    step_results.push(StepExecutionResult::new(
                        step.id.clone(),
                        step.tool_name.clone(),
                        seeded.clone(),
                        seeded.metadata.execution_time_ms,
                    ));
                    continue;
                }
            }

            if ctx.is_cancelled() {
                tracing::info!(
                    task_id = %ctx.task_id,
                    step_id = %step.id,
                    "execution cancelled before step"
                );
                halted = Some(HaltReason::Cancelled);
                break;
            }

            let step_started = Instant::now();
            let result = match unmet_dependency(step, &results) {
                Some(message) => ToolResult::failure(
                    step.tool_name.clone(),
                    ToolError::non_retryable(ToolErrorCode::ExecutionError, message),
                )
                .with_step_id(step.id.clone()),
                None => {
                    let mut step_ctx = ctx.for_step(&step.id, self.step_retries(step, ctx));
                    step_ctx.previous_step_results = results.clone();
                    self.execute_tool(&step.tool_name, step.params.clone(), &step_ctx)
                        .await
                }
            };

            let succeeded = result.is_success();
            if succeeded {
                tracing::info!(
                    task_id = %ctx.task_id,
                    step_id = %step.id,
                    tool = %step.tool_name,
                    attempts = result.metadata.attempts,
                    "step completed"
                );
            } else {
                tracing::error!(
                    task_id = %ctx.task_id,
                    step_id = %step.id,
                    tool = %step.tool_name,
                    optional = step.optional,
                    error = %truncate_for_log(result.error_message().unwrap_or_default(), MAX_LOG_TEXT_CHARS),
                    "step failed"
                );
            }

            results.insert(step.id.clone(), result.clone());
            let record = StepExecutionResult::new(
                step.id.clone(),
                step.tool_name.clone(),
                result,
                elapsed_ms(step_started),
            );
            step_results.push(record.clone());

            report_progress(
                ctx,
                StepProgressEvent {
                    task_id: ctx.task_id.clone(),
                    step_index: index,
                    total_steps,
                    result: record,
                    results_so_far: step_results.clone(),
                },
            )
            .await;

            if !succeeded && !step.optional {
                halted = Some(HaltReason::StepFailed {
                    step_id: step.id.clone(),
                });
                break;
            }
        }

        let completed_steps = step_results.iter().filter(|r| r.success).count();
        PlanExecutionResult {
            success: completed_steps == total_steps,
            completed_steps,
            total_steps,
            step_results,
            execution_time_ms: elapsed_ms(started),
            timestamp: Utc::now(),
            halted,
        }
    }

    /// Retry budget for one step
    fn step_retries(&self, step: &Step, ctx: &ExecutionContext) -> u32 {
        if !step.retryable {
            return 0;
        }
        let run_budget = ctx.max_retries.unwrap_or(self.default_max_retries);
        step.max_retries.min(run_budget)
    }
}

fn unmet_dependency(step: &Step, results: &HashMap<StepId, ToolResult>) -> Option<String> {
    step.depends_on.iter().find_map(|dep| match results.get(dep) {
        None => Some(format!(
            "dependency '{}' of step '{}' has no result",
            dep, step.id
        )),
        Some(result) if !result.is_success() => Some(format!(
            "dependency '{}' of step '{}' did not succeed",
            dep, step.id
        )),
        Some(_) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{CancellationToken, HandlerError, ToolHandler};
    use crate::types::IntentType;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StaticTool {
        name: &'static str,
        outcome: Result<Value, ToolError>,
        calls: Arc<AtomicUsize>,
    }

    impl StaticTool {
        fn ok(name: &'static str) -> Self {
            Self {
                name,
                outcome: Ok(json!({ "tool": name })),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(name: &'static str, error: ToolError) -> Self {
            Self {
                name,
                outcome: Err(error),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl ToolHandler for StaticTool {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ExecutionContext,
        ) -> Result<ToolResult, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.outcome {
                Ok(data) => ToolResult::success(self.name, data.clone()),
                Err(err) => ToolResult::failure(self.name, err.clone()),
            })
        }
    }

    struct FlakyTool {
        failures_before_success: usize,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ExecutionContext,
        ) -> Result<ToolResult, HandlerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Ok(ToolResult::failure(
                    "flaky",
                    ToolError::new(ToolErrorCode::NetworkError, "connection reset"),
                ));
            }
            Ok(ToolResult::success("flaky", json!({ "call": call })))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl ToolHandler for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ExecutionContext,
        ) -> Result<ToolResult, HandlerError> {
            sleep(Duration::from_millis(200)).await;
            Ok(ToolResult::success("slow", Value::Null))
        }
    }

    struct BrokenTool {
        panic: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ExecutionContext,
        ) -> Result<ToolResult, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.panic {
                panic!("selector blew up");
            }
            Err("socket closed unexpectedly".into())
        }
    }

    struct UpstreamTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ToolHandler for UpstreamTool {
        fn name(&self) -> &str {
            "upstream"
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ExecutionContext,
        ) -> Result<ToolResult, HandlerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let upstream: Result<Value, String> = Err("HTTP 429 Too Many Requests".to_string());
            Ok(match upstream {
                Ok(data) => ToolResult::success("upstream", data),
                Err(message) => ToolResult::from_handler_error("upstream", message),
            })
        }
    }

    struct GuardedTool;

    #[async_trait]
    impl ToolHandler for GuardedTool {
        fn name(&self) -> &str {
            "guarded"
        }

        fn validate(&self, params: &Value) -> Result<(), String> {
            if params.get("url").is_some() {
                Ok(())
            } else {
                Err("url is required".to_string())
            }
        }

        fn supports_context(&self, ctx: &ExecutionContext) -> bool {
            ctx.user_profile.is_some()
        }

        async fn execute(
            &self,
            _params: Value,
            _ctx: &ExecutionContext,
        ) -> Result<ToolResult, HandlerError> {
            Ok(ToolResult::success("guarded", Value::Null))
        }
    }

    fn executor(handlers: Vec<Arc<dyn ToolHandler>>) -> ToolExecutor {
        let mut registry = HandlerRegistry::new();
        for handler in handlers {
            registry.register(handler);
        }
        ToolExecutor::new(Arc::new(registry)).with_retry_policy(Duration::ZERO, Duration::ZERO)
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("user-1", "task-1")
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let base = Duration::from_millis(1_000);
        let max = Duration::from_millis(10_000);
        assert_eq!(retry_delay(0, base, max), Duration::from_millis(1_000));
        assert_eq!(retry_delay(1, base, max), Duration::from_millis(2_000));
        assert_eq!(retry_delay(3, base, max), Duration::from_millis(8_000));
        assert_eq!(retry_delay(4, base, max), Duration::from_millis(10_000));
        assert_eq!(retry_delay(40, base, max), Duration::from_millis(10_000));
        assert_eq!(retry_delay(2, Duration::ZERO, max), Duration::ZERO);
    }

    #[test]
    fn test_unregistered_tool_fails_without_attempts() {
        tokio_test::block_on(async {
            let exec = executor(vec![]);
            let result = exec.execute_tool("missing", json!({}), &ctx()).await;
            assert!(!result.is_success());
            let err = result.error.expect("error");
            assert_eq!(err.code, ToolErrorCode::ExecutionError);
            assert!(!err.retryable);
            assert_eq!(result.metadata.attempts, 0);
        });
    }

    #[test]
    fn test_retryable_failure_stops_at_max_retries_plus_one() {
        tokio_test::block_on(async {
            let tool = StaticTool::failing(
                "rate_limited",
                ToolError::new(ToolErrorCode::RateLimit, "429"),
            );
            let calls = tool.calls.clone();
            let exec = executor(vec![Arc::new(tool)]);
            let result = exec
                .execute_tool("rate_limited", json!({}), &ctx().with_max_retries(2))
                .await;
            assert!(!result.is_success());
            assert_eq!(calls.load(Ordering::SeqCst), 3);
            assert_eq!(result.metadata.attempts, 3);
        });
    }

    #[test]
    fn test_backoff_waits_between_attempts() {
        tokio_test::block_on(async {
            tokio::time::pause();
            let tool = StaticTool::failing(
                "unstable",
                ToolError::new(ToolErrorCode::NetworkError, "connection reset"),
            );
            let calls = tool.calls.clone();
            let mut registry = HandlerRegistry::new();
            registry.register(Arc::new(tool));
            let exec = ToolExecutor::new(Arc::new(registry));

            let started = tokio::time::Instant::now();
            let result = exec
                .execute_tool("unstable", json!({}), &ctx().with_max_retries(5))
                .await;
            let waited = started.elapsed();

            assert!(!result.is_success());
            assert_eq!(calls.load(Ordering::SeqCst), 6);
            // 1s + 2s + 4s + 8s + 10s (capped)
            assert!(waited >= Duration::from_millis(25_000), "waited {waited:?}");
            assert!(waited < Duration::from_millis(26_000), "waited {waited:?}");
        });
    }

    #[test]
    fn test_handler_flag_makes_error_retryable() {
        tokio_test::block_on(async {
            let tool = StaticTool::failing(
                "flagged",
                ToolError::new(ToolErrorCode::BrowserError, "element detached").with_retryable(true),
            );
            let calls = tool.calls.clone();
            let exec = executor(vec![Arc::new(tool)]);
            exec.execute_tool("flagged", json!({}), &ctx().with_max_retries(1))
                .await;
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        });
    }

    #[test]
    fn test_non_retryable_failure_is_not_retried() {
        tokio_test::block_on(async {
            let tool = StaticTool::failing(
                "not_found",
                ToolError::new(ToolErrorCode::ResourceNotFound, "no such offer"),
            );
            let calls = tool.calls.clone();
            let exec = executor(vec![Arc::new(tool)]);
            let result = exec.execute_tool("not_found", json!({}), &ctx()).await;
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(result.error_message(), Some("no such offer"));
        });
    }

    #[test]
    fn test_recovers_on_second_attempt() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let exec = executor(vec![Arc::new(FlakyTool {
                failures_before_success: 1,
                calls: calls.clone(),
            })]);
            let result = exec.execute_tool("flaky", json!({}), &ctx()).await;
            assert!(result.is_success());
            assert_eq!(result.metadata.attempts, 2);
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        });
    }

    #[test]
    fn test_timeout_is_reported_as_timeout_error() {
        tokio_test::block_on(async {
            let exec = executor(vec![Arc::new(SlowTool)]);
            let ctx = ctx()
                .with_timeout(Duration::from_millis(10))
                .with_max_retries(0);
            let result = exec.execute_tool("slow", json!({}), &ctx).await;
            let err = result.error.expect("timeout error");
            assert_eq!(err.code, ToolErrorCode::Timeout);
            assert!(err.is_retryable());
        });
    }

    #[test]
    fn test_classified_handler_message_is_retried() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let exec = executor(vec![Arc::new(UpstreamTool {
                calls: calls.clone(),
            })]);
            let result = exec
                .execute_tool("upstream", json!({}), &ctx().with_max_retries(1))
                .await;
            assert_eq!(
                result.error.map(|e| e.code),
                Some(ToolErrorCode::RateLimit)
            );
            assert_eq!(calls.load(Ordering::SeqCst), 2);
        });
    }

    #[test]
    fn test_handler_error_becomes_unknown_error_without_retry() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let exec = executor(vec![Arc::new(BrokenTool {
                panic: false,
                calls: calls.clone(),
            })]);
            let result = exec.execute_tool("broken", json!({}), &ctx()).await;
            let err = result.error.expect("error");
            assert_eq!(err.code, ToolErrorCode::UnknownError);
            assert!(!err.retryable);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_handler_panic_is_contained() {
        tokio_test::block_on(async {
            let exec = executor(vec![Arc::new(BrokenTool {
                panic: true,
                calls: Arc::new(AtomicUsize::new(0)),
            })]);
            let result = exec.execute_tool("broken", json!({}), &ctx()).await;
            let err = result.error.expect("error");
            assert_eq!(err.code, ToolErrorCode::UnknownError);
            assert!(err.message.contains("selector blew up"));
        });
    }

    #[test]
    fn test_context_and_param_checks_run_before_execution() {
        tokio_test::block_on(async {
            let exec = executor(vec![Arc::new(GuardedTool)]);

            let result = exec
                .execute_tool("guarded", json!({"url": "https://example.com"}), &ctx())
                .await;
            assert_eq!(
                result.error.map(|e| e.code),
                Some(ToolErrorCode::AuthRequired)
            );

            let authed = ctx().with_user_profile(Some(json!({"name": "Ada"})));
            let result = exec.execute_tool("guarded", json!({}), &authed).await;
            assert_eq!(
                result.error.map(|e| e.code),
                Some(ToolErrorCode::InvalidParams)
            );

            let result = exec
                .execute_tool("guarded", json!({"url": "https://example.com"}), &authed)
                .await;
            assert!(result.is_success());
        });
    }

    #[test]
    fn test_dry_run_skips_handler() {
        tokio_test::block_on(async {
            let tool = StaticTool::ok("search");
            let calls = tool.calls.clone();
            let exec = executor(vec![Arc::new(tool)]);
            let result = exec
                .execute_tool("search", json!({"q": 1}), &ctx().with_dry_run(true))
                .await;
            assert!(result.is_success());
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn test_required_failure_short_circuits_plan() {
        tokio_test::block_on(async {
            let b = StaticTool::ok("b_tool");
            let b_calls = b.calls.clone();
            let exec = executor(vec![
                Arc::new(StaticTool::failing(
                    "a_tool",
                    ToolError::non_retryable(ToolErrorCode::ValidationError, "bad input"),
                )),
                Arc::new(b),
            ]);
            let plan = Plan::new(
                IntentType::SearchFlights,
                vec![
                    Step::new("A", "a_tool"),
                    Step::new("B", "b_tool").with_depends_on(["A"]),
                ],
            );
            let result = exec.execute_plan(&plan, &ctx()).await;
            assert!(!result.success);
            assert_eq!(result.completed_steps, 0);
            assert_eq!(result.step_results.len(), 1);
            assert_eq!(result.step_results[0].step_id, "A");
            assert_eq!(b_calls.load(Ordering::SeqCst), 0);
            assert_eq!(
                result.halted,
                Some(HaltReason::StepFailed {
                    step_id: StepId::from("A")
                })
            );
            assert_eq!(result.failure_message().as_deref(), Some("bad input"));
        });
    }

    #[test]
    fn test_optional_failure_still_blocks_dependents() {
        tokio_test::block_on(async {
            let b = StaticTool::ok("b_tool");
            let b_calls = b.calls.clone();
            let exec = executor(vec![
                Arc::new(StaticTool::failing(
                    "a_tool",
                    ToolError::non_retryable(ToolErrorCode::ExecutionError, "nope"),
                )),
                Arc::new(b),
            ]);
            let plan = Plan::new(
                IntentType::SearchFlights,
                vec![
                    Step::new("A", "a_tool").optional(),
                    Step::new("B", "b_tool").with_depends_on(["A"]),
                    Step::new("C", "b_tool"),
                ],
            );
            let result = exec.execute_plan(&plan, &ctx()).await;
            assert!(!result.success);
            assert_eq!(result.completed_steps, 0);
            assert_eq!(result.step_results.len(), 2);
            let b_result = &result.step_results[1];
            assert_eq!(b_result.step_id, "B");
            assert_eq!(
                b_result.result.error.as_ref().map(|e| e.code),
                Some(ToolErrorCode::ExecutionError)
            );
            assert_eq!(b_calls.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn test_optional_failure_without_dependents_continues() {
        tokio_test::block_on(async {
            let exec = executor(vec![
                Arc::new(StaticTool::failing(
                    "a_tool",
                    ToolError::non_retryable(ToolErrorCode::ExecutionError, "nope"),
                )),
                Arc::new(StaticTool::ok("b_tool")),
            ]);
            let plan = Plan::new(
                IntentType::SearchFlights,
                vec![Step::new("A", "a_tool").optional(), Step::new("B", "b_tool")],
            );
            let result = exec.execute_plan(&plan, &ctx()).await;
            assert!(!result.success);
            assert_eq!(result.completed_steps, 1);
            assert_eq!(result.step_results.len(), 2);
            assert!(result.halted.is_none());
        });
    }

    #[test]
    fn test_flaky_step_counts_as_completed() {
        tokio_test::block_on(async {
            let exec = executor(vec![
                Arc::new(FlakyTool {
                    failures_before_success: 1,
                    calls: Arc::new(AtomicUsize::new(0)),
                }),
                Arc::new(StaticTool::ok("b_tool")),
            ]);
            let plan = Plan::new(
                IntentType::SearchFlights,
                vec![
                    Step::new("A", "flaky"),
                    Step::new("B", "b_tool").with_depends_on(["A"]),
                ],
            );
            let result = exec.execute_plan(&plan, &ctx()).await;
            assert!(result.success);
            assert_eq!(result.completed_steps, 2);
            assert!(result.step_results[0].success);
            assert!(result.step_results[0].result.success);
        });
    }

    #[test]
    fn test_non_retryable_step_gets_single_attempt() {
        tokio_test::block_on(async {
            let calls = Arc::new(AtomicUsize::new(0));
            let exec = executor(vec![Arc::new(FlakyTool {
                failures_before_success: 1,
                calls: calls.clone(),
            })]);
            let plan = Plan::new(
                IntentType::SearchFlights,
                vec![Step::new("A", "flaky").non_retryable()],
            );
            let result = exec.execute_plan(&plan, &ctx()).await;
            assert!(!result.success);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_empty_plan_succeeds_trivially() {
        tokio_test::block_on(async {
            let exec = executor(vec![]);
            let plan = Plan::empty(IntentType::Unknown);
            let result = exec.execute_plan(&plan, &ctx()).await;
            assert!(result.success);
            assert_eq!(result.total_steps, 0);
            assert!(result.halted.is_none());
        });
    }

    #[test]
    fn test_cancelled_run_schedules_nothing() {
        tokio_test::block_on(async {
            let tool = StaticTool::ok("a_tool");
            let calls = tool.calls.clone();
            let exec = executor(vec![Arc::new(tool)]);
            let token = CancellationToken::new();
            token.cancel();
            let plan = Plan::new(IntentType::SearchFlights, vec![Step::new("A", "a_tool")]);
            let result = exec
                .execute_plan(&plan, &ctx().with_cancellation_token(token))
                .await;
            assert!(!result.success);
            assert_eq!(result.halted, Some(HaltReason::Cancelled));
            assert!(result.step_results.is_empty());
            assert_eq!(calls.load(Ordering::SeqCst), 0);
        });
    }

    #[test]
    fn test_seeded_results_are_skipped_and_counted() {
        tokio_test::block_on(async {
            let a = StaticTool::ok("a_tool");
            let a_calls = a.calls.clone();
            let exec = executor(vec![Arc::new(a), Arc::new(StaticTool::ok("b_tool"))]);
            let plan = Plan::new(
                IntentType::SearchFlights,
                vec![
                    Step::new("A", "a_tool"),
                    Step::new("B", "b_tool").with_depends_on(["A"]),
                ],
            );
            let mut seeded = HashMap::new();
            seeded.insert(
                StepId::from("A"),
                ToolResult::success("a_tool", json!({"seeded": true})),
            );
            let result = exec
                .execute_plan(&plan, &ctx().with_previous_results(seeded))
                .await;
            assert!(result.success);
            assert_eq!(result.completed_steps, 2);
            assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        });
    }

    struct RecordingReporter {
        events: Mutex<Vec<(usize, usize)>>,
    }

    #[async_trait]
    impl StepProgressReporter for RecordingReporter {
        async fn step_completed(&self, event: StepProgressEvent) -> Result<(), String> {
            let mut events = self.events.lock().map_err(|e| e.to_string())?;
            events.push((event.step_index, event.results_so_far.len()));
            Ok(())
        }
    }

    #[test]
    fn test_progress_reported_per_step() {
        tokio_test::block_on(async {
            let exec = executor(vec![Arc::new(StaticTool::ok("a_tool"))]);
            let reporter = Arc::new(RecordingReporter {
                events: Mutex::new(Vec::new()),
            });
            let plan = Plan::new(
                IntentType::SearchFlights,
                vec![Step::new("A", "a_tool"), Step::new("B", "a_tool")],
            );
            let ctx = ctx().with_progress_reporter(reporter.clone());
            let result = exec.execute_plan(&plan, &ctx).await;
            assert!(result.success);
            let events = reporter.events.lock().expect("lock").clone();
            assert_eq!(events, vec![(0, 1), (1, 2)]);
        });
    }
}
