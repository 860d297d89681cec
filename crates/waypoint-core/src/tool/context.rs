//! ExecutionContext type definition

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::executor::StepProgressReporter;
use crate::types::{StepId, TaskId};

use super::ToolResult;

/// Per-plan-run execution context
///
/// Provides access to:
/// - User and task identification
/// - Run options (dry run, timeout, retry budget)
/// - Results of steps already executed in this run
/// - CancellationToken checked between steps
///
/// `previous_step_results` is owned by the single flow driving the plan.
#[derive(Clone)]
pub struct ExecutionContext {
    pub user_id: String,
    pub task_id: TaskId,
    /// Step currently being executed
    pub step_id: Option<StepId>,
    pub user_profile: Option<Value>,
    pub dry_run: bool,
    /// Per-attempt timeout; the executor default applies when unset
    pub timeout: Option<Duration>,
    /// Retry budget; the executor default applies when unset
    pub max_retries: Option<u32>,
    pub previous_step_results: HashMap<StepId, ToolResult>,
    /// Stops scheduling of further steps; in-flight calls are not interrupted
    pub cancellation_token: CancellationToken,
    /// Optional step progress reporter.
    pub progress_reporter: Option<Arc<dyn StepProgressReporter>>,
}

impl ExecutionContext {
    /// Create a new execution context
    pub fn new(user_id: impl Into<String>, task_id: impl Into<TaskId>) -> Self {
        Self {
            user_id: user_id.into(),
            task_id: task_id.into(),
            step_id: None,
            user_profile: None,
            dry_run: false,
            timeout: None,
            max_retries: None,
            previous_step_results: HashMap::new(),
            cancellation_token: CancellationToken::new(),
            progress_reporter: None,
        }
    }

    pub fn with_user_profile(mut self, profile: Option<Value>) -> Self {
        self.user_profile = profile;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Attach a step progress reporter.
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn StepProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Seed results from an earlier run (resume)
    pub fn with_previous_results(mut self, results: HashMap<StepId, ToolResult>) -> Self {
        self.previous_step_results = results;
        self
    }

    /// Context for one step of the run
    pub fn for_step(&self, step_id: &StepId, max_retries: u32) -> Self {
        let mut ctx = self.clone();
        ctx.step_id = Some(step_id.clone());
        ctx.max_retries = Some(max_retries);
        ctx
    }

    pub fn previous_result(&self, step_id: &str) -> Option<&ToolResult> {
        self.previous_step_results.get(&StepId::from(step_id))
    }

    /// Check if further scheduling has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("user_id", &self.user_id)
            .field("task_id", &self.task_id)
            .field("step_id", &self.step_id)
            .field("dry_run", &self.dry_run)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}
