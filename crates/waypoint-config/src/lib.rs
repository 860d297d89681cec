//! # Waypoint Config
//!
//! Single-file configuration for Waypoint.
//! One `waypoint.yaml` configures the worker pool, executor retry policy,
//! planner completion options, stores, events and observability.

mod loader;

pub use loader::{load_config, parse_config, validate_config, ConfigError};

use serde::Deserialize;

/// Top-level configuration schema for Waypoint.
#[derive(Debug, Clone, Deserialize)]
pub struct WaypointConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for WaypointConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            worker: WorkerConfig::default(),
            executor: ExecutorConfig::default(),
            planner: PlannerConfig::default(),
            stores: StoresConfig::default(),
            events: EventsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

fn default_app_name() -> String {
    "waypoint".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

/// Queue consumer settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Number of tasks executed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    /// Jobs buffered before `enqueue` waits.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            queue_name: default_queue_name(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_queue_name() -> String {
    "task".to_string()
}

fn default_queue_capacity() -> usize {
    256
}

/// Tool execution and retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

/// Completion options used for plan generation.
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_planner_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_planner_max_tokens(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}

fn default_planner_max_tokens() -> u32 {
    2048
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoresConfig {
    #[serde(default)]
    pub task: TaskStoreSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStoreSpec {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Capacity limit for the in-memory backend.
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

impl Default for TaskStoreSpec {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            max_tasks: default_max_tasks(),
        }
    }
}

fn default_backend() -> String {
    "in_memory".to_string()
}

fn default_max_tasks() -> usize {
    5_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity.
    #[serde(default = "default_events_capacity")]
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: default_events_capacity(),
        }
    }
}

fn default_events_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
