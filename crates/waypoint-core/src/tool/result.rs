//! ToolResult and error taxonomy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::StepId;

/// Closed set of tool failure codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolErrorCode {
    ValidationError,
    ExecutionError,
    Timeout,
    NetworkError,
    AuthRequired,
    RateLimit,
    ResourceNotFound,
    InvalidParams,
    ExternalApiError,
    BrowserError,
    UnknownError,
}

impl ToolErrorCode {
    /// Codes that are retried even when the error instance does not say so
    pub fn is_retryable_by_default(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::NetworkError | Self::RateLimit | Self::ExternalApiError
        )
    }

    /// Advisory severity for observability; never consulted for control flow
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::ValidationError | Self::InvalidParams | Self::ResourceNotFound => {
                ErrorSeverity::Low
            }
            Self::Timeout | Self::RateLimit | Self::NetworkError => ErrorSeverity::Medium,
            Self::ExternalApiError | Self::BrowserError | Self::AuthRequired => {
                ErrorSeverity::High
            }
            Self::ExecutionError | Self::UnknownError => ErrorSeverity::Critical,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ExecutionError => "EXECUTION_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::NetworkError => "NETWORK_ERROR",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::RateLimit => "RATE_LIMIT",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::ExternalApiError => "EXTERNAL_API_ERROR",
            Self::BrowserError => "BROWSER_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ToolErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Structured tool failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    pub code: ToolErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl ToolError {
    /// Create an error whose retryability follows the code's default
    pub fn new(code: ToolErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retryable: code.is_retryable_by_default(),
            timestamp: Utc::now(),
        }
    }

    pub fn non_retryable(code: ToolErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message).with_retryable(false)
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Whether the executor may retry this failure
    pub fn is_retryable(&self) -> bool {
        self.retryable || self.code.is_retryable_by_default()
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.code.severity()
    }

    /// Last-resort classification from a free-form message.
    ///
    /// Handlers should return a structured code; this exists for failures that
    /// only surface as text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(classify_message(&message), message)
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

fn classify_message(message: &str) -> ToolErrorCode {
    let lower = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["timeout", "timed out"]) {
        ToolErrorCode::Timeout
    } else if has(&["rate limit", "too many requests", "429"]) {
        ToolErrorCode::RateLimit
    } else if has(&["unauthorized", "forbidden", "auth", "401", "403"]) {
        ToolErrorCode::AuthRequired
    } else if has(&["not found", "404"]) {
        ToolErrorCode::ResourceNotFound
    } else if has(&["network", "connection", "econnrefused", "econnreset", "dns"]) {
        ToolErrorCode::NetworkError
    } else if has(&["browser", "selector", "navigation", "page crashed"]) {
        ToolErrorCode::BrowserError
    } else if has(&["invalid param", "validation"]) {
        ToolErrorCode::ValidationError
    } else {
        ToolErrorCode::ExecutionError
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultMetadata {
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    /// Number of attempts that produced this result
    #[serde(default)]
    pub attempts: u32,
}

/// Outcome of one tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<ToolError>,
    pub metadata: ToolResultMetadata,
}

impl ToolResult {
    /// Convenience: create a success result
    pub fn success(tool_name: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: ToolResultMetadata::new(tool_name),
        }
    }

    /// Convenience: create a failure result
    pub fn failure(tool_name: impl Into<String>, error: ToolError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            metadata: ToolResultMetadata::new(tool_name),
        }
    }

    /// Convert an arbitrary handler error, classifying it from its message
    pub fn from_handler_error(tool_name: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::failure(tool_name, ToolError::from_message(error.to_string()))
    }

    /// A result counts as succeeded when flagged so or when it carries no error
    pub fn is_success(&self) -> bool {
        self.success || self.error.is_none()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn with_step_id(mut self, step_id: impl Into<StepId>) -> Self {
        self.metadata.step_id = Some(step_id.into());
        self
    }

    pub fn with_execution_time_ms(mut self, execution_time_ms: u64) -> Self {
        self.metadata.execution_time_ms = execution_time_ms;
        self
    }
}

impl ToolResultMetadata {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            execution_time_ms: 0,
            timestamp: Utc::now(),
            tool_name: tool_name.into(),
            step_id: None,
            attempts: 1,
        }
    }
}

/// Record of one attempted plan step; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionResult {
    pub step_id: StepId,
    pub tool_name: String,
    pub success: bool,
    pub result: ToolResult,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl StepExecutionResult {
    pub fn new(
        step_id: impl Into<StepId>,
        tool_name: impl Into<String>,
        result: ToolResult,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            tool_name: tool_name.into(),
            success: result.is_success(),
            result,
            execution_time_ms,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_retryability_by_code() {
        assert!(ToolErrorCode::Timeout.is_retryable_by_default());
        assert!(ToolErrorCode::NetworkError.is_retryable_by_default());
        assert!(ToolErrorCode::RateLimit.is_retryable_by_default());
        assert!(ToolErrorCode::ExternalApiError.is_retryable_by_default());
        assert!(!ToolErrorCode::AuthRequired.is_retryable_by_default());
        assert!(!ToolErrorCode::InvalidParams.is_retryable_by_default());
    }

    #[test]
    fn test_retryable_code_wins_over_instance_flag() {
        let err = ToolError::new(ToolErrorCode::RateLimit, "slow down").with_retryable(false);
        assert!(err.is_retryable());

        let err = ToolError::new(ToolErrorCode::BrowserError, "flaky page").with_retryable(true);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_message_classifier_fallback() {
        assert_eq!(
            ToolError::from_message("request timed out after 30s").code,
            ToolErrorCode::Timeout
        );
        assert_eq!(
            ToolError::from_message("HTTP 429 Too Many Requests").code,
            ToolErrorCode::RateLimit
        );
        assert_eq!(
            ToolError::from_message("401 Unauthorized").code,
            ToolErrorCode::AuthRequired
        );
        assert_eq!(
            ToolError::from_message("connection reset by peer").code,
            ToolErrorCode::NetworkError
        );
        assert_eq!(
            ToolError::from_message("selector #submit missing").code,
            ToolErrorCode::BrowserError
        );
        assert_eq!(
            ToolError::from_message("something odd").code,
            ToolErrorCode::ExecutionError
        );
    }

    #[test]
    fn test_result_without_error_counts_as_success() {
        let mut result = ToolResult::success("noop", json!(null));
        result.success = false;
        assert!(result.is_success());

        let failed = ToolResult::failure("noop", ToolError::from_message("boom"));
        assert!(!failed.is_success());
        assert_eq!(failed.error_message(), Some("boom"));
    }

    #[test]
    fn test_error_code_serializes_screaming_case() {
        let value = serde_json::to_value(ToolErrorCode::ExternalApiError).unwrap();
        assert_eq!(value, json!("EXTERNAL_API_ERROR"));
    }
}
