//! Tool contract module
//!
//! This module defines the uniform interface every tool implements:
//! - ToolHandler: the pluggable implementation behind a tool name
//! - ExecutionContext: per-run identity, options and prior step results
//! - ToolResult / ToolError: outcome with a closed error taxonomy
//! - HandlerRegistry: tool name -> handler lookup
//! - ToolCatalog: static tool definitions used for validation and planning

mod catalog;
mod context;
mod registry;
mod result;

use async_trait::async_trait;
use serde_json::Value;

pub use catalog::{
    is_booking_tool, is_evidence_tool, is_verification_tool, ToolCatalog, ToolCategory,
    ToolDefinition, BOOKING_TOOLS, EVIDENCE_TOOLS, VERIFICATION_TOOLS,
};
pub use context::ExecutionContext;
pub use registry::HandlerRegistry;
pub use result::{
    ErrorSeverity, StepExecutionResult, ToolError, ToolErrorCode, ToolResult, ToolResultMetadata,
};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;

/// Error escaping a handler outside its own error-result path
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// ToolHandler trait - the pluggable implementation behind a tool name
///
/// Handlers report expected failures as `Ok(ToolResult { success: false, .. })`
/// with a structured code. An `Err` is treated as unexpected and converted by
/// the executor into a non-retryable UNKNOWN_ERROR result.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Get the tool name (must be unique)
    fn name(&self) -> &str;

    /// Reject malformed params before any attempt is made
    fn validate(&self, _params: &Value) -> Result<(), String> {
        Ok(())
    }

    /// Auth gating; returning false fails the call with AUTH_REQUIRED
    fn supports_context(&self, _ctx: &ExecutionContext) -> bool {
        true
    }

    /// Execute the tool
    async fn execute(&self, params: Value, ctx: &ExecutionContext)
        -> Result<ToolResult, HandlerError>;
}
