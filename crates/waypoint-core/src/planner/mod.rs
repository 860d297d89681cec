//! Planner module
//!
//! Turns an intent classification into a validated plan:
//! - CompletionClient: consumed completion capability (structured or text)
//! - LlmPlanGenerator: prompt building and plan extraction
//! - PlanningService: validation with deterministic template fallback

pub mod templates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::executor::truncate_for_log;
use crate::tool::ToolCatalog;
use crate::types::{IntentClassification, Plan, Step};
use crate::validator::{PlanValidationResult, PlanValidator};

const MAX_PROMPT_LOG_CHARS: usize = 4_000;
const MAX_COMPLETION_LOG_CHARS: usize = 8_000;

/// Planning errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("completion failed: {0}")]
    Completion(String),
    #[error("completion timed out after {0}ms")]
    Timeout(u64),
    #[error("could not parse plan: {0}")]
    Parse(String),
    #[error("plan generation failed: {0}")]
    Generation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
            timeout_ms: 30_000,
        }
    }
}

/// Completion request payload
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// Structured-call schema; when present the client may answer with a
    /// structured payload
    pub schema: Option<Value>,
    pub options: CompletionOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CompletionResponse {
    Structured(Value),
    Text(String),
}

/// Completion client trait
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, PlanError>;
}

#[async_trait]
impl CompletionClient for Arc<dyn CompletionClient> {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, PlanError> {
        (**self).complete(request).await
    }
}

/// Client answering every request with the same response
pub struct StaticCompletionClient {
    pub response: CompletionResponse,
}

#[async_trait]
impl CompletionClient for StaticCompletionClient {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, PlanError> {
        Ok(self.response.clone())
    }
}

/// Produces a candidate plan for an intent
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    async fn generate(&self, intent: &IntentClassification) -> Result<Plan, PlanError>;
}

/// Plan generator backed by a completion client
pub struct LlmPlanGenerator<C: CompletionClient> {
    pub client: C,
    pub catalog: Arc<ToolCatalog>,
    pub options: CompletionOptions,
}

impl<C: CompletionClient> LlmPlanGenerator<C> {
    pub fn new(client: C, catalog: Arc<ToolCatalog>) -> Self {
        Self {
            client,
            catalog,
            options: CompletionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    fn build_messages(&self, intent: &IntentClassification) -> Vec<ChatMessage> {
        let mut system = String::from(
            "You are a task planner. Produce an ordered list of tool steps that achieves \
             the user's goal. Use only tools listed below. Every dependency must refer \
             to an earlier step. Return ONLY valid JSON.\n\nTools:\n",
        );
        for definition in self.catalog.definitions() {
            system.push_str(&format!("- {}", definition.name));
            if !definition.description.is_empty() {
                system.push_str(&format!(": {}", definition.description));
            }
            if definition.requires_auth {
                system.push_str(" (requires auth)");
            }
            if !definition.parameter_schema.is_null() {
                system.push_str(&format!("\n  params schema: {}", definition.parameter_schema));
            }
            system.push('\n');
        }

        let params = serde_json::to_string(&intent.params).unwrap_or_else(|_| "{}".to_string());
        let mut user = format!(
            "Intent: {}\nParameters: {}\n\n",
            intent.intent_type, params
        );
        user.push_str("Return a JSON object with shape:\n");
        user.push_str(
            r#"{"steps":[{"id":"s1","toolName":"tool_name","params":{},"dependsOn":[],"optional":false}]}"#,
        );
        user.push('\n');

        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

/// JSON schema of the structured plan payload
fn plan_response_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "toolName": {"type": "string"},
                        "params": {"type": "object"},
                        "dependsOn": {"type": "array", "items": {"type": "string"}},
                        "optional": {"type": "boolean"}
                    },
                    "required": ["id", "toolName"]
                }
            }
        },
        "required": ["steps"]
    })
}

#[async_trait]
impl<C: CompletionClient> PlanGenerator for LlmPlanGenerator<C> {
    async fn generate(&self, intent: &IntentClassification) -> Result<Plan, PlanError> {
        let messages = self.build_messages(intent);
        info!(
            intent = %intent.intent_type,
            tool_count = self.catalog.len(),
            temperature = self.options.temperature,
            "plan completion request prepared"
        );
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Some(system) = messages.first() {
                debug!(
                    system_prompt = %truncate_for_log(&system.content, MAX_PROMPT_LOG_CHARS),
                    "planner prompt"
                );
            }
        }

        let request = CompletionRequest {
            messages,
            schema: Some(plan_response_schema()),
            options: self.options.clone(),
        };
        let timeout_ms = self.options.timeout_ms;
        let response = tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.client.complete(request),
        )
        .await
        .map_err(|_| PlanError::Timeout(timeout_ms))??;

        let payload = match response {
            CompletionResponse::Structured(value) => value,
            CompletionResponse::Text(text) => {
                if tracing::enabled!(tracing::Level::DEBUG) {
                    debug!(
                        completion = %truncate_for_log(&text, MAX_COMPLETION_LOG_CHARS),
                        "planner raw completion"
                    );
                }
                extract_plan_json(&text).ok_or_else(|| {
                    PlanError::Parse("completion did not contain a JSON object".to_string())
                })?
            }
        };

        let plan = plan_from_payload(intent, payload)?;
        info!(step_count = plan.steps.len(), "planner parsed plan");
        Ok(plan)
    }
}

fn plan_from_payload(intent: &IntentClassification, payload: Value) -> Result<Plan, PlanError> {
    let steps = match payload {
        Value::Object(mut map) => map
            .remove("steps")
            .ok_or_else(|| PlanError::Parse("missing 'steps' field".to_string()))?,
        Value::Array(steps) => Value::Array(steps),
        other => {
            return Err(PlanError::Parse(format!(
                "expected a JSON object, got {}",
                other
            )))
        }
    };
    let steps: Vec<Step> =
        serde_json::from_value(steps).map_err(|e| PlanError::Parse(e.to_string()))?;
    Ok(Plan::new(intent.intent_type, steps))
}

/// Extract a JSON value from free text.
///
/// Tries the whole text, then the body of a markdown code fence, then the
/// outermost `{ ... }` span.
pub fn extract_plan_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if let Some(body) = strip_code_fence(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(body.trim()) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    // skip the language tag line, e.g. ```json
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Generated,
    Template,
}

/// Result of planning one intent; always carries a plan
#[derive(Debug, Clone)]
pub struct PlanningOutcome {
    pub plan: Plan,
    pub source: PlanSource,
    /// Validation of the generated candidate, or of the template on fallback
    pub validation: PlanValidationResult,
    pub fallback_reason: Option<String>,
}

/// Generation, validation and fallback in one place
pub struct PlanningService {
    generator: Arc<dyn PlanGenerator>,
    validator: PlanValidator,
}

impl PlanningService {
    pub fn new(generator: Arc<dyn PlanGenerator>, validator: PlanValidator) -> Self {
        Self {
            generator,
            validator,
        }
    }

    pub fn validator(&self) -> &PlanValidator {
        &self.validator
    }

    /// Plan an intent. Never returns without a plan.
    pub async fn plan(&self, intent: &IntentClassification) -> PlanningOutcome {
        let reason = match self.generator.generate(intent).await {
            Ok(candidate) => {
                let validation = self.validator.validate(&candidate);
                if validation.valid {
                    return PlanningOutcome {
                        plan: candidate,
                        source: PlanSource::Generated,
                        validation,
                        fallback_reason: None,
                    };
                }
                format!("generated plan rejected: {}", validation.summary())
            }
            Err(err) => err.to_string(),
        };

        warn!(
            intent = %intent.intent_type,
            reason = %truncate_for_log(&reason, MAX_PROMPT_LOG_CHARS),
            "falling back to template plan"
        );
        let plan = templates::template_plan(intent);
        let validation = self.validator.validate(&plan);
        PlanningOutcome {
            plan,
            source: PlanSource::Template,
            validation,
            fallback_reason: Some(reason),
        }
    }
}
