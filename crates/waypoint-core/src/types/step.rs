//! Step type definitions
//!
//! Step represents one planned tool invocation in a Plan.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Default retry budget for a step (excluding the initial attempt).
pub const DEFAULT_STEP_MAX_RETRIES: u32 = 3;

/// Strongly-typed Step ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&StepId> for StepId {
    fn from(value: &StepId) -> Self {
        value.clone()
    }
}

impl From<StepId> for String {
    fn from(value: StepId) -> Self {
        value.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for StepId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    DEFAULT_STEP_MAX_RETRIES
}

/// A single step in the execution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Unique identifier for this step within its plan
    pub id: StepId,
    /// Name of the tool to invoke
    pub tool_name: String,
    /// Parameters for the tool
    #[serde(default)]
    pub params: Value,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// IDs of steps this step depends on
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    /// Optional steps do not halt the plan when they fail
    #[serde(default)]
    pub optional: bool,
    /// Whether failures of this step may be retried at all
    #[serde(default = "default_true")]
    pub retryable: bool,
    /// Retry budget for this step
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Step {
    /// Create a new step invoking `tool_name`
    pub fn new(id: impl Into<StepId>, tool_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            params: Value::Object(serde_json::Map::new()),
            description: None,
            depends_on: Vec::new(),
            optional: false,
            retryable: true,
            max_retries: DEFAULT_STEP_MAX_RETRIES,
        }
    }

    /// Add parameters
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Add dependencies
    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the step optional (failure does not short-circuit the plan)
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Disable retries for this step
    pub fn non_retryable(mut self) -> Self {
        self.retryable = false;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Check whether this step names `other` as a dependency
    pub fn depends_on_step(&self, other: &StepId) -> bool {
        self.depends_on.iter().any(|dep| dep == other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_deserialize_applies_defaults() {
        let step: Step = serde_json::from_value(json!({
            "id": "s1",
            "toolName": "search_flights",
            "params": {"origin": "SFO"}
        }))
        .expect("step");

        assert_eq!(step.id, "s1");
        assert!(step.depends_on.is_empty());
        assert!(!step.optional);
        assert!(step.retryable);
        assert_eq!(step.max_retries, DEFAULT_STEP_MAX_RETRIES);
    }

    #[test]
    fn test_step_builder_sets_dependencies() {
        let step = Step::new("s2", "book_flight").with_depends_on(["s1"]).optional();
        assert!(step.depends_on_step(&StepId::from("s1")));
        assert!(step.optional);
    }
}
