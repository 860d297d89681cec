//! Plan type definitions

use serde::{Deserialize, Serialize};

use super::{IntentType, Step, StepId};

/// Rough size/difficulty classification of a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanComplexity {
    #[default]
    Simple,
    Moderate,
    Complex,
}

impl PlanComplexity {
    /// Derive complexity from the step count
    pub fn from_step_count(count: usize) -> Self {
        match count {
            0..=2 => Self::Simple,
            3..=5 => Self::Moderate,
            _ => Self::Complex,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlanMetadata {
    #[serde(default)]
    pub complexity: PlanComplexity,
    #[serde(default)]
    pub total_steps: usize,
    #[serde(default)]
    pub requires_user_input: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_seconds: Option<u64>,
}

/// Ordered, dependency-linked list of tool invocations for one intent.
///
/// Once validated and attached to a task the plan is an immutable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub intent_type: IntentType,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub metadata: PlanMetadata,
}

impl Plan {
    /// Create a plan, deriving metadata from the steps
    pub fn new(intent_type: IntentType, steps: Vec<Step>) -> Self {
        let metadata = PlanMetadata {
            complexity: PlanComplexity::from_step_count(steps.len()),
            total_steps: steps.len(),
            requires_user_input: false,
            estimated_duration_seconds: None,
        };
        Self {
            intent_type,
            steps,
            metadata,
        }
    }

    /// A plan with no steps
    pub fn empty(intent_type: IntentType) -> Self {
        Self::new(intent_type, Vec::new())
    }

    pub fn with_metadata(mut self, metadata: PlanMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Get a step by ID
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id.as_str() == id)
    }

    /// Position of a step in list order
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}
