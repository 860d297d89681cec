//! Intent classification types
//!
//! An IntentClassification is produced by the upstream classifier and is
//! immutable once created.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Closed set of intents the planner understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    SearchFlights,
    BookFlight,
    ApplyJob,
    FillForm,
    PostSocial,
    WebResearch,
    Unknown,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchFlights => "search_flights",
            Self::BookFlight => "book_flight",
            Self::ApplyJob => "apply_job",
            Self::FillForm => "fill_form",
            Self::PostSocial => "post_social",
            Self::WebResearch => "web_research",
            Self::Unknown => "unknown",
        }
    }

    /// Whether a deterministic template plan exists for this intent
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for IntentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed intent produced by the classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentClassification {
    pub intent_type: IntentType,
    #[serde(default)]
    pub params: HashMap<String, Value>,
    /// Classifier confidence in `0.0..=1.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_fields: Option<Vec<String>>,
}

impl IntentClassification {
    pub fn new(intent_type: IntentType) -> Self {
        Self {
            intent_type,
            params: HashMap::new(),
            confidence: None,
            missing_fields: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_missing_fields(mut self, fields: Vec<String>) -> Self {
        self.missing_fields = Some(fields);
        self
    }

    /// Look up a string parameter
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    pub fn has_missing_fields(&self) -> bool {
        self.missing_fields
            .as_ref()
            .map(|fields| !fields.is_empty())
            .unwrap_or(false)
    }
}
