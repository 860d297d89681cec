//! Tool definitions known to the planner and validator

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Tools that check the outcome of earlier steps
pub const VERIFICATION_TOOLS: [&str; 3] = ["validate_result", "check_completion", "verify_booking"];

/// Tools with external, user-visible side effects
pub const BOOKING_TOOLS: [&str; 3] = ["book_flight", "apply_job", "post_social"];

/// Tools that capture evidence of what happened
pub const EVIDENCE_TOOLS: [&str; 1] = ["take_screenshot"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Search,
    Booking,
    Form,
    Social,
    Browser,
    Verification,
    Utility,
}

/// Static description of a tool, registered once at process start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub category: ToolCategory,
    #[serde(default)]
    pub description: String,
    /// JSON schema for the params map; `null` accepts anything
    #[serde(default)]
    pub parameter_schema: Value,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub is_async: bool,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, category: ToolCategory) -> Self {
        Self {
            name: name.into(),
            category,
            description: String::new(),
            parameter_schema: Value::Null,
            requires_auth: false,
            is_async: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_parameter_schema(mut self, schema: Value) -> Self {
        self.parameter_schema = schema;
        self
    }

    pub fn requiring_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }
}

/// Read-only set of tool definitions
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    definitions: HashMap<String, ToolDefinition>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: ToolDefinition) {
        if self.definitions.contains_key(&definition.name) {
            tracing::warn!(tool = %definition.name, "tool definition replaced");
        }
        self.definitions.insert(definition.name.clone(), definition);
    }

    pub fn with(mut self, definition: ToolDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    /// Definitions sorted by name
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        let mut defs: Vec<&ToolDefinition> = self.definitions.values().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The catalog of tools shipped with Waypoint
    pub fn builtin() -> Self {
        Self::new()
            .with(
                ToolDefinition::new("search_flights", ToolCategory::Search)
                    .with_description("Search flights between two airports")
                    .with_parameter_schema(json!({
                        "type": "object",
                        "properties": {
                            "origin": {"type": "string"},
                            "destination": {"type": "string"},
                            "departureDate": {"type": "string"},
                            "returnDate": {"type": "string"},
                            "passengers": {"type": "integer"}
                        },
                        "required": ["origin", "destination", "departureDate"]
                    })),
            )
            .with(
                ToolDefinition::new("book_flight", ToolCategory::Booking)
                    .with_description("Book a previously found flight offer")
                    .with_parameter_schema(json!({
                        "type": "object",
                        "properties": {
                            "offerId": {"type": "string"},
                            "passengers": {"type": "array"}
                        }
                    }))
                    .requiring_auth()
                    .asynchronous(),
            )
            .with(
                ToolDefinition::new("fill_form", ToolCategory::Form)
                    .with_description("Fill a web form with the given field values")
                    .with_parameter_schema(json!({
                        "type": "object",
                        "properties": {
                            "url": {"type": "string"},
                            "fields": {"type": "object"}
                        },
                        "required": ["url"]
                    })),
            )
            .with(
                ToolDefinition::new("submit_form", ToolCategory::Form)
                    .with_description("Submit a filled form")
                    .with_parameter_schema(json!({
                        "type": "object",
                        "properties": {"url": {"type": "string"}}
                    }))
                    .requiring_auth(),
            )
            .with(
                ToolDefinition::new("apply_job", ToolCategory::Form)
                    .with_description("Submit a job application")
                    .with_parameter_schema(json!({
                        "type": "object",
                        "properties": {
                            "jobUrl": {"type": "string"},
                            "coverLetter": {"type": "string"}
                        },
                        "required": ["jobUrl"]
                    }))
                    .requiring_auth()
                    .asynchronous(),
            )
            .with(
                ToolDefinition::new("post_social", ToolCategory::Social)
                    .with_description("Publish a post to a social network")
                    .with_parameter_schema(json!({
                        "type": "object",
                        "properties": {
                            "platform": {"type": "string", "enum": ["twitter", "linkedin", "facebook"]},
                            "content": {"type": "string"}
                        },
                        "required": ["platform", "content"]
                    }))
                    .requiring_auth(),
            )
            .with(
                ToolDefinition::new("take_screenshot", ToolCategory::Browser)
                    .with_description("Capture a screenshot as evidence")
                    .with_parameter_schema(json!({
                        "type": "object",
                        "properties": {"url": {"type": "string"}}
                    })),
            )
            .with(
                ToolDefinition::new("web_search", ToolCategory::Search)
                    .with_description("Search the web")
                    .with_parameter_schema(json!({
                        "type": "object",
                        "properties": {
                            "query": {"type": "string"},
                            "limit": {"type": "integer"}
                        },
                        "required": ["query"]
                    })),
            )
            .with(
                ToolDefinition::new("validate_result", ToolCategory::Verification)
                    .with_description("Check that a previous step produced the expected data"),
            )
            .with(
                ToolDefinition::new("check_completion", ToolCategory::Verification)
                    .with_description("Confirm the overall goal has been met"),
            )
            .with(
                ToolDefinition::new("verify_booking", ToolCategory::Verification)
                    .with_description("Confirm a booking exists with the provider"),
            )
    }
}

pub fn is_verification_tool(name: &str) -> bool {
    VERIFICATION_TOOLS.contains(&name)
}

pub fn is_booking_tool(name: &str) -> bool {
    BOOKING_TOOLS.contains(&name)
}

pub fn is_evidence_tool(name: &str) -> bool {
    EVIDENCE_TOOLS.contains(&name)
}
