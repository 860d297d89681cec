//! Plan Validator module
//!
//! Static analysis of a candidate plan before it is attached to a task:
//! - tool existence and parameter schema conformance
//! - dependency references, duplicates and cycles
//! - non-blocking warnings and suggestions
//!
//! Validation is a pure function of the plan and the tool catalog.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::schema::validate_against_schema;
use crate::tool::{is_booking_tool, is_evidence_tool, is_verification_tool, ToolCatalog};
use crate::types::{Plan, StepId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    EmptyPlan,
    InvalidTool,
    InvalidParams,
    InvalidDependency,
    CircularDependency,
    DuplicateStepId,
    ForwardDependency,
    AuthRequired,
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::EmptyPlan => "EMPTY_PLAN",
            Self::InvalidTool => "INVALID_TOOL",
            Self::InvalidParams => "INVALID_PARAMS",
            Self::InvalidDependency => "INVALID_DEPENDENCY",
            Self::CircularDependency => "CIRCULAR_DEPENDENCY",
            Self::DuplicateStepId => "DUPLICATE_STEP_ID",
            Self::ForwardDependency => "FORWARD_DEPENDENCY",
            Self::AuthRequired => "AUTH_REQUIRED",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,
    pub code: ValidationCode,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    fn error(step_id: Option<&StepId>, code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.cloned(),
            code,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    fn warning(step_id: Option<&StepId>, code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.cloned(),
            code,
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Outcome of validating a plan; surfaced to the caller, never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl PlanValidationResult {
    /// Issues with error severity
    pub fn fatal_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn has_code(&self, code: ValidationCode) -> bool {
        self.errors.iter().any(|i| i.code == code)
    }

    /// Codes reported for a given step
    pub fn codes_for(&self, step_id: &str) -> Vec<ValidationCode> {
        self.errors
            .iter()
            .filter(|i| i.step_id.as_ref().map(|s| s.as_str()) == Some(step_id))
            .map(|i| i.code)
            .collect()
    }

    /// One-line summary of the fatal issues
    pub fn summary(&self) -> String {
        self.fatal_issues()
            .map(|issue| match &issue.step_id {
                Some(step_id) => format!("[{}] {}: {}", step_id, issue.code, issue.message),
                None => format!("{}: {}", issue.code, issue.message),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Plan validator backed by a tool catalog
#[derive(Debug, Clone)]
pub struct PlanValidator {
    catalog: Arc<ToolCatalog>,
}

impl PlanValidator {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// Validate a plan
    pub fn validate(&self, plan: &Plan) -> PlanValidationResult {
        if plan.steps.is_empty() {
            return PlanValidationResult {
                valid: false,
                errors: vec![ValidationIssue::error(
                    None,
                    ValidationCode::EmptyPlan,
                    "plan contains no steps",
                )],
                warnings: Vec::new(),
                suggestions: Vec::new(),
            };
        }

        let mut issues = Vec::new();
        let mut warnings = Vec::new();
        let mut suggestions = Vec::new();

        let mut seen_ids = HashSet::new();
        for step in &plan.steps {
            if !seen_ids.insert(&step.id) {
                issues.push(ValidationIssue::error(
                    Some(&step.id),
                    ValidationCode::DuplicateStepId,
                    format!("step id '{}' is used more than once", step.id),
                ));
            }
        }

        for (index, step) in plan.steps.iter().enumerate() {
            let Some(definition) = self.catalog.get(&step.tool_name) else {
                issues.push(ValidationIssue::error(
                    Some(&step.id),
                    ValidationCode::InvalidTool,
                    format!("unknown tool '{}'", step.tool_name),
                ));
                continue;
            };

            if let Err(reason) = validate_against_schema(&step.params, &definition.parameter_schema)
            {
                issues.push(ValidationIssue::error(
                    Some(&step.id),
                    ValidationCode::InvalidParams,
                    format!("invalid params for '{}': {}", step.tool_name, reason),
                ));
            }

            for dep_id in &step.depends_on {
                let Some(dep_index) = plan.position(dep_id) else {
                    issues.push(ValidationIssue::error(
                        Some(&step.id),
                        ValidationCode::InvalidDependency,
                        format!("depends on undefined step '{}'", dep_id),
                    ));
                    continue;
                };
                let dependency = &plan.steps[dep_index];
                if dependency.depends_on_step(&step.id) {
                    issues.push(ValidationIssue::error(
                        Some(&step.id),
                        ValidationCode::CircularDependency,
                        format!("'{}' and '{}' depend on each other", step.id, dep_id),
                    ));
                } else if dep_index > index {
                    issues.push(ValidationIssue::warning(
                        Some(&step.id),
                        ValidationCode::ForwardDependency,
                        format!(
                            "depends on '{}' which is scheduled later in the plan",
                            dep_id
                        ),
                    ));
                }
            }

            if definition.requires_auth {
                issues.push(ValidationIssue::warning(
                    Some(&step.id),
                    ValidationCode::AuthRequired,
                    format!("tool '{}' requires an authenticated user", step.tool_name),
                ));
            }
        }

        if let Some(cycle) = find_long_cycle(plan) {
            let path = cycle
                .iter()
                .map(StepId::as_str)
                .collect::<Vec<_>>()
                .join(" -> ");
            issues.push(ValidationIssue::error(
                cycle.first(),
                ValidationCode::CircularDependency,
                format!("dependency cycle: {}", path),
            ));
        }

        let has_verification = plan.steps.iter().any(|s| is_verification_tool(&s.tool_name));
        if !has_verification && plan.steps.len() > 1 {
            warnings.push(
                "plan has no verification step; consider adding validate_result or check_completion"
                    .to_string(),
            );
        }

        let has_booking = plan.steps.iter().any(|s| is_booking_tool(&s.tool_name));
        let has_evidence = plan.steps.iter().any(|s| is_evidence_tool(&s.tool_name));
        if has_booking && !has_evidence {
            suggestions.push(
                "capture evidence with take_screenshot after booking, applying or posting"
                    .to_string(),
            );
        }

        let valid = !issues.iter().any(|i| i.severity == Severity::Error);
        if !valid {
            tracing::debug!(
                intent = %plan.intent_type,
                error_count = issues.iter().filter(|i| i.severity == Severity::Error).count(),
                "plan validation failed"
            );
        }

        PlanValidationResult {
            valid,
            errors: issues,
            warnings,
            suggestions,
        }
    }
}

/// Find a dependency cycle of three or more steps.
///
/// Self references and direct two-step cycles are reported per step by the
/// main pass, so their edges are excluded here.
fn find_long_cycle(plan: &Plan) -> Option<Vec<StepId>> {
    let ids: HashSet<&str> = plan.steps.iter().map(|s| s.id.as_str()).collect();
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &plan.steps {
        let entry = adj.entry(step.id.as_str()).or_default();
        for dep in &step.depends_on {
            if dep == &step.id || !ids.contains(dep.as_str()) {
                continue;
            }
            let mutual = plan
                .get_step(dep.as_str())
                .map(|d| d.depends_on_step(&step.id))
                .unwrap_or(false);
            if !mutual {
                entry.push(dep.as_str());
            }
        }
    }

    fn dfs<'a>(
        node: &'a str,
        adj: &HashMap<&'a str, Vec<&'a str>>,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<&'a str>> {
        visited.insert(node);
        stack.push(node);

        if let Some(neighbors) = adj.get(node) {
            for &neighbor in neighbors {
                if let Some(pos) = stack.iter().position(|n| *n == neighbor) {
                    let mut cycle = stack[pos..].to_vec();
                    cycle.push(neighbor);
                    return Some(cycle);
                }
                if !visited.contains(neighbor) {
                    if let Some(cycle) = dfs(neighbor, adj, visited, stack) {
                        return Some(cycle);
                    }
                }
            }
        }

        stack.pop();
        None
    }

    let mut visited = HashSet::new();
    for step in &plan.steps {
        if visited.contains(step.id.as_str()) {
            continue;
        }
        let mut stack = Vec::new();
        if let Some(cycle) = dfs(step.id.as_str(), &adj, &mut visited, &mut stack) {
            return Some(cycle.into_iter().map(StepId::from).collect());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IntentType, Step};
    use serde_json::json;

    fn validator() -> PlanValidator {
        PlanValidator::new(Arc::new(ToolCatalog::builtin()))
    }

    fn search_step(id: &str) -> Step {
        Step::new(id, "search_flights").with_params(json!({
            "origin": "SFO",
            "destination": "JFK",
            "departureDate": "2026-11-02"
        }))
    }

    #[test]
    fn test_empty_plan_is_invalid() {
        let result = validator().validate(&Plan::empty(IntentType::SearchFlights));
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, ValidationCode::EmptyPlan);
    }

    #[test]
    fn test_unknown_tool_skips_remaining_checks() {
        let plan = Plan::new(
            IntentType::Unknown,
            vec![Step::new("s1", "teleport").with_depends_on(["nowhere"])],
        );
        let result = validator().validate(&plan);
        assert!(!result.valid);
        assert_eq!(result.codes_for("s1"), vec![ValidationCode::InvalidTool]);
    }

    #[test]
    fn test_param_schema_violation_reported() {
        let plan = Plan::new(
            IntentType::SearchFlights,
            vec![Step::new("s1", "search_flights").with_params(json!({"origin": "SFO"}))],
        );
        let result = validator().validate(&plan);
        assert!(!result.valid);
        let issue = &result.errors[0];
        assert_eq!(issue.code, ValidationCode::InvalidParams);
        assert!(issue.message.contains("destination"));
    }

    #[test]
    fn test_missing_dependency_reported() {
        let plan = Plan::new(
            IntentType::SearchFlights,
            vec![search_step("s1").with_depends_on(["ghost"])],
        );
        let result = validator().validate(&plan);
        assert!(!result.valid);
        assert_eq!(result.codes_for("s1"), vec![ValidationCode::InvalidDependency]);
    }

    #[test]
    fn test_direct_two_cycle_reported_for_both_steps() {
        let plan = Plan::new(
            IntentType::SearchFlights,
            vec![
                search_step("a").with_depends_on(["b"]),
                search_step("b").with_depends_on(["a"]),
            ],
        );
        let result = validator().validate(&plan);
        assert!(!result.valid);
        assert!(result.codes_for("a").contains(&ValidationCode::CircularDependency));
        assert!(result.codes_for("b").contains(&ValidationCode::CircularDependency));
        assert_eq!(
            result
                .errors
                .iter()
                .filter(|i| i.code == ValidationCode::CircularDependency)
                .count(),
            2
        );
    }

    #[test]
    fn test_three_step_cycle_reported() {
        let plan = Plan::new(
            IntentType::SearchFlights,
            vec![
                search_step("a").with_depends_on(["c"]),
                search_step("b").with_depends_on(["a"]),
                search_step("c").with_depends_on(["b"]),
            ],
        );
        let result = validator().validate(&plan);
        assert!(!result.valid);
        let cycle = result
            .errors
            .iter()
            .find(|i| i.code == ValidationCode::CircularDependency)
            .expect("cycle issue");
        assert!(cycle.message.contains("->"));
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let plan = Plan::new(
            IntentType::SearchFlights,
            vec![search_step("s1"), search_step("s1")],
        );
        let result = validator().validate(&plan);
        assert!(!result.valid);
        assert!(result.has_code(ValidationCode::DuplicateStepId));
    }

    #[test]
    fn test_warnings_and_suggestions_do_not_invalidate() {
        let plan = Plan::new(
            IntentType::BookFlight,
            vec![
                search_step("s1"),
                Step::new("s2", "book_flight")
                    .with_params(json!({"offerId": "o-1"}))
                    .with_depends_on(["s1"]),
            ],
        );
        let result = validator().validate(&plan);
        assert!(result.valid, "{}", result.summary());
        assert!(result.has_code(ValidationCode::AuthRequired));
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.suggestions.len(), 1);
    }

    #[test]
    fn test_single_step_plan_needs_no_verification() {
        let plan = Plan::new(IntentType::SearchFlights, vec![search_step("s1")]);
        let result = validator().validate(&plan);
        assert!(result.valid);
        assert!(result.warnings.is_empty());
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_forward_dependency_is_warning_only() {
        let plan = Plan::new(
            IntentType::SearchFlights,
            vec![
                search_step("s1").with_depends_on(["s2"]),
                search_step("s2"),
                Step::new("s3", "check_completion").with_depends_on(["s1"]),
            ],
        );
        let result = validator().validate(&plan);
        assert!(result.valid);
        assert_eq!(result.codes_for("s1"), vec![ValidationCode::ForwardDependency]);
    }

    #[test]
    fn test_validate_is_idempotent() {
        let plan = Plan::new(
            IntentType::BookFlight,
            vec![
                search_step("a").with_depends_on(["b"]),
                search_step("b").with_depends_on(["a", "missing"]),
                Step::new("c", "book_flight"),
            ],
        );
        let v = validator();
        assert_eq!(v.validate(&plan), v.validate(&plan));
    }
}
