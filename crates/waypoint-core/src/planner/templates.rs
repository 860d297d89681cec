//! Deterministic template plans used when generation fails or is rejected

use serde_json::{Map, Value};

use crate::types::{IntentClassification, IntentType, Plan, Step};

/// Copy the named intent params into a params object, skipping absent ones
fn pick(intent: &IntentClassification, keys: &[&str]) -> Value {
    let mut params = Map::new();
    for key in keys {
        if let Some(value) = intent.params.get(*key) {
            params.insert((*key).to_string(), value.clone());
        }
    }
    Value::Object(params)
}

/// Template plan for an intent; `Unknown` yields an empty plan.
pub fn template_plan(intent: &IntentClassification) -> Plan {
    let steps = match intent.intent_type {
        IntentType::SearchFlights => vec![
            Step::new("search", "search_flights")
                .with_params(pick(
                    intent,
                    &["origin", "destination", "departureDate", "returnDate", "passengers"],
                ))
                .with_description("Search matching flights"),
            Step::new("validate", "validate_result")
                .with_depends_on(["search"])
                .with_description("Check that offers were found"),
        ],
        IntentType::BookFlight => vec![
            Step::new("search", "search_flights").with_params(pick(
                intent,
                &["origin", "destination", "departureDate", "returnDate", "passengers"],
            )),
            Step::new("book", "book_flight")
                .with_params(pick(intent, &["offerId", "passengers"]))
                .with_depends_on(["search"])
                .non_retryable(),
            Step::new("screenshot", "take_screenshot")
                .with_depends_on(["book"])
                .optional(),
            Step::new("verify", "verify_booking").with_depends_on(["book"]),
        ],
        IntentType::ApplyJob => vec![
            Step::new("apply", "apply_job")
                .with_params(pick(intent, &["jobUrl", "coverLetter"]))
                .non_retryable(),
            Step::new("screenshot", "take_screenshot")
                .with_depends_on(["apply"])
                .optional(),
            Step::new("check", "check_completion").with_depends_on(["apply"]),
        ],
        IntentType::FillForm => vec![
            Step::new("fill", "fill_form").with_params(pick(intent, &["url", "fields"])),
            Step::new("submit", "submit_form")
                .with_params(pick(intent, &["url"]))
                .with_depends_on(["fill"])
                .non_retryable(),
            Step::new("screenshot", "take_screenshot")
                .with_depends_on(["submit"])
                .optional(),
            Step::new("check", "check_completion").with_depends_on(["submit"]),
        ],
        IntentType::PostSocial => vec![
            Step::new("post", "post_social")
                .with_params(pick(intent, &["platform", "content"]))
                .non_retryable(),
            Step::new("screenshot", "take_screenshot")
                .with_depends_on(["post"])
                .optional(),
            Step::new("check", "check_completion").with_depends_on(["post"]),
        ],
        IntentType::WebResearch => vec![
            Step::new("search", "web_search").with_params(pick(intent, &["query", "limit"])),
            Step::new("validate", "validate_result").with_depends_on(["search"]),
        ],
        IntentType::Unknown => Vec::new(),
    };
    Plan::new(intent.intent_type, steps)
}
