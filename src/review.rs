use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::schema::ExtractionError;

/// Aggregates the error list into counts per code plus the distinct
/// messages behind each code, for the review dashboard.
pub fn build_review_report(errors: &[ExtractionError]) -> Value {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    let mut unique_messages: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for error in errors {
        *counts.entry(error.code.as_str()).or_insert(0) += 1;
        let messages = unique_messages.entry(error.code.as_str()).or_default();
        if !messages.contains(&error.message.as_str()) {
            messages.push(error.message.as_str());
        }
    }

    json!({
        "error_count": errors.len(),
        "error_codes": counts,
        "messages": unique_messages,
    })
}
