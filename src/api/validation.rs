//! Presence checks for request bodies.
//!
//! Fields are optional in the request schemas so that a missing field is
//! reported as a validation error rather than a deserialization failure.

use serde_json::Value;

use super::error::ValidationErrorBuilder;
use crate::db::field_text;

/// Record an error for an absent or empty string field.
pub fn require_str<'a>(
    errors: &mut ValidationErrorBuilder,
    field: &str,
    value: Option<&'a str>,
) -> &'a str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => {
            errors.add(field, format!("{} is required", field));
            ""
        }
    }
}

/// Record an error for an absent field that may be a JSON string or number.
pub fn require_scalar(
    errors: &mut ValidationErrorBuilder,
    field: &str,
    value: Option<&Value>,
) -> String {
    match field_text(value) {
        Some(text) => text,
        None => {
            errors.add(field, format!("{} is required", field));
            String::new()
        }
    }
}
