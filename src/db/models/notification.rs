//! Withdrawal notification request model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
pub struct WithdrawRequest {
    /// Either a JSON string or number; rendered verbatim
    pub amount: Option<Value>,
    pub address: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawResponse {
    pub success: bool,
}

/// Render a loosely-typed JSON field as text.
///
/// Strings are returned as-is and numbers in their JSON form. `null`, empty
/// strings and non-scalar values count as absent.
pub fn field_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
