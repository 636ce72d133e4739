//! Argument extraction and result conversion helpers for tool handlers.
//!
//! Handlers receive arguments that already passed validation, so a failure
//! here means the handler and its declared input shape disagree.

use serde_json::{Map, Number, Value as JsonValue};

use crate::error::HandlerError;

/// Helper to get a required string argument.
pub fn get_string_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String, HandlerError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| missing(name, "string"))
}

/// Helper to get an optional string argument.
pub fn get_optional_string(args: &Map<String, JsonValue>, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Helper to get a required numeric argument.
pub fn get_f64_arg(args: &Map<String, JsonValue>, name: &str) -> Result<f64, HandlerError> {
    args.get(name)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| missing(name, "number"))
}

/// Helper to get an optional numeric argument.
pub fn get_optional_f64(args: &Map<String, JsonValue>, name: &str) -> Option<f64> {
    args.get(name).and_then(|v| v.as_f64())
}

fn missing(name: &str, expected: &str) -> HandlerError {
    HandlerError::new(format!("argument '{name}' is missing or not a {expected}"))
}

/// Convert an arithmetic result to JSON.
///
/// Integral values inside the i64 range become JSON integers so `42.0`
/// is reported as `42`. Non-finite values have no JSON form and yield `None`.
pub fn number_to_json(value: f64) -> Option<JsonValue> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&value) {
        return Some(JsonValue::Number((value as i64).into()));
    }
    Number::from_f64(value).map(JsonValue::Number)
}

// 2^63, exactly representable as f64
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
