//! Argument validation against a tool's input shape.

use serde_json::{Map, Value as JsonValue};

use crate::error::ValidationError;
use crate::schema::{json_type_name, InputShape};

/// Validate raw `tools/call` arguments and normalize them.
///
/// `null` arguments count as an empty object, and a `null` value for a
/// parameter counts as omitted. On success the returned object holds exactly
/// the declared parameters that were supplied or have a default.
pub fn validate_arguments(
    shape: &InputShape,
    raw: &JsonValue,
) -> Result<Map<String, JsonValue>, ValidationError> {
    let empty = Map::new();
    let args = match raw {
        JsonValue::Null => &empty,
        JsonValue::Object(map) => map,
        other => {
            return Err(ValidationError::InvalidArguments(
                json_type_name(other).to_string(),
            ))
        }
    };
    let supplied = |name: &str| args.get(name).filter(|v| !v.is_null());

    for param in shape.params() {
        if param.required && supplied(&param.name).is_none() {
            return Err(ValidationError::MissingParameter(param.name.clone()));
        }
    }

    for param in shape.params() {
        let Some(value) = supplied(&param.name) else {
            continue;
        };
        if !param.ty.accepts(value) {
            return Err(ValidationError::TypeMismatch {
                name: param.name.clone(),
                expected: param.ty.name().to_string(),
                actual: json_type_name(value).to_string(),
            });
        }
        if let (Some(allowed), Some(s)) = (param.ty.allowed_values(), value.as_str()) {
            if !allowed.iter().any(|a| a == s) {
                return Err(ValidationError::InvalidEnumValue {
                    name: param.name.clone(),
                    value: s.to_string(),
                    allowed: allowed.to_vec(),
                });
            }
        }
    }

    if let Some(unknown) = args.keys().find(|k| shape.get(k).is_none()) {
        return Err(ValidationError::UnknownParameter(unknown.clone()));
    }

    let mut normalized = Map::new();
    for param in shape.params() {
        if let Some(value) = supplied(&param.name) {
            normalized.insert(param.name.clone(), value.clone());
        } else if let Some(ref default) = param.default {
            normalized.insert(param.name.clone(), default.clone());
        }
    }
    Ok(normalized)
}
