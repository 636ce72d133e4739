//! Error types for the MCP server.
//!
//! Protocol and session faults are [`McpError`] and become JSON-RPC error
//! responses. Argument problems are [`ValidationError`], also surfaced at the
//! protocol level. Failures raised by a tool handler are [`HandlerError`] and
//! only ever travel inside a call envelope.

use serde_json::{json, Value as JsonValue};
use thiserror::Error;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// JSON-RPC error codes.
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// A method other than `initialize` arrived before initialization.
    pub const NOT_INITIALIZED: i64 = -32002;
}

/// Errors raised by the protocol layer.
#[derive(Error, Debug)]
pub enum McpError {
    /// Line was not valid JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// JSON was valid but not a request object.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Method is not part of the protocol.
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Method arrived before `initialize`.
    #[error("Server not initialized: '{0}' requires a prior 'initialize'")]
    NotInitialized(String),

    /// Malformed parameters for a protocol method.
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Tool name is not registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool name registered (or bound) twice.
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// Arguments rejected by the tool's input shape.
    #[error("Invalid arguments for '{tool}': {source}")]
    Validation {
        /// Tool being called
        tool: String,
        /// What was wrong
        #[source]
        source: ValidationError,
    },

    /// Serialization failure.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure on the transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Startup or configuration problem.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// JSON-RPC error code for this error.
    pub fn code(&self) -> i64 {
        match self {
            McpError::Parse(_) => codes::PARSE_ERROR,
            McpError::InvalidRequest(_) => codes::INVALID_REQUEST,
            McpError::MethodNotFound(_) | McpError::ToolNotFound(_) => codes::METHOD_NOT_FOUND,
            McpError::NotInitialized(_) => codes::NOT_INITIALIZED,
            McpError::InvalidParams(_) | McpError::Validation { .. } => codes::INVALID_PARAMS,
            _ => codes::INTERNAL_ERROR,
        }
    }

    /// Structured `data` member for the JSON-RPC error object.
    pub fn data(&self) -> Option<JsonValue> {
        match self {
            McpError::NotInitialized(method) => Some(json!({
                "kind": "NotInitialized",
                "method": method,
            })),
            McpError::ToolNotFound(name) => Some(json!({
                "kind": "ToolNotFound",
                "tool": name,
            })),
            McpError::Validation { tool, source } => {
                let mut data = source.to_data();
                if let Some(obj) = data.as_object_mut() {
                    obj.insert("tool".to_string(), JsonValue::String(tool.clone()));
                }
                Some(data)
            }
            _ => None,
        }
    }
}

/// Why a set of tool arguments was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `arguments` was not a JSON object.
    #[error("arguments must be an object, got {0}")]
    InvalidArguments(String),

    /// A required parameter was not supplied.
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),

    /// A parameter was supplied with the wrong JSON type.
    #[error("parameter '{name}' expected {expected}, got {actual}")]
    TypeMismatch {
        /// Parameter name
        name: String,
        /// Declared type
        expected: String,
        /// Observed JSON type
        actual: String,
    },

    /// An enum parameter carried a value outside its allowed set.
    #[error("parameter '{name}' must be one of [{}], got '{value}'", .allowed.join(", "))]
    InvalidEnumValue {
        /// Parameter name
        name: String,
        /// Supplied value
        value: String,
        /// Allowed values
        allowed: Vec<String>,
    },

    /// A parameter not declared by the tool was supplied.
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),
}

impl ValidationError {
    /// Variant name as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::InvalidArguments(_) => "InvalidArguments",
            ValidationError::MissingParameter(_) => "MissingParameter",
            ValidationError::TypeMismatch { .. } => "TypeMismatch",
            ValidationError::InvalidEnumValue { .. } => "InvalidEnumValue",
            ValidationError::UnknownParameter(_) => "UnknownParameter",
        }
    }

    fn to_data(&self) -> JsonValue {
        match self {
            ValidationError::InvalidArguments(actual) => json!({
                "kind": self.kind(),
                "actual": actual,
            }),
            ValidationError::MissingParameter(name) | ValidationError::UnknownParameter(name) => {
                json!({ "kind": self.kind(), "parameter": name })
            }
            ValidationError::TypeMismatch {
                name,
                expected,
                actual,
            } => json!({
                "kind": self.kind(),
                "parameter": name,
                "expected": expected,
                "actual": actual,
            }),
            ValidationError::InvalidEnumValue {
                name,
                value,
                allowed,
            } => json!({
                "kind": self.kind(),
                "parameter": name,
                "value": value,
                "allowed": allowed,
            }),
        }
    }
}

/// A failure reported by a tool handler.
///
/// Carries a human-readable message and optional structured details. The
/// invoker turns it into a `HandlerError` envelope.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct HandlerError {
    /// Human-readable cause
    pub message: String,
    /// Optional structured context
    pub details: Option<JsonValue>,
}

impl HandlerError {
    /// Create a handler error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_maps_to_invalid_params_with_kind() {
        let err = McpError::Validation {
            tool: "add".to_string(),
            source: ValidationError::MissingParameter("b".to_string()),
        };
        assert_eq!(err.code(), codes::INVALID_PARAMS);

        let data = err.data().unwrap();
        assert_eq!(data["kind"], "MissingParameter");
        assert_eq!(data["parameter"], "b");
        assert_eq!(data["tool"], "add");
    }

    #[test]
    fn not_initialized_has_its_own_code() {
        let err = McpError::NotInitialized("tools/call".to_string());
        assert_eq!(err.code(), codes::NOT_INITIALIZED);
        assert_eq!(err.data().unwrap()["kind"], "NotInitialized");
    }

    #[test]
    fn enum_error_lists_allowed_values() {
        let err = ValidationError::InvalidEnumValue {
            name: "units".to_string(),
            value: "kelvin".to_string(),
            allowed: vec!["metric".to_string(), "imperial".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "parameter 'units' must be one of [metric, imperial], got 'kelvin'"
        );
    }
}
