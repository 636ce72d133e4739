//! Declared input shapes for tools.
//!
//! An [`InputShape`] is the ordered list of parameters a tool accepts. It is
//! the single source of truth for both argument validation and the JSON Schema
//! advertised to clients as `inputSchema`.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value as JsonValue};

/// Type of a declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// JSON number without a fractional part
    Integer,
    /// JSON boolean
    Boolean,
    /// JSON string drawn from a fixed set
    Enum(Vec<String>),
}

impl ParamType {
    /// Build an enum type from its allowed values.
    pub fn one_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParamType::Enum(values.into_iter().map(Into::into).collect())
    }

    /// Name used in JSON Schema and in type-mismatch errors.
    pub fn name(&self) -> &'static str {
        match self {
            ParamType::String | ParamType::Enum(_) => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }

    /// Whether the JSON type of `value` fits. Enum membership is checked
    /// separately.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            ParamType::String | ParamType::Enum(_) => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => match value {
                JsonValue::Number(n) => {
                    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
                }
                _ => false,
            },
            ParamType::Boolean => value.is_boolean(),
        }
    }

    /// Allowed values for an enum type.
    pub fn allowed_values(&self) -> Option<&[String]> {
        match self {
            ParamType::Enum(values) => Some(values),
            _ => None,
        }
    }
}

/// Name of the JSON type of a value, as reported in errors.
pub fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: ParamType,
    /// Whether callers must supply it
    pub required: bool,
    /// Value injected when the caller omits it
    pub default: Option<JsonValue>,
    /// Human-readable description
    pub description: Option<String>,
}

impl ParamSpec {
    /// A parameter callers must supply.
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
            description: None,
        }
    }

    /// A parameter callers may omit.
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty)
        }
    }

    /// Set the default injected when omitted.
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn to_json_schema(&self) -> JsonValue {
        let mut prop = Map::new();
        prop.insert("type".to_string(), json!(self.ty.name()));
        if let Some(values) = self.ty.allowed_values() {
            prop.insert("enum".to_string(), json!(values));
        }
        if let Some(ref description) = self.description {
            prop.insert("description".to_string(), json!(description));
        }
        if let Some(ref default) = self.default {
            prop.insert("default".to_string(), default.clone());
        }
        JsonValue::Object(prop)
    }
}

/// Ordered set of parameters a tool accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputShape {
    params: Vec<ParamSpec>,
}

impl InputShape {
    /// A shape with no parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing any earlier one with the same name.
    pub fn with(mut self, param: ParamSpec) -> Self {
        self.params.retain(|p| p.name != param.name);
        self.params.push(param);
        self
    }

    /// Declared parameters in declaration order.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Look up a parameter by name.
    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render as a JSON Schema object. Extra properties are always rejected.
    pub fn to_json_schema(&self) -> JsonValue {
        let mut props = Map::new();
        for param in &self.params {
            props.insert(param.name.clone(), param.to_json_schema());
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": props,
            "required": required,
            "additionalProperties": false
        })
    }
}

impl Serialize for InputShape {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_schema().serialize(serializer)
    }
}
