//! Arithmetic tools.
//!
//! Tools: add, subtract, multiply, divide

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value as JsonValue};

use crate::convert::{get_f64_arg, number_to_json};
use crate::error::{HandlerError, Result};
use crate::schema;
use crate::tools::{HandlerResult, ToolDef, ToolHandler, ToolRegistry};

/// One of the four binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// a + b
    Add,
    /// a - b
    Subtract,
    /// a * b
    Multiply,
    /// a / b
    Divide,
}

impl Operation {
    /// All operations, in registration order.
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
    ];

    /// Tool name.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Operation::Add => "Add two numbers. Returns {\"result\": a + b}.",
            Operation::Subtract => "Subtract b from a. Returns {\"result\": a - b}.",
            Operation::Multiply => "Multiply two numbers. Returns {\"result\": a * b}.",
            Operation::Divide => {
                "Divide a by b. Returns {\"result\": a / b}. Fails when b is zero."
            }
        }
    }

    /// Apply the operation.
    pub fn apply(self, a: f64, b: f64) -> std::result::Result<f64, HandlerError> {
        let value = match self {
            Operation::Add => a + b,
            Operation::Subtract => a - b,
            Operation::Multiply => a * b,
            Operation::Divide => {
                if b == 0.0 {
                    return Err(HandlerError::new("division by zero")
                        .with_details(json!({ "dividend": a, "divisor": b })));
                }
                a / b
            }
        };
        Ok(value)
    }
}

/// Get all calculator tool definitions.
pub fn tools() -> Vec<ToolDef> {
    Operation::ALL
        .iter()
        .map(|op| {
            ToolDef::new(
                op.name(),
                op.description(),
                schema!(object {
                    required: { "a": number, "b": number }
                }),
            )
        })
        .collect()
}

/// Handler for one arithmetic tool.
#[derive(Debug, Clone, Copy)]
pub struct Arithmetic(pub Operation);

#[async_trait]
impl ToolHandler for Arithmetic {
    async fn call(&self, args: Map<String, JsonValue>) -> HandlerResult {
        let a = get_f64_arg(&args, "a")?;
        let b = get_f64_arg(&args, "b")?;
        let value = self.0.apply(a, b)?;
        let result = number_to_json(value).ok_or_else(|| {
            HandlerError::new("result is not a finite number")
                .with_details(json!({ "operation": self.0.name() }))
        })?;
        Ok(json!({ "result": result }))
    }
}

/// Register and bind the calculator tools.
pub fn register(registry: &mut ToolRegistry) -> Result<()> {
    for (def, op) in tools().into_iter().zip(Operation::ALL) {
        registry.register_with(def, Arc::new(Arithmetic(op)))?;
    }
    Ok(())
}
