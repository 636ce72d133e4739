//! Tool registry, handler binding, and the built-in tool sets.
//!
//! Descriptors are registered once at startup, in the order clients will see
//! them. Each descriptor is then bound to a [`ToolHandler`]. After startup the
//! registry is moved into the session and never mutated again.

pub mod calculator;
#[cfg(feature = "weather")]
pub mod weather;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::config::ServerConfig;
use crate::error::{HandlerError, McpError, Result};
use crate::schema::InputShape;

/// What a handler returns: a payload, or a described failure.
pub type HandlerResult = std::result::Result<JsonValue, HandlerError>;

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDef {
    /// Tool name (e.g., "add")
    pub name: String,
    /// Tool description
    pub description: String,
    /// Declared parameters, serialized as JSON Schema
    #[serde(rename = "inputSchema")]
    pub input_shape: InputShape,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, input_shape: InputShape) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_shape,
        }
    }
}

/// The function behind a tool.
///
/// Receives arguments already validated and normalized against the tool's
/// input shape.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool.
    async fn call(&self, args: Map<String, JsonValue>) -> HandlerResult;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, JsonValue>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn call(&self, args: Map<String, JsonValue>) -> HandlerResult {
        (self.0)(args).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Map<String, JsonValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Registry of available MCP tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
    index: HashMap<String, usize>,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Names are unique.
    pub fn register(&mut self, tool: ToolDef) -> Result<()> {
        if self.index.contains_key(&tool.name) {
            return Err(McpError::DuplicateTool(tool.name));
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Bind the handler for a registered tool.
    pub fn bind(&mut self, name: &str, handler: Arc<dyn ToolHandler>) -> Result<()> {
        if !self.index.contains_key(name) {
            return Err(McpError::ToolNotFound(name.to_string()));
        }
        if self.handlers.contains_key(name) {
            return Err(McpError::DuplicateTool(name.to_string()));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Register a descriptor and bind its handler in one step.
    pub fn register_with(&mut self, tool: ToolDef, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let name = tool.name.clone();
        self.register(tool)?;
        self.bind(&name, handler)
    }

    /// Get all tool definitions, in registration order.
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Look up a tool definition.
    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// Look up the handler bound to a tool.
    pub fn handler(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Build the registry for the configured tool set.
///
/// Calculator tools come first, then weather tools.
pub fn build_registry(config: &ServerConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();

    if config.tools.includes_calculator() {
        calculator::register(&mut registry)?;
    }

    if config.tools.includes_weather() {
        #[cfg(feature = "weather")]
        {
            let client = weather::WeatherClient::new(config.weather.clone())?;
            weather::register(&mut registry, Arc::new(client))?;
        }
        #[cfg(not(feature = "weather"))]
        if config.tools == crate::config::ToolSet::Weather {
            return Err(McpError::Config(
                "weather tools requested but this build lacks the 'weather' feature".to_string(),
            ));
        }
    }

    tracing::debug!(tools = registry.len(), toolset = ?config.tools, "Tool registry built");
    Ok(registry)
}

/// Helper macro for declaring a tool's [`InputShape`](crate::schema::InputShape).
///
/// Covers plain typed parameters; use the `ParamSpec` builders directly for
/// enums, defaults and descriptions.
#[macro_export]
macro_rules! schema {
    // Object with required and optional properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? },
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        $crate::schema::InputShape::new()
            $(.with($crate::schema::ParamSpec::required($req_name, $crate::schema!(@type $req_type))))*
            $(.with($crate::schema::ParamSpec::optional($opt_name, $crate::schema!(@type $opt_type))))*
    }};

    // Object with only required properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? }
    }) => {{
        $crate::schema::InputShape::new()
            $(.with($crate::schema::ParamSpec::required($req_name, $crate::schema!(@type $req_type))))*
    }};

    // Object with only optional properties
    (object {
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        $crate::schema::InputShape::new()
            $(.with($crate::schema::ParamSpec::optional($opt_name, $crate::schema!(@type $opt_type))))*
    }};

    // Empty object (no parameters)
    (object {}) => {{
        $crate::schema::InputShape::new()
    }};

    // Type mappings
    (@type string) => { $crate::schema::ParamType::String };
    (@type number) => { $crate::schema::ParamType::Number };
    (@type integer) => { $crate::schema::ParamType::Integer };
    (@type boolean) => { $crate::schema::ParamType::Boolean };
}
