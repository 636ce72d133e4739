//! MCP session management.
//!
//! Owns the protocol state machine and routes each decoded request to its
//! method handler. One session per stream, one request at a time.

use std::time::Instant;

use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{McpError, Result};
use crate::invoker::ToolInvoker;
use crate::server::{JsonRpcRequest, JsonRpcResponse, ToolCallParams, ToolCallResponse};
use crate::tools::ToolRegistry;
use crate::validate::validate_arguments;

/// MCP protocol revision this server speaks.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Standard MCP methods.
pub mod methods {
    /// Handshake
    pub const INITIALIZE: &str = "initialize";
    /// Client acknowledgement of the handshake (notification)
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Tool discovery
    pub const LIST_TOOLS: &str = "tools/list";
    /// Tool invocation
    pub const CALL_TOOL: &str = "tools/call";
    /// Liveness probe
    pub const PING: &str = "ping";
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for `initialize`
    Uninitialized,
    /// Serving requests
    Ready,
    /// Stream closed; absorbing
    Terminated,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializeParams {
    #[serde(default)]
    protocol_version: Option<String>,
    #[serde(default)]
    client_info: Option<ClientInfo>,
    #[serde(default, alias = "client_name")]
    client_name: Option<String>,
    #[serde(default, alias = "client_version")]
    client_version: Option<String>,
}

/// MCP session state.
///
/// Holds the tool registry, the invoker, and the current [`SessionState`].
pub struct McpSession {
    registry: ToolRegistry,
    invoker: ToolInvoker,
    state: SessionState,
    server_name: String,
    server_version: String,
}

impl McpSession {
    /// Create a session over a fully built registry.
    pub fn new(registry: ToolRegistry, config: &ServerConfig) -> Self {
        Self {
            registry,
            invoker: ToolInvoker::new(config.call_timeout),
            state: SessionState::Uninitialized,
            server_name: config.server_name.clone(),
            server_version: config.server_version.clone(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The tool registry.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Move to `Terminated`. Further messages are ignored.
    pub fn terminate(&mut self) {
        if self.state != SessionState::Terminated {
            info!(previous = ?self.state, "Session terminated");
            self.state = SessionState::Terminated;
        }
    }

    /// Process one request.
    ///
    /// Returns the response to write, or `None` for notifications and for
    /// anything received after termination.
    pub async fn handle(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if self.state == SessionState::Terminated {
            debug!(method = %request.method, "Dropping message after termination");
            return None;
        }

        let outcome = self.dispatch(&request.method, request.params).await;

        match request.id {
            Some(id) => Some(match outcome {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(e) => {
                    warn!(method = %request.method, error = %e, "Request failed");
                    JsonRpcResponse::from_error(id, &e)
                }
            }),
            None => {
                if let Err(e) = outcome {
                    warn!(method = %request.method, error = %e, "Notification failed");
                }
                None
            }
        }
    }

    async fn dispatch(&mut self, method: &str, params: JsonValue) -> Result<JsonValue> {
        if method == methods::INITIALIZE {
            return self.handle_initialize(params);
        }
        if self.state == SessionState::Uninitialized {
            return Err(McpError::NotInitialized(method.to_string()));
        }

        match method {
            methods::LIST_TOOLS => Ok(self.tools_list()),
            methods::CALL_TOOL => self.handle_tools_call(params).await,
            methods::PING => Ok(json!({ "message": "pong" })),
            methods::INITIALIZED => {
                debug!("Client acknowledged initialization");
                Ok(JsonValue::Null)
            }
            m if m.starts_with("notifications/") => {
                debug!(method = m, "Ignoring notification");
                Ok(JsonValue::Null)
            }
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    fn handle_initialize(&mut self, params: JsonValue) -> Result<JsonValue> {
        let params: InitializeParams = if params.is_null() {
            InitializeParams::default()
        } else {
            serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))?
        };

        let client_info = params.client_info.unwrap_or_default();
        let client_name = client_info.name.or(params.client_name);
        let client_version = client_info.version.or(params.client_version);

        if self.state == SessionState::Ready {
            debug!("Repeated initialize; session already ready");
        } else {
            info!(
                client = client_name.as_deref().unwrap_or("unknown"),
                client_version = client_version.as_deref().unwrap_or("unknown"),
                requested_protocol = params.protocol_version.as_deref().unwrap_or("unspecified"),
                tools = self.registry.len(),
                "Session initialized"
            );
            self.state = SessionState::Ready;
        }

        Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": self.registry.tools(),
            },
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version,
            }
        }))
    }

    fn tools_list(&self) -> JsonValue {
        json!({ "tools": self.registry.tools() })
    }

    async fn handle_tools_call(&mut self, params: JsonValue) -> Result<JsonValue> {
        let params: ToolCallParams =
            serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))?;

        let tool = self
            .registry
            .get(&params.name)
            .ok_or_else(|| McpError::ToolNotFound(params.name.clone()))?;

        let args = validate_arguments(&tool.input_shape, &params.arguments).map_err(|source| {
            McpError::Validation {
                tool: params.name.clone(),
                source,
            }
        })?;

        let started = Instant::now();
        let result = self.invoker.invoke(&self.registry, &params.name, args).await;
        info!(
            tool = %params.name,
            success = result.success,
            error_kind = ?result.error_kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool call"
        );

        Ok(serde_json::to_value(ToolCallResponse::from_call_result(&result)?)?)
    }
}
