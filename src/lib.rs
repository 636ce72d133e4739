//! # toolhost-mcp
//!
//! MCP (Model Context Protocol) tool server over stdio.
//!
//! This crate exposes a registry of typed tools to AI agents. It implements
//! the MCP protocol over stdin/stdout using newline-delimited JSON-RPC 2.0,
//! validates every call against the tool's declared input shape, and runs
//! handlers under a per-call timeout.
//!
//! ## Built-in Tools
//!
//! - Calculator: `add`, `subtract`, `multiply`, `divide`
//! - Weather (feature `weather`): `get_current_weather`, `search_cities`,
//!   `validate_config`
//!
//! ## Usage
//!
//! The server is typically run as an executable and configured in AI tools like Claude Desktop:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "toolhost": {
//!       "command": "/path/to/toolhost-mcp",
//!       "args": ["--tools", "all"],
//!       "env": { "OPENWEATHERMAP_API_KEY": "..." }
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! For testing or embedding, you can use the library API:
//!
//! ```no_run
//! use toolhost_mcp::{build_registry, McpServer, McpSession, ServerConfig, ToolSet};
//!
//! # async fn demo() -> toolhost_mcp::Result<()> {
//! let config = ServerConfig::default().with_tools(ToolSet::Calculator);
//! let registry = build_registry(&config)?;
//! let session = McpSession::new(registry, &config);
//! let mut server = McpServer::new(session);
//!
//! // Run the server (reads from stdin, writes to stdout)
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
#[cfg_attr(not(feature = "weather"), allow(dead_code))]
mod convert;
mod error;
pub mod invoker;
pub mod schema;
mod server;
mod session;
pub mod tools;
mod validate;

pub use config::{ServerConfig, ToolSet};
pub use error::{codes, HandlerError, McpError, Result, ValidationError};
pub use invoker::{CallError, CallErrorKind, CallResult, ToolInvoker};
pub use schema::{InputShape, ParamSpec, ParamType};
pub use server::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, McpServer, ToolCallResponse};
pub use session::{McpSession, SessionState, PROTOCOL_VERSION};
pub use tools::{build_registry, handler_fn, HandlerResult, ToolDef, ToolHandler, ToolRegistry};
pub use validate::validate_arguments;
