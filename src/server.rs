//! JSON-RPC wire types and the stdio transport loop.
//!
//! One JSON message per line in each direction. Requests are processed
//! strictly in order: the next line is not read until the previous response
//! has been written and flushed.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::error::{McpError, Result};
use crate::invoker::CallResult;
use crate::session::McpSession;

/// JSON-RPC version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// An incoming JSON-RPC request or notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Must be "2.0"
    pub jsonrpc: String,
    /// Correlation id; absent for notifications. An explicit `null` is kept
    /// as `Some(Null)` and still gets a response.
    #[serde(
        default,
        deserialize_with = "present_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<JsonValue>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: JsonValue,
}

impl JsonRpcRequest {
    /// Build a request with an id.
    pub fn new(id: impl Into<JsonValue>, method: &str, params: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.to_string(),
            params,
        }
    }

    /// Build a notification (no id, never answered).
    pub fn notification(method: &str, params: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }

    /// Whether this message expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

// Only called when the member exists, so `null` maps to `Some(Null)`
fn present_id<'de, D>(deserializer: D) -> std::result::Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Structured context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// An outgoing JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Echoed request id, `null` when it could not be recovered
    pub id: JsonValue,
    /// Result on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Error on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response from a protocol error.
    pub fn from_error(id: JsonValue, err: &McpError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: err.code(),
                message: err.to_string(),
                data: err.data(),
            }),
        }
    }
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Tool name
    pub name: String,
    /// Raw arguments, validated against the tool's input shape
    #[serde(default)]
    pub arguments: JsonValue,
}

/// Content block in a tool result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Plain text
    Text {
        /// The text
        text: String,
    },
}

/// Result of `tools/call` as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    /// Content blocks; a single text block holding the JSON envelope
    pub content: Vec<ToolContent>,
    /// Mirrors `!success` of the envelope
    #[serde(rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResponse {
    /// Wrap an envelope. `isError` always agrees with `success`.
    pub fn from_call_result(result: &CallResult) -> Result<Self> {
        Ok(Self {
            content: vec![ToolContent::Text {
                text: serde_json::to_string_pretty(result)?,
            }],
            is_error: !result.success,
        })
    }

    /// Decode the envelope carried in the first text block.
    pub fn call_result(&self) -> Result<CallResult> {
        let text = self
            .content
            .iter()
            .map(|ToolContent::Text { text }| text)
            .next()
            .ok_or_else(|| McpError::Internal("tool response has no content".to_string()))?;
        Ok(serde_json::from_str(text)?)
    }
}

/// Decode one line into a request, or an error response to send back.
fn decode_line(line: &[u8]) -> std::result::Result<JsonRpcRequest, JsonRpcResponse> {
    let value: JsonValue = serde_json::from_slice(line).map_err(|e| {
        JsonRpcResponse::from_error(JsonValue::Null, &McpError::Parse(e.to_string()))
    })?;

    let id = match value.get("id") {
        Some(id @ (JsonValue::String(_) | JsonValue::Number(_))) => id.clone(),
        _ => JsonValue::Null,
    };

    let request: JsonRpcRequest = serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::from_error(id.clone(), &McpError::InvalidRequest(e.to_string()))
    })?;

    if request.jsonrpc != JSONRPC_VERSION {
        return Err(JsonRpcResponse::from_error(
            id,
            &McpError::InvalidRequest(format!(
                "unsupported jsonrpc version '{}'",
                request.jsonrpc
            )),
        ));
    }
    Ok(request)
}

async fn write_message<W>(writer: &mut W, response: &JsonRpcResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// MCP server: drives one session over one byte stream.
pub struct McpServer {
    session: McpSession,
}

impl McpServer {
    /// Create a server around a session.
    pub fn new(session: McpSession) -> Self {
        Self { session }
    }

    /// The session being served.
    pub fn session(&self) -> &McpSession {
        &self.session
    }

    /// Serve stdin/stdout until EOF.
    pub async fn run(&mut self) -> Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let writer = tokio::io::stdout();
        self.serve(reader, writer).await
    }

    /// Serve an arbitrary stream pair until EOF.
    ///
    /// Returns `Ok(())` on end of input. A read or write failure terminates the
    /// session and is returned.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!("MCP server ready");
        let mut line = Vec::new();

        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => {
                    info!("Input closed, terminating session");
                    self.session.terminate();
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    error!(error = %e, "Failed to read from input stream");
                    self.session.terminate();
                    return Err(e.into());
                }
            }

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let response = match decode_line(&line) {
                Ok(request) => {
                    debug!(method = %request.method, id = ?request.id, "Received message");
                    self.session.handle(request).await
                }
                Err(response) => {
                    warn!(
                        error = ?response.error.as_ref().map(|e| &e.message),
                        "Rejected malformed message"
                    );
                    Some(response)
                }
            };

            if let Some(response) = response {
                if let Err(e) = write_message(&mut writer, &response).await {
                    error!(error = %e, "Failed to write response");
                    self.session.terminate();
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::invoker::CallErrorKind;
    use serde_json::json;

    #[test]
    fn parse_error_has_null_id() {
        let response = decode_line(b"{not json").unwrap_err();
        assert_eq!(response.id, JsonValue::Null);
        assert_eq!(response.error.unwrap().code, codes::PARSE_ERROR);
    }

    #[test]
    fn invalid_request_recovers_id() {
        let response = decode_line(br#"{"jsonrpc":"2.0","id":7}"#).unwrap_err();
        assert_eq!(response.id, json!(7));
        assert_eq!(response.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[test]
    fn wrong_version_is_invalid_request() {
        let response = decode_line(br#"{"jsonrpc":"1.0","id":"a","method":"ping"}"#).unwrap_err();
        assert_eq!(response.id, json!("a"));
        assert_eq!(response.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[test]
    fn decodes_request_with_trailing_newline() {
        let request =
            decode_line(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\r\n").unwrap();
        assert_eq!(request.method, "ping");
        assert_eq!(request.id, Some(json!(1)));
        assert_eq!(request.params, JsonValue::Null);
    }

    #[test]
    fn notification_has_no_id() {
        let request =
            decode_line(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(request.is_notification());
    }

    #[test]
    fn null_id_is_not_a_notification() {
        let request = decode_line(br#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#).unwrap();
        assert_eq!(request.id, Some(JsonValue::Null));
        assert!(!request.is_notification());

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire.get("id"), Some(&JsonValue::Null));
    }

    #[test]
    fn tool_response_flag_matches_envelope() {
        let ok = ToolCallResponse::from_call_result(&CallResult::ok(json!({"result": 1}))).unwrap();
        assert!(!ok.is_error);

        let failed = ToolCallResponse::from_call_result(&CallResult::failed(
            CallErrorKind::HandlerError,
            "division by zero",
        ))
        .unwrap();
        assert!(failed.is_error);

        let wire = serde_json::to_value(&failed).unwrap();
        assert_eq!(wire["isError"], true);
        assert_eq!(wire["content"][0]["type"], "text");
    }

    #[test]
    fn envelope_round_trips_through_text_content() {
        let payload = json!({"city": "Madrid", "temperature": 21.5, "tags": ["sunny"]});
        let response =
            ToolCallResponse::from_call_result(&CallResult::ok(payload.clone())).unwrap();
        let wire = serde_json::to_string(&response).unwrap();

        let decoded: ToolCallResponse = serde_json::from_str(&wire).unwrap();
        let result = decoded.call_result().unwrap();
        assert!(result.success);
        assert_eq!(result.payload, Some(payload));
    }
}
