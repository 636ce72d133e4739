//! Tool invocation with timeout and failure capture.
//!
//! Handlers run on the blocking pool, away from the session's worker, so a
//! handler that panics or never returns stays contained. Whatever happens,
//! the caller gets a [`CallResult`] back.

use std::any::Any;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::HandlerError;
use crate::tools::ToolRegistry;

/// Category of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallErrorKind {
    /// The handler reported a failure or panicked.
    HandlerError,
    /// The handler exceeded the call timeout.
    Timeout,
    /// The tool is registered but no handler is bound.
    HandlerMissing,
}

/// Failure half of a [`CallResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallError {
    /// Failure category
    pub kind: CallErrorKind,
    /// Human-readable cause
    pub message: String,
    /// Optional structured context from the handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

/// Envelope returned for every tool call.
///
/// Exactly one of `payload` and `error` is set, matching `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResult {
    /// Whether the handler produced a payload
    pub success: bool,
    /// Handler output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<JsonValue>,
    /// Failure description otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<CallError>,
}

impl CallResult {
    /// Successful call.
    pub fn ok(payload: JsonValue) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed call.
    pub fn failed(kind: CallErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(CallError {
                kind,
                message: message.into(),
                details: None,
            }),
        }
    }

    fn from_handler_error(err: HandlerError) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(CallError {
                kind: CallErrorKind::HandlerError,
                message: err.message,
                details: err.details,
            }),
        }
    }

    /// Failure category, if the call failed.
    pub fn error_kind(&self) -> Option<CallErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Dispatches validated calls to bound handlers.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    timeout: Duration,
}

impl ToolInvoker {
    /// Create an invoker with the given per-call timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke the handler bound to `name` with normalized arguments.
    ///
    /// The handler future is driven on the blocking pool, so a handler that
    /// blocks its thread cannot stall the caller or the timer. On timeout the
    /// handler is cancelled at its next await point; a handler blocked in
    /// synchronous code keeps its pool thread until it returns.
    pub async fn invoke(
        &self,
        registry: &ToolRegistry,
        name: &str,
        args: Map<String, JsonValue>,
    ) -> CallResult {
        let Some(handler) = registry.handler(name) else {
            warn!(tool = name, "No handler bound for registered tool");
            return CallResult::failed(
                CallErrorKind::HandlerMissing,
                format!("no handler is bound for tool '{name}'"),
            );
        };

        let started = Instant::now();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let runtime = Handle::current();
        let mut task = tokio::task::spawn_blocking(move || {
            runtime.block_on(async move {
                tokio::select! {
                    result = handler.call(args) => Some(result),
                    _ = cancel_rx => None,
                }
            })
        });

        let result = match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Some(Ok(payload)))) => CallResult::ok(payload),
            Ok(Ok(Some(Err(err)))) => {
                debug!(tool = name, error = %err, "Handler reported failure");
                CallResult::from_handler_error(err)
            }
            Ok(Ok(None)) => {
                CallResult::failed(CallErrorKind::HandlerError, "handler task was cancelled")
            }
            Ok(Err(join_err)) => {
                let message = if join_err.is_panic() {
                    format!("handler panicked: {}", panic_message(join_err.into_panic()))
                } else {
                    "handler task was cancelled".to_string()
                };
                warn!(tool = name, %message, "Handler task failed");
                CallResult::failed(CallErrorKind::HandlerError, message)
            }
            Err(_) => {
                // Receiver may already be gone if the handler just finished
                let _ = cancel_tx.send(());
                warn!(
                    tool = name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Handler timed out"
                );
                CallResult::failed(
                    CallErrorKind::Timeout,
                    format!("tool '{name}' did not finish within {:?}", self.timeout),
                )
            }
        };

        debug!(
            tool = name,
            success = result.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tool call finished"
        );
        result
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use crate::tools::{handler_fn, HandlerResult, ToolDef, ToolHandler};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct Exploding;

    #[async_trait]
    impl ToolHandler for Exploding {
        async fn call(&self, _args: Map<String, JsonValue>) -> HandlerResult {
            panic!("exploded")
        }
    }

    struct Sleeper(Duration);

    #[async_trait]
    impl ToolHandler for Sleeper {
        async fn call(&self, _args: Map<String, JsonValue>) -> HandlerResult {
            std::thread::sleep(self.0);
            Ok(json!({"slept": true}))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register_with(
                ToolDef::new("echo", "echo", schema!(object {})),
                handler_fn(|args| async move { Ok(JsonValue::Object(args)) }),
            )
            .unwrap();
        registry
            .register_with(
                ToolDef::new("fail", "fail", schema!(object {})),
                handler_fn(|_| async {
                    Err(HandlerError::new("boom").with_details(json!({"code": "X"})))
                }),
            )
            .unwrap();
        registry
            .register_with(
                ToolDef::new("panic", "panic", schema!(object {})),
                Arc::new(Exploding),
            )
            .unwrap();
        registry
            .register_with(
                ToolDef::new("hang", "hang", schema!(object {})),
                handler_fn(|_| std::future::pending::<HandlerResult>()),
            )
            .unwrap();
        registry
            .register(ToolDef::new("unbound", "unbound", schema!(object {})))
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn success_wraps_payload() {
        let invoker = ToolInvoker::new(Duration::from_secs(1));
        let mut args = Map::new();
        args.insert("a".to_string(), json!(1));
        let result = invoker.invoke(&registry(), "echo", args).await;
        assert_eq!(result, CallResult::ok(json!({"a": 1})));
    }

    #[tokio::test]
    async fn handler_failure_keeps_details() {
        let invoker = ToolInvoker::new(Duration::from_secs(1));
        let result = invoker.invoke(&registry(), "fail", Map::new()).await;
        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.kind, CallErrorKind::HandlerError);
        assert_eq!(error.message, "boom");
        assert_eq!(error.details, Some(json!({"code": "X"})));
    }

    #[tokio::test]
    async fn panic_becomes_handler_error() {
        let invoker = ToolInvoker::new(Duration::from_secs(1));
        let result = invoker.invoke(&registry(), "panic", Map::new()).await;
        let error = result.error.unwrap();
        assert_eq!(error.kind, CallErrorKind::HandlerError);
        assert!(error.message.contains("exploded"), "{}", error.message);
    }

    #[tokio::test]
    async fn hung_handler_times_out() {
        let timeout = Duration::from_millis(50);
        let invoker = ToolInvoker::new(timeout);
        let started = Instant::now();
        let result = invoker.invoke(&registry(), "hang", Map::new()).await;
        assert_eq!(result.error_kind(), Some(CallErrorKind::Timeout));
        assert!(started.elapsed() < timeout + Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn blocking_handler_cannot_starve_the_timer() {
        let mut registry = registry();
        registry
            .register_with(
                ToolDef::new("sleep", "sleep", schema!(object {})),
                Arc::new(Sleeper(Duration::from_millis(1500))),
            )
            .unwrap();

        let invoker = ToolInvoker::new(Duration::from_millis(100));
        let started = Instant::now();
        let result = invoker.invoke(&registry, "sleep", Map::new()).await;
        let elapsed = started.elapsed();

        assert_eq!(result.error_kind(), Some(CallErrorKind::Timeout));
        assert!(
            elapsed < invoker.timeout() + Duration::from_millis(700),
            "timeout of {:?} took {:?}",
            invoker.timeout(),
            elapsed
        );

        // The single worker is still free for the next call
        let result = invoker.invoke(&registry, "echo", Map::new()).await;
        assert!(result.success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn blocking_handler_within_budget_succeeds() {
        let mut registry = registry();
        registry
            .register_with(
                ToolDef::new("nap", "nap", schema!(object {})),
                Arc::new(Sleeper(Duration::from_millis(20))),
            )
            .unwrap();
        let invoker = ToolInvoker::new(Duration::from_secs(2));
        let result = invoker.invoke(&registry, "nap", Map::new()).await;
        assert_eq!(result, CallResult::ok(json!({"slept": true})));
    }

    #[tokio::test]
    async fn unbound_tool_reports_handler_missing() {
        let invoker = ToolInvoker::new(Duration::from_secs(1));
        let result = invoker.invoke(&registry(), "unbound", Map::new()).await;
        assert_eq!(result.error_kind(), Some(CallErrorKind::HandlerMissing));
    }

    #[test]
    fn envelope_serialization_omits_absent_half() {
        let ok = serde_json::to_value(CallResult::ok(json!({"result": 42}))).unwrap();
        assert_eq!(ok, json!({"success": true, "payload": {"result": 42}}));

        let failed =
            serde_json::to_value(CallResult::failed(CallErrorKind::Timeout, "slow")).unwrap();
        assert_eq!(
            failed,
            json!({"success": false, "error": {"kind": "Timeout", "message": "slow"}})
        );
    }
}
