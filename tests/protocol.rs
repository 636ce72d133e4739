//! End-to-end protocol tests driving the server over in-memory streams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use toolhost_mcp::{
    build_registry, codes, handler_fn, schema, CallErrorKind, CallResult, HandlerResult, McpServer,
    McpSession, ServerConfig, SessionState, ToolCallResponse, ToolDef, ToolRegistry, ToolSet,
};

const INIT: &str = r#"{"jsonrpc":"2.0","id":0,"method":"initialize","params":{"clientInfo":{"name":"test","version":"1.0"}}}"#;

/// Feed `lines` to a fresh server and return the parsed responses.
async fn exchange(registry: ToolRegistry, config: &ServerConfig, lines: &[&str]) -> Vec<Value> {
    let mut input = lines.join("\n");
    input.push('\n');

    let mut server = McpServer::new(McpSession::new(registry, config));
    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();
    assert_eq!(server.session().state(), SessionState::Terminated);

    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

async fn calculator(lines: &[&str]) -> Vec<Value> {
    let config = ServerConfig::default().with_tools(ToolSet::Calculator);
    exchange(build_registry(&config).unwrap(), &config, lines).await
}

fn envelope(response: &Value) -> CallResult {
    let wire: ToolCallResponse = serde_json::from_value(response["result"].clone()).unwrap();
    let result = wire.call_result().unwrap();
    assert_eq!(wire.is_error, !result.success);
    result
}

#[tokio::test]
async fn initialize_lists_tools_in_order() {
    let responses = calculator(&[INIT]).await;
    assert_eq!(responses.len(), 1);

    let result = &responses[0]["result"];
    assert_eq!(responses[0]["id"], 0);
    assert_eq!(result["protocolVersion"], "2024-11-05");
    let names: Vec<&str> = result["capabilities"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["add", "subtract", "multiply", "divide"]);
    assert_eq!(
        result["capabilities"]["tools"][0]["inputSchema"]["required"],
        json!(["a", "b"])
    );
}

#[tokio::test]
async fn calls_before_initialize_are_rejected() {
    let responses = calculator(&[
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":2}}}"#,
        INIT,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":2}}}"#,
    ])
    .await;

    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["error"]["code"], codes::NOT_INITIALIZED);
    assert_eq!(envelope(&responses[2]).payload, Some(json!({"result": 3})));
}

#[tokio::test]
async fn add_returns_integral_result() {
    let responses = calculator(&[
        INIT,
        r#"{"jsonrpc":"2.0","id":"call-1","method":"tools/call","params":{"name":"add","arguments":{"a":15,"b":27}}}"#,
    ])
    .await;

    assert_eq!(responses[1]["id"], "call-1");
    let result = envelope(&responses[1]);
    assert!(result.success);
    assert_eq!(result.payload, Some(json!({"result": 42})));
}

#[tokio::test]
async fn division_by_zero_keeps_session_alive() {
    let responses = calculator(&[
        INIT,
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"divide","arguments":{"a":1,"b":0}}}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
    ])
    .await;

    assert_eq!(responses[1]["result"]["isError"], true);
    let error = envelope(&responses[1]).error.unwrap();
    assert_eq!(error.kind, CallErrorKind::HandlerError);
    assert_eq!(error.message, "division by zero");

    assert_eq!(responses[2]["id"], 2);
    assert_eq!(responses[2]["result"], json!({"message": "pong"}));
}

#[tokio::test]
async fn validation_errors_are_protocol_level() {
    let responses = calculator(&[
        INIT,
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":1}}}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":"2"}}}"#,
        r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"add","arguments":{"a":1,"b":2,"c":3}}}"#,
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"add","arguments":[1,2]}}"#,
    ])
    .await;

    let kinds: Vec<&str> = responses[1..]
        .iter()
        .map(|r| {
            assert_eq!(r["error"]["code"], codes::INVALID_PARAMS);
            r["error"]["data"]["kind"].as_str().unwrap()
        })
        .collect();
    assert_eq!(
        kinds,
        ["MissingParameter", "TypeMismatch", "UnknownParameter", "InvalidArguments"]
    );
}

#[tokio::test]
async fn invalid_arguments_never_reach_the_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let spy = calls.clone();
    let mut registry = ToolRegistry::new();
    registry
        .register_with(
            ToolDef::new("spy", "counts calls", schema!(object { required: { "x": integer } })),
            handler_fn(move |_| {
                spy.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!({"ok": true})) }
            }),
        )
        .unwrap();

    let responses = exchange(
        registry,
        &ServerConfig::default(),
        &[
            INIT,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"spy","arguments":{}}}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"spy","arguments":{"x":1.5}}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"spy","arguments":{"x":2}}}"#,
        ],
    )
    .await;

    assert_eq!(responses[1]["error"]["data"]["kind"], "MissingParameter");
    assert_eq!(responses[2]["error"]["data"]["kind"], "TypeMismatch");
    assert!(envelope(&responses[3]).success);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_tool_and_method() {
    let responses = calculator(&[
        INIT,
        r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"sqrt","arguments":{}}}"#,
        r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#,
    ])
    .await;

    assert_eq!(responses[1]["error"]["code"], codes::METHOD_NOT_FOUND);
    assert_eq!(responses[1]["error"]["data"]["kind"], "ToolNotFound");
    assert_eq!(responses[2]["error"]["code"], codes::METHOD_NOT_FOUND);
}

#[tokio::test]
async fn hung_handler_times_out_and_next_request_is_served() {
    let mut registry = ToolRegistry::new();
    registry
        .register_with(
            ToolDef::new("hang", "never returns", schema!(object {})),
            handler_fn(|_| std::future::pending::<HandlerResult>()),
        )
        .unwrap();
    let config = ServerConfig::default().with_call_timeout(Duration::from_millis(50));

    let responses = exchange(
        registry,
        &config,
        &[
            INIT,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"hang"}}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#,
        ],
    )
    .await;

    let result = envelope(&responses[1]);
    assert_eq!(result.error_kind(), Some(CallErrorKind::Timeout));
    assert_eq!(responses[2]["result"]["tools"][0]["name"], "hang");
}

#[tokio::test]
async fn tools_list_is_stable() {
    let list = r#"{"jsonrpc":"2.0","id":5,"method":"tools/list"}"#;
    let responses = calculator(&[INIT, list, list]).await;
    assert_eq!(responses[1], responses[2]);
    assert_eq!(
        responses[1]["result"]["tools"],
        responses[0]["result"]["capabilities"]["tools"]
    );
}

#[tokio::test]
async fn malformed_lines_get_error_responses() {
    let responses = calculator(&[
        "{not json",
        r#"{"jsonrpc":"2.0","id":9}"#,
        "",
        INIT,
    ])
    .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0]["id"], Value::Null);
    assert_eq!(responses[0]["error"]["code"], codes::PARSE_ERROR);
    assert_eq!(responses[1]["id"], 9);
    assert_eq!(responses[1]["error"]["code"], codes::INVALID_REQUEST);
    assert!(responses[2]["result"].is_object());
}

#[tokio::test]
async fn notifications_are_not_answered() {
    let responses = calculator(&[
        INIT,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        r#"{"jsonrpc":"2.0","method":"tools/call","params":{"name":"nope"}}"#,
        r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
    ])
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1]["id"], 1);
}

#[tokio::test]
async fn null_id_gets_a_response() {
    let responses = calculator(&[INIT, r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#]).await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[1].get("id"), Some(&Value::Null));
    assert_eq!(responses[1]["result"], json!({"message": "pong"}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn blocking_handler_times_out_on_a_single_worker() {
    let mut registry = ToolRegistry::new();
    registry
        .register_with(
            ToolDef::new("block", "blocks its thread", schema!(object {})),
            handler_fn(|_| async {
                std::thread::sleep(Duration::from_millis(1500));
                Ok(json!({"done": true}))
            }),
        )
        .unwrap();
    let config = ServerConfig::default().with_call_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let responses = exchange(
        registry,
        &config,
        &[
            INIT,
            r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"block"}}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        ],
    )
    .await;

    assert_eq!(envelope(&responses[1]).error_kind(), Some(CallErrorKind::Timeout));
    assert_eq!(responses[2]["result"], json!({"message": "pong"}));
    assert!(started.elapsed() < Duration::from_millis(1000), "{:?}", started.elapsed());
}
