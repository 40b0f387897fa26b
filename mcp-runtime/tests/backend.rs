use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Map, Value, json};

use parseable_mcp_runtime::backend::SqlQuery;
use parseable_mcp_runtime::{
    Backend, BackendConnection, BackendError, McpServer, ParseableClient, ToolOutcome,
    ToolRegistry, TransportConfig,
};

const BASIC_ADMIN_ADMIN: &str = "Basic YWRtaW46YWRtaW4=";

#[derive(Clone, Default)]
struct Recorded {
    queries: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<String>>>,
    query_reply: Arc<Mutex<Value>>,
}

impl Recorded {
    fn note_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        self.auth.lock().unwrap().push(value);
    }
}

async fn list_streams(State(rec): State<Recorded>, headers: HeaderMap) -> Json<Value> {
    rec.note_auth(&headers);
    Json(json!([{ "name": "otellogs" }, { "name": "metrics" }]))
}

async fn schema(Path(stream): Path<String>) -> (StatusCode, Json<Value>) {
    if stream != "otellogs" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "stream not found" })),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "fields": [
                { "name": "body", "data_type": "Utf8" },
                { "name": "severity_number", "data_type": "Int64" },
                { "name": "p_timestamp", "data_type": { "Timestamp": ["Millisecond", null] } }
            ]
        })),
    )
}

async fn info(Path(_stream): Path<String>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "stream not found" })),
    )
}

async fn stats(Path(stream): Path<String>) -> Json<Value> {
    Json(json!({
        "stream": stream,
        "time": "2025-06-01T10:00:00Z",
        "ingestion": { "count": 1200, "size": 524288, "format": "json" },
        "storage": { "size": 65536, "format": "parquet" }
    }))
}

async fn about() -> Json<Value> {
    Json(json!({
        "version": "v2.3.0",
        "mode": "Standalone",
        "deploymentId": "01JTEST",
        "staging": "/parseable/staging"
    }))
}

async fn roles() -> Json<Value> {
    Json(json!({
        "admin": [{ "privilege": "admin" }],
        "reader": [{ "privilege": "reader", "resource": { "stream": "otellogs" } }]
    }))
}

async fn users() -> Json<Value> {
    Json(json!([
        { "id": "admin", "method": "native" },
        { "id": "alice", "method": "native" },
        { "id": "bob", "method": "oauth" }
    ]))
}

async fn query(
    State(rec): State<Recorded>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    rec.note_auth(&headers);
    rec.queries.lock().unwrap().push(body);
    Json(rec.query_reply.lock().unwrap().clone())
}

async fn spawn_parseable(query_reply: Value) -> (String, Recorded) {
    let recorded = Recorded::default();
    *recorded.query_reply.lock().unwrap() = query_reply;

    let app = Router::new()
        .route("/api/v1/logstream", get(list_streams))
        .route("/api/v1/logstream/{stream}/schema", get(schema))
        .route("/api/v1/logstream/{stream}/stats", get(stats))
        .route("/api/v1/logstream/{stream}/info", get(info))
        .route("/api/v1/about", get(about))
        .route("/api/v1/roles", get(roles))
        .route("/api/v1/users", get(users))
        .route("/api/v1/query", post(query))
        .with_state(recorded.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), recorded)
}

fn client_for(base_url: &str) -> ParseableClient {
    let connection =
        BackendConnection::new(base_url, "admin", "admin", TransportConfig::default()).unwrap();
    ParseableClient::new(connection).unwrap()
}

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn lists_stream_names_with_count() {
    let (url, recorded) = spawn_parseable(json!([])).await;
    let registry = ToolRegistry::new(client_for(&url));

    let outcome = registry
        .call("list_data_streams", &Map::new())
        .await
        .unwrap();
    assert_eq!(
        outcome.structured_content(),
        Some(&json!({ "streams": ["otellogs", "metrics"], "count": 2 }))
    );
    assert_eq!(
        recorded.auth.lock().unwrap().as_slice(),
        [BASIC_ADMIN_ADMIN.to_string()]
    );
}

#[tokio::test]
async fn empty_query_result_posts_camel_case_body() {
    let (url, recorded) = spawn_parseable(json!([])).await;
    let registry = ToolRegistry::new(client_for(&url));

    let outcome = registry
        .call(
            "query_data_stream",
            &args(json!({
                "query": "SELECT count(*) FROM otellogs",
                "streamName": "otellogs",
                "startTime": "2025-06-01T00:00:00+00:00",
                "endTime": "2025-06-01T01:00:00+00:00"
            })),
        )
        .await
        .unwrap();

    assert_eq!(
        outcome,
        ToolOutcome::Structured {
            summary: "Query successful".to_string(),
            payload: json!({ "rows": [], "count": 0 }),
        }
    );
    assert_eq!(
        recorded.queries.lock().unwrap().as_slice(),
        [json!({
            "query": "SELECT count(*) FROM otellogs",
            "streamName": "otellogs",
            "startTime": "2025-06-01T00:00:00+00:00",
            "endTime": "2025-06-01T01:00:00+00:00"
        })]
    );
    assert_eq!(
        recorded.auth.lock().unwrap().as_slice(),
        [BASIC_ADMIN_ADMIN.to_string()]
    );
}

#[tokio::test]
async fn query_rows_are_returned_in_order() {
    let (url, _) = spawn_parseable(json!([
        { "body": "first", "severity_number": 9 },
        { "body": "second", "severity_number": 17 }
    ]))
    .await;
    let rows = client_for(&url)
        .query(&SqlQuery {
            query: "SELECT body, severity_number FROM otellogs".to_string(),
            stream_name: "otellogs".to_string(),
            start_time: "2025-06-01T00:00:00Z".to_string(),
            end_time: "2025-06-01T01:00:00Z".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["body"], json!("first"));
    assert_eq!(rows[1]["severity_number"], json!(17));
}

#[tokio::test]
async fn non_array_query_reply_is_a_decode_error() {
    let (url, _) = spawn_parseable(json!({ "rows": "oops" })).await;
    let err = client_for(&url)
        .query(&SqlQuery {
            query: "SELECT 1".to_string(),
            stream_name: "otellogs".to_string(),
            start_time: "2025-06-01T00:00:00Z".to_string(),
            end_time: "2025-06-01T01:00:00Z".to_string(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::Decode { .. }), "{err:?}");
}

#[tokio::test]
async fn server_error_becomes_tool_error_with_body() {
    let (url, _) = spawn_parseable(json!([])).await;
    let registry = ToolRegistry::new(client_for(&url));

    let outcome = registry
        .call("get_data_stream_info", &args(json!({ "streamName": "ghost" })))
        .await
        .unwrap();
    match outcome {
        ToolOutcome::Error(message) => {
            assert!(message.starts_with("failed to get info: "), "{message}");
            assert!(message.contains("stream not found"), "{message}");
        }
        other => panic!("expected tool error, got {other:?}"),
    }
}

#[tokio::test]
async fn schema_is_keyed_by_field_name() {
    let (url, _) = spawn_parseable(json!([])).await;
    let registry = ToolRegistry::new(client_for(&url));

    let outcome = registry
        .call(
            "get_data_stream_schema",
            &args(json!({ "streamName": "otellogs" })),
        )
        .await
        .unwrap();
    let payload = outcome.structured_content().unwrap();
    assert_eq!(payload["stream"], json!("otellogs"));
    assert_eq!(payload["count"], json!(3));
    assert_eq!(payload["fields"]["severity_number"], json!("Int64"));
    assert_eq!(
        payload["fields"]["p_timestamp"],
        json!({ "Timestamp": ["Millisecond", null] })
    );

    let missing = registry
        .call(
            "get_data_stream_schema",
            &args(json!({ "streamName": "nope" })),
        )
        .await
        .unwrap();
    assert!(missing.is_error());
}

#[tokio::test]
async fn stats_keep_ingestion_and_storage_sections() {
    let (url, _) = spawn_parseable(json!([])).await;
    let registry = ToolRegistry::new(client_for(&url));

    let outcome = registry
        .call(
            "get_data_stream_stats",
            &args(json!({ "streamName": "otellogs" })),
        )
        .await
        .unwrap();
    let payload = outcome.structured_content().unwrap();
    assert_eq!(payload["ingestion"]["count"], json!(1200));
    assert_eq!(payload["storage"]["format"], json!("parquet"));
    assert_eq!(payload["stream"], json!("otellogs"));
}

#[tokio::test]
async fn about_is_stable_across_calls() {
    let (url, _) = spawn_parseable(json!([])).await;
    let registry = ToolRegistry::new(client_for(&url));

    let first = registry.call("get_about", &Map::new()).await.unwrap();
    let second = registry.call("get_about", &Map::new()).await.unwrap();
    assert_eq!(first, second);
    match first {
        ToolOutcome::Text(text) => {
            assert!(text.contains("version: v2.3.0"), "{text}");
            assert!(text.contains("mode: Standalone"), "{text}");
        }
        other => panic!("expected text, got {other:?}"),
    }
}

#[tokio::test]
async fn roles_and_users_are_reported() {
    let (url, _) = spawn_parseable(json!([])).await;
    let registry = ToolRegistry::new(client_for(&url));

    match registry.call("get_roles", &Map::new()).await.unwrap() {
        ToolOutcome::Text(text) => {
            let lines: Vec<&str> = text.lines().collect();
            assert_eq!(lines.len(), 2);
            assert!(lines[0].starts_with("admin: "));
            assert!(lines[1].starts_with("reader: "));
        }
        other => panic!("expected text, got {other:?}"),
    }

    let users = registry.call("get_users", &Map::new()).await.unwrap();
    let payload = users.structured_content().unwrap();
    assert_eq!(payload["count"], json!(3));
    assert_eq!(payload["users"][1]["id"], json!("alice"));
}

#[tokio::test]
async fn tools_call_over_jsonrpc_reaches_backend() {
    let (url, _) = spawn_parseable(json!([{ "n": 1 }])).await;
    let server = McpServer::new(ToolRegistry::new(client_for(&url)));

    let responses = server
        .handle_incoming_message(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "tools/call",
            "params": {
                "name": "query_data_stream",
                "arguments": {
                    "query": "SELECT n FROM otellogs",
                    "streamName": "otellogs",
                    "startTime": "2025-06-01T00:00:00Z",
                    "endTime": "2025-06-01T01:00:00Z"
                }
            }
        }))
        .await;
    assert_eq!(responses.len(), 1);
    let result = &responses[0]["result"];
    assert_eq!(result["structuredContent"], json!({ "rows": [{ "n": 1 }], "count": 1 }));
    assert_eq!(result["content"][0]["text"], json!("Query successful"));
    assert!(result.get("isError").is_none());
}
