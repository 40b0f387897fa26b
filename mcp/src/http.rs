use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use parseable_mcp_runtime::{McpServer, ParseableClient, RpcError, error_response};

const MCP_PATH: &str = "/mcp";

type SharedServer = Arc<McpServer<ParseableClient>>;

pub fn router(server: SharedServer) -> Router {
    Router::new()
        .route(MCP_PATH, post(mcp_post).get(mcp_get))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(server)
}

pub async fn serve(server: SharedServer, addr: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        path = MCP_PATH,
        "MCP server listening"
    );
    axum::serve(listener, router(server)).await
}

async fn mcp_post(State(server): State<SharedServer>, body: Bytes) -> Response {
    let incoming: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "rejected unparseable MCP request");
            return (
                StatusCode::OK,
                Json(error_response(Value::Null, RpcError::parse_error())),
            )
                .into_response();
        }
    };

    let mut responses = server.handle_incoming_message(incoming).await;

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 {
        return (StatusCode::OK, Json(responses.remove(0))).into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}

// Server-initiated streams are not offered.
async fn mcp_get() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
