use serde_json::{Map, Value, json};
use tokio::io::{self, BufReader};

pub mod adapter;
pub mod backend;
pub mod config;
pub mod tools;
pub mod transport;
mod util;

pub use adapter::ToolOutcome;
pub use backend::{Backend, BackendError, ParseableClient};
pub use config::{BackendConnection, ConfigError, ConnectionFlags, resolve_setting};
pub use tools::ToolRegistry;
pub use transport::{TransportConfig, TransportError};

use util::{Framing, read_message, write_message};

const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
const MCP_SERVER_NAME: &str = "parseable-mcp";
const SERVER_INSTRUCTIONS: &str = "You are a virtual assistant for Parseable, working on monitoring and observability tasks. \
Start with list_data_streams to find stream names, then get_data_stream_schema before writing SQL for query_data_stream. \
Always pass startTime and endTime in ISO 8601. Keep queries as specific as possible. \
If you lack information (stream name, time range, field), ask instead of guessing.";

/// JSON-RPC front end for a [`ToolRegistry`].
///
/// Holds no per-session state, so one instance can serve concurrent requests.
pub struct McpServer<B> {
    registry: ToolRegistry<B>,
}

impl<B: Backend> McpServer<B> {
    pub fn new(registry: ToolRegistry<B>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry<B> {
        &self.registry
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        tracing::info!(server = MCP_SERVER_NAME, "MCP server running over stdio");

        let mut reader = BufReader::new(io::stdin());
        let mut stdout = io::stdout();

        loop {
            let incoming = read_message(&mut reader)
                .await
                .map_err(|e| format!("Failed to read MCP message: {e}"))?;
            let Some(incoming) = incoming else {
                tracing::info!("stdin closed, shutting down");
                break;
            };

            let responses = match incoming.payload {
                Ok(message) => self.handle_incoming_message(message).await,
                Err(parse_error) => {
                    tracing::warn!(error = %parse_error, "received invalid JSON");
                    vec![error_response(Value::Null, RpcError::parse_error())]
                }
            };
            for response in responses {
                write_message(&mut stdout, incoming.framing, &response)
                    .await
                    .map_err(|e| format!("Failed to write MCP response: {e}"))?;
            }
        }

        Ok(())
    }

    /// Handles one JSON-RPC message or batch and returns the replies to send.
    /// Notifications produce no reply.
    pub async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let envelopes = match incoming {
            Value::Array(batch) if batch.is_empty() => {
                return vec![error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                )];
            }
            Value::Array(batch) => batch,
            single => vec![single],
        };

        let mut replies = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            replies.extend(self.reply_to(envelope).await);
        }
        replies
    }

    async fn reply_to(&self, envelope: Value) -> Option<Value> {
        let Value::Object(mut envelope) = envelope else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        let id = envelope.remove("id");
        if envelope.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Some(error_response(
                id.unwrap_or(Value::Null),
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        // Without a method this is a client response; the server issues no requests.
        let Some(Value::String(method)) = envelope.remove("method") else {
            return None;
        };
        let params = envelope.remove("params").unwrap_or(Value::Null);

        match id {
            Some(id) => Some(match self.handle_request(&method, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            }),
            None => {
                handle_notification(&method);
                None
            }
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => {
                tracing::debug!(method, "unknown method");
                Err(RpcError::method_not_found(method))
            }
        }
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self
            .registry
            .definitions()
            .iter()
            .map(|tool| tool.to_value())
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let outcome = self
            .registry
            .call(name, &args)
            .await
            .map_err(|err| RpcError::invalid_params(err.to_string()))?;
        Ok(outcome.to_call_result())
    }
}

fn handle_notification(method: &str) {
    match method {
        "notifications/initialized" => tracing::info!("client confirmed initialization"),
        "notifications/cancelled" => tracing::debug!("client cancelled a request"),
        other => tracing::debug!(method = other, "ignoring unknown notification"),
    }
}

fn initialize_payload() -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {
                "listChanged": false
            }
        },
        "serverInfo": {
            "name": MCP_SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        },
        "instructions": SERVER_INSTRUCTIONS
    })
}

#[derive(Debug)]
pub struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
        }
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn error_response(id: Value, error: RpcError) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    })
}
