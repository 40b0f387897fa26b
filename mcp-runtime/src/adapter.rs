//! Shapes backend results into MCP tool-call results.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::backend::{About, BackendError, Roles, Row, StreamInfo, StreamSchema, StreamStats, User};
use crate::util::to_pretty_json;

const QUERY_SUMMARY: &str = "Query successful";

/// Result of one tool invocation before it is framed for the protocol.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolOutcome {
    /// Plain text, usually flattened `key: value` lines.
    Text(String),
    /// A JSON document, sent both as pretty text and as structured content.
    Json(Value),
    /// A JSON payload with a short narrative summary as its text.
    Structured { summary: String, payload: Value },
    Error(String),
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Error(_))
    }

    pub fn structured_content(&self) -> Option<&Value> {
        match self {
            ToolOutcome::Json(value) => Some(value),
            ToolOutcome::Structured { payload, .. } => Some(payload),
            ToolOutcome::Text(_) | ToolOutcome::Error(_) => None,
        }
    }

    /// MCP `CallToolResult` object.
    pub fn to_call_result(&self) -> Value {
        let text = match self {
            ToolOutcome::Text(text) | ToolOutcome::Error(text) => text.clone(),
            ToolOutcome::Json(value) => to_pretty_json(value),
            ToolOutcome::Structured { summary, .. } => summary.clone(),
        };
        let mut result = json!({
            "content": [{ "type": "text", "text": text }],
        });
        if let Some(structured) = self.structured_content() {
            result["structuredContent"] = structured.clone();
        }
        if self.is_error() {
            result["isError"] = json!(true);
        }
        result
    }
}

fn failure(label: &str, err: BackendError) -> ToolOutcome {
    tracing::error!(operation = label, error = %err, "backend call failed");
    ToolOutcome::Error(format!("{label}: {err}"))
}

fn encode<T: Serialize>(label: &str, value: &T) -> Result<Value, ToolOutcome> {
    serde_json::to_value(value).map_err(|err| ToolOutcome::Error(format!("{label}: {err}")))
}

/// One `key: value` line per top-level field, keys sorted.
pub fn flatten_to_text(map: &Map<String, Value>) -> String {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}: {s}"),
            other => format!("{key}: {other}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn text_from<T: Serialize>(label: &str, value: &T) -> ToolOutcome {
    match encode(label, value) {
        Ok(Value::Object(map)) => ToolOutcome::Text(flatten_to_text(&map)),
        Ok(other) => ToolOutcome::Text(other.to_string()),
        Err(outcome) => outcome,
    }
}

pub fn stream_list(result: Result<Vec<String>, BackendError>) -> ToolOutcome {
    match result {
        Ok(streams) => {
            let count = streams.len();
            ToolOutcome::Json(json!({ "streams": streams, "count": count }))
        }
        Err(err) => failure("failed to list streams", err),
    }
}

pub fn schema(stream: &str, result: Result<StreamSchema, BackendError>) -> ToolOutcome {
    const LABEL: &str = "failed to get schema";
    match result {
        Ok(schema) => match encode(LABEL, &schema.fields) {
            Ok(fields) => ToolOutcome::Json(json!({
                "stream": stream,
                "fields": fields,
                "count": schema.fields.len(),
            })),
            Err(outcome) => outcome,
        },
        Err(err) => failure(LABEL, err),
    }
}

pub fn stats(result: Result<StreamStats, BackendError>) -> ToolOutcome {
    const LABEL: &str = "failed to get stats";
    match result {
        Ok(stats) => encode(LABEL, &stats).map_or_else(|outcome| outcome, ToolOutcome::Json),
        Err(err) => failure(LABEL, err),
    }
}

pub fn info(result: Result<StreamInfo, BackendError>) -> ToolOutcome {
    match result {
        Ok(info) => ToolOutcome::Text(flatten_to_text(&info.raw)),
        Err(err) => failure("failed to get info", err),
    }
}

pub fn about(result: Result<About, BackendError>) -> ToolOutcome {
    match result {
        Ok(about) => ToolOutcome::Text(flatten_to_text(&about)),
        Err(err) => failure("failed to get about", err),
    }
}

pub fn roles(result: Result<Roles, BackendError>) -> ToolOutcome {
    const LABEL: &str = "failed to get roles";
    match result {
        Ok(roles) => text_from(LABEL, &roles),
        Err(err) => failure(LABEL, err),
    }
}

pub fn users(result: Result<Vec<User>, BackendError>) -> ToolOutcome {
    match result {
        Ok(users) => {
            let count = users.len();
            ToolOutcome::Json(json!({ "users": users, "count": count }))
        }
        Err(err) => failure("failed to get users", err),
    }
}

pub fn query_rows(result: Result<Vec<Row>, BackendError>) -> ToolOutcome {
    match result {
        Ok(rows) => {
            let count = rows.len();
            ToolOutcome::Structured {
                summary: QUERY_SUMMARY.to_string(),
                payload: json!({ "rows": rows, "count": count }),
            }
        }
        Err(err) => failure("query failed", err),
    }
}
