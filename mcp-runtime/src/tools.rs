//! The closed set of tools exposed over MCP and the dispatch from a validated
//! tool call to the matching [`Backend`] operation.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::adapter::{self, ToolOutcome};
use crate::backend::{Backend, SqlQuery};

pub const LIST_DATA_STREAMS: &str = "list_data_streams";
pub const GET_DATA_STREAM_SCHEMA: &str = "get_data_stream_schema";
pub const GET_DATA_STREAM_STATS: &str = "get_data_stream_stats";
pub const GET_DATA_STREAM_INFO: &str = "get_data_stream_info";
pub const GET_ABOUT: &str = "get_about";
pub const GET_ROLES: &str = "get_roles";
pub const GET_USERS: &str = "get_users";
pub const QUERY_DATA_STREAM: &str = "query_data_stream";

#[derive(Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
    /// Substituted when the argument is absent or blank.
    pub default: Option<&'static str>,
}

impl ParamSpec {
    const fn required(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            required: true,
            default: None,
        }
    }
}

#[derive(Debug)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl ToolDefinition {
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in self.params {
            let mut schema = json!({
                "type": "string",
                "description": param.description,
            });
            if let Some(default) = param.default {
                schema["default"] = json!(default);
            }
            properties.insert(param.name.to_string(), schema);
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|param| param.required)
            .map(|param| param.name)
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn to_value(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }
}

const STREAM_NAME: ParamSpec = ParamSpec::required(
    "streamName",
    "Name of the data stream, e.g. 'otellogs'. The stream must exist in Parseable.",
);

static TOOL_DEFINITIONS: [ToolDefinition; 8] = [
    ToolDefinition {
        name: QUERY_DATA_STREAM,
        description: "Execute a SQL query against a data stream in Parseable. All fields are required. \
All times must be in ISO 8601 format.\n\n\
Returns a structured result {\"rows\": [...], \"count\": N} where each row is an object keyed by column name.",
        params: &[
            ParamSpec::required("query", "SQL query to run"),
            ParamSpec::required("streamName", "Name of the data stream (table)"),
            ParamSpec::required(
                "startTime",
                "Query start time in ISO 8601 (format: yyyy-MM-ddTHH:mm:ss+hh:mm)",
            ),
            ParamSpec::required(
                "endTime",
                "Query end time in ISO 8601 (format: yyyy-MM-ddTHH:mm:ss+hh:mm)",
            ),
        ],
    },
    ToolDefinition {
        name: LIST_DATA_STREAMS,
        description: "List all available data streams in Parseable. \
Use this tool to discover which data streams exist before executing queries. \
Each stream is a table-like collection of data and must be referenced by exact name in query_data_stream. \
Returns JSON {\"streams\": [names], \"count\": N}.",
        params: &[],
    },
    ToolDefinition {
        name: GET_DATA_STREAM_SCHEMA,
        description: "Get the field schema for a Parseable data stream. Calls /api/v1/logstream/<streamName>/schema.\n\n\
Returns JSON {\"stream\": name, \"fields\": {field_name: data_type}, \"count\": N}. \
A data_type is either a type name (e.g. \"Utf8\", \"Int64\", \"Boolean\") or a nested structure \
such as {\"Timestamp\": [\"Millisecond\", null]}.",
        params: &[STREAM_NAME],
    },
    ToolDefinition {
        name: GET_DATA_STREAM_STATS,
        description: "Get ingestion and storage statistics for a Parseable data stream. \
Calls /api/v1/logstream/<streamName>/stats.\n\n\
Returns JSON with:\n\
- stream: data stream name\n\
- time: stats timestamp (ISO 8601)\n\
- ingestion: count, size, format, lifetime_count, lifetime_size, deleted_count, deleted_size\n\
- storage: size, format, lifetime_size, deleted_size",
        params: &[STREAM_NAME],
    },
    ToolDefinition {
        name: GET_DATA_STREAM_INFO,
        description: "Get info for a Parseable data stream by name. Calls /api/v1/logstream/<streamName>/info.\n\n\
Returns text lines 'key: value' with:\n\
- createdAt, firstEventAt, latestEventAt: ISO 8601 timestamps\n\
- streamType: type of data stream (e.g. UserDefined)\n\
- logSource: array of {log_source_format, fields}\n\
- telemetryType: logs, metrics or traces",
        params: &[STREAM_NAME],
    },
    ToolDefinition {
        name: GET_ABOUT,
        description: "Get information about the Parseable instance. Calls /api/v1/about.\n\n\
Returns text lines 'key: value' including version, uiVersion, commit, deploymentId, updateAvailable, \
latestVersion, llmActive, llmProvider, oidcActive, license, mode (Standalone or Cluster), staging, \
hotTier, grpcPort, store and analytics.",
        params: &[],
    },
    ToolDefinition {
        name: GET_ROLES,
        description: "Get the Parseable roles used for RBAC. Calls /api/v1/roles.\n\n\
Returns text lines 'role: [privileges]'. A privilege is one of admin, editor, reader, writer or ingestor; \
reader, writer and ingestor privileges are always bound to at least one resource, typically a dataset.",
        params: &[],
    },
    ToolDefinition {
        name: GET_USERS,
        description: "Get all users of the Parseable instance with their authentication method and role assignments. \
Calls /api/v1/users.\n\n\
Returns JSON {\"users\": [...], \"count\": N}. Each user has id, username, method (native or oidc), \
email, picture, roles (role name -> privilege grants), group_roles and user_groups.",
        params: &[],
    },
];

pub fn tool_definitions() -> &'static [ToolDefinition] {
    &TOOL_DEFINITIONS
}

pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    TOOL_DEFINITIONS.iter().find(|tool| tool.name == name)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{}", missing_message(.0))]
    Missing(Vec<&'static str>),
    #[error("'{0}' must be a string")]
    NotAString(&'static str),
}

fn missing_message(fields: &[&str]) -> String {
    match fields {
        [single] => format!("missing required field: {single}"),
        many => format!("missing required fields: {}", many.join(", ")),
    }
}

/// String arguments after validation and default substitution.
#[derive(Debug, Default)]
pub struct ToolArgs {
    values: BTreeMap<&'static str, String>,
}

impl ToolArgs {
    #[cfg(test)]
    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn take(&mut self, name: &str) -> String {
        self.values.remove(name).unwrap_or_default()
    }
}

pub fn resolve_arguments(
    tool: &ToolDefinition,
    args: &Map<String, Value>,
) -> Result<ToolArgs, ValidationError> {
    let mut resolved = ToolArgs::default();
    let mut missing = Vec::new();

    for param in tool.params {
        let provided = match args.get(param.name) {
            None | Some(Value::Null) => None,
            Some(Value::String(v)) if v.trim().is_empty() => None,
            Some(Value::String(v)) => Some(v.clone()),
            Some(_) => return Err(ValidationError::NotAString(param.name)),
        };
        match (provided, param.default) {
            (Some(value), _) => {
                resolved.values.insert(param.name, value);
            }
            (None, Some(default)) => {
                resolved.values.insert(param.name, default.to_string());
            }
            (None, None) if param.required => missing.push(param.name),
            (None, None) => {}
        }
    }

    if missing.is_empty() {
        Ok(resolved)
    } else {
        Err(ValidationError::Missing(missing))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown tool: {0}")]
pub struct UnknownTool(pub String);

pub struct ToolRegistry<B> {
    backend: B,
}

impl<B: Backend> ToolRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn definitions(&self) -> &'static [ToolDefinition] {
        tool_definitions()
    }

    /// Validates `args` against the tool's parameters and runs it.
    ///
    /// Validation failures become tool errors and never reach the backend.
    pub async fn call(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<ToolOutcome, UnknownTool> {
        let tool = find_tool(name).ok_or_else(|| UnknownTool(name.to_string()))?;

        let mut args = match resolve_arguments(tool, args) {
            Ok(args) => args,
            Err(err) => {
                tracing::warn!(tool = tool.name, error = %err, "rejected tool call");
                return Ok(ToolOutcome::Error(err.to_string()));
            }
        };

        tracing::info!(tool = tool.name, "calling tool");
        Ok(self.dispatch(tool.name, &mut args).await)
    }

    async fn dispatch(&self, name: &'static str, args: &mut ToolArgs) -> ToolOutcome {
        let backend = &self.backend;
        match name {
            LIST_DATA_STREAMS => adapter::stream_list(backend.list_streams().await),
            GET_DATA_STREAM_SCHEMA => {
                let stream = args.take("streamName");
                let result = backend.schema(&stream).await;
                adapter::schema(&stream, result)
            }
            GET_DATA_STREAM_STATS => adapter::stats(backend.stats(&args.take("streamName")).await),
            GET_DATA_STREAM_INFO => adapter::info(backend.info(&args.take("streamName")).await),
            GET_ABOUT => adapter::about(backend.about().await),
            GET_ROLES => adapter::roles(backend.roles().await),
            GET_USERS => adapter::users(backend.users().await),
            QUERY_DATA_STREAM => {
                let query = SqlQuery {
                    query: args.take("query"),
                    stream_name: args.take("streamName"),
                    start_time: args.take("startTime"),
                    end_time: args.take("endTime"),
                };
                adapter::query_rows(backend.query(&query).await)
            }
            other => ToolOutcome::Error(format!("tool '{other}' has no handler")),
        }
    }
}
