//! Typed access to the Parseable REST surface.
//!
//! One method per endpoint. Every request carries the basic-auth credentials
//! of the shared [`BackendConnection`]; non-2xx answers come back as
//! [`BackendError::Status`] with the body kept verbatim.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::config::BackendConnection;
use crate::transport::TransportError;

const API_PREFIX: [&str; 2] = ["api", "v1"];
const LOGSTREAM: &str = "logstream";
const SQL_QUERY: &str = "query";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid request URL for {path}")]
    InvalidUrl { path: String },

    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Declared type of a schema field.
///
/// Parseable reports Arrow types either as a bare name (`"Utf8"`) or as a
/// nested structure (`{"Timestamp": ["Millisecond", null]}`). Anything else
/// is kept as-is under `Unrecognized`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataType {
    Named(String),
    Nested(Map<String, Value>),
    Unrecognized(Value),
}

impl DataType {
    fn missing() -> Self {
        DataType::Unrecognized(Value::Null)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamSchema {
    pub fields: BTreeMap<String, DataType>,
}

impl<'de> Deserialize<'de> for StreamSchema {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawSchema {
            #[serde(default)]
            fields: Vec<RawField>,
        }

        #[derive(Deserialize)]
        struct RawField {
            name: String,
            #[serde(default = "DataType::missing")]
            data_type: DataType,
        }

        let raw = RawSchema::deserialize(deserializer)?;
        Ok(StreamSchema {
            fields: raw
                .fields
                .into_iter()
                .map(|field| (field.name, field.data_type))
                .collect(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub ingestion: Map<String, Value>,
    pub storage: Map<String, Value>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Stream metadata. The typed fields check the shape of the reply; `raw`
/// keeps the backend's field set untouched for rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamInfo {
    pub created_at: Option<String>,
    pub first_event_at: Option<String>,
    pub latest_event_at: Option<String>,
    pub stream_type: Option<String>,
    pub log_source: Vec<LogSource>,
    pub raw: Map<String, Value>,
}

impl<'de> Deserialize<'de> for StreamInfo {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct TypedInfo {
            created_at: Option<String>,
            first_event_at: Option<String>,
            latest_event_at: Option<String>,
            stream_type: Option<String>,
            #[serde(default)]
            log_source: Vec<LogSource>,
        }

        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let typed = TypedInfo::deserialize(Value::Object(raw.clone()))
            .map_err(<D::Error as serde::de::Error>::custom)?;
        Ok(StreamInfo {
            created_at: typed.created_at,
            first_event_at: typed.first_event_at,
            latest_event_at: typed.latest_event_at,
            stream_type: typed.stream_type,
            log_source: typed.log_source,
            raw,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LogSource {
    pub log_source_format: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

pub type About = Map<String, Value>;
pub type Roles = BTreeMap<String, Vec<Value>>;
pub type Row = Map<String, Value>;
pub type User = Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlQuery {
    pub query: String,
    pub stream_name: String,
    pub start_time: String,
    pub end_time: String,
}

impl SqlQuery {
    fn to_body(&self) -> Value {
        json!({
            "query": self.query,
            "streamName": self.stream_name,
            "startTime": self.start_time,
            "endTime": self.end_time,
        })
    }
}

/// The operations the tool surface needs from a Parseable instance.
pub trait Backend: Send + Sync {
    fn list_streams(&self) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;

    fn schema(&self, stream: &str)
    -> impl Future<Output = Result<StreamSchema, BackendError>> + Send;

    fn stats(&self, stream: &str) -> impl Future<Output = Result<StreamStats, BackendError>> + Send;

    fn info(&self, stream: &str) -> impl Future<Output = Result<StreamInfo, BackendError>> + Send;

    fn about(&self) -> impl Future<Output = Result<About, BackendError>> + Send;

    fn roles(&self) -> impl Future<Output = Result<Roles, BackendError>> + Send;

    fn users(&self) -> impl Future<Output = Result<Vec<User>, BackendError>> + Send;

    fn query(&self, query: &SqlQuery)
    -> impl Future<Output = Result<Vec<Row>, BackendError>> + Send;
}

#[derive(Clone)]
pub struct ParseableClient {
    connection: Arc<BackendConnection>,
    http: reqwest::Client,
}

impl ParseableClient {
    pub fn new(connection: BackendConnection) -> Result<Self, TransportError> {
        let http = connection.transport.build_client()?;
        Ok(Self::with_http_client(connection, http))
    }

    pub fn with_http_client(connection: BackendConnection, http: reqwest::Client) -> Self {
        Self {
            connection: Arc::new(connection),
            http,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let invalid = || BackendError::InvalidUrl {
            path: segments.join("/"),
        };
        let mut url = Url::parse(&self.connection.base_url).map_err(|_| invalid())?;
        {
            let mut path = url.path_segments_mut().map_err(|_| invalid())?;
            path.pop_if_empty().extend(API_PREFIX).extend(segments);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, BackendError> {
        self.send_json(Method::GET, segments, None).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        tracing::debug!(method = %method, path = %path, "parseable request");

        let mut request = self.http.request(method, url).basic_auth(
            &self.connection.username,
            Some(&self.connection.password),
        );
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|source| BackendError::Transport {
                path: path.clone(),
                source,
            })?;
        let status = response.status();
        // The response is consumed here, so the connection is released on every path below.
        let bytes = response
            .bytes()
            .await
            .map_err(|source| BackendError::Transport {
                path: path.clone(),
                source,
            })?;

        if !status.is_success() {
            let body = String::from_utf8_lossy(&bytes).trim().to_string();
            tracing::warn!(status = status.as_u16(), path = %path, "parseable returned an error status");
            return Err(BackendError::Status { status, body });
        }

        serde_json::from_slice(&bytes).map_err(|source| {
            tracing::warn!(path = %path, error = %source, "failed to decode parseable response");
            BackendError::Decode { path, source }
        })
    }
}

#[derive(Deserialize)]
struct StreamEntry {
    name: String,
}

impl Backend for ParseableClient {
    async fn list_streams(&self) -> Result<Vec<String>, BackendError> {
        let entries: Vec<StreamEntry> = self.get_json(&[LOGSTREAM]).await?;
        Ok(entries.into_iter().map(|entry| entry.name).collect())
    }

    async fn schema(&self, stream: &str) -> Result<StreamSchema, BackendError> {
        self.get_json(&[LOGSTREAM, stream, "schema"]).await
    }

    async fn stats(&self, stream: &str) -> Result<StreamStats, BackendError> {
        self.get_json(&[LOGSTREAM, stream, "stats"]).await
    }

    async fn info(&self, stream: &str) -> Result<StreamInfo, BackendError> {
        self.get_json(&[LOGSTREAM, stream, "info"]).await
    }

    async fn about(&self) -> Result<About, BackendError> {
        self.get_json(&["about"]).await
    }

    async fn roles(&self) -> Result<Roles, BackendError> {
        self.get_json(&["roles"]).await
    }

    async fn users(&self) -> Result<Vec<User>, BackendError> {
        self.get_json(&["users"]).await
    }

    async fn query(&self, query: &SqlQuery) -> Result<Vec<Row>, BackendError> {
        self.send_json(Method::POST, &[SQL_QUERY], Some(query.to_body()))
            .await
    }
}
