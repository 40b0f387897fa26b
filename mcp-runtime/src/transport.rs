use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Outbound TLS policy. Certificate validation stays on unless explicitly skipped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportConfig {
    pub skip_tls_verify: bool,
}

impl TransportConfig {
    /// Absent or unparseable signals keep verification enabled.
    pub fn from_signal(raw: Option<&str>) -> Self {
        Self {
            skip_tls_verify: raw.and_then(parse_bool_flag).unwrap_or(false),
        }
    }

    pub fn build_client(&self) -> Result<reqwest::Client, TransportError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("parseable-mcp/", env!("CARGO_PKG_VERSION")));
        if self.skip_tls_verify {
            tracing::warn!(
                "UNSECURE is set: outbound HTTP client will skip TLS certificate verification"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder.build()?)
    }
}

/// Accepts `1/t/true` and `0/f/false` in any letter case.
pub fn parse_bool_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}
