use std::fmt;

use thiserror::Error;

use crate::transport::{TransportConfig, parse_bool_flag};

pub const PARSEABLE_URL_ENV: &str = "PARSEABLE_URL";
pub const PARSEABLE_USERNAME_ENV: &str = "PARSEABLE_USERNAME";
pub const PARSEABLE_PASSWORD_ENV: &str = "PARSEABLE_PASSWORD";
pub const UNSECURE_ENV: &str = "UNSECURE";

pub const DEFAULT_PARSEABLE_URL: &str = "http://localhost:8000";
pub const DEFAULT_PARSEABLE_USERNAME: &str = "admin";
pub const DEFAULT_PARSEABLE_PASSWORD: &str = "admin";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid Parseable base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
}

/// Values supplied on the command line. `None` means the flag was not given.
#[derive(Clone, Debug, Default)]
pub struct ConnectionFlags {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub unsecure: bool,
}

/// Everything needed to talk to one Parseable instance.
///
/// Built once at startup and handed to [`crate::backend::ParseableClient`];
/// nothing mutates it afterwards.
#[derive(Clone)]
pub struct BackendConnection {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub transport: TransportConfig,
}

impl BackendConnection {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        transport: TransportConfig,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url.into().trim().to_string();
        let parsed = reqwest::Url::parse(&base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl {
                url: base_url,
                reason: "URL cannot carry a path".to_string(),
            });
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            transport,
        })
    }

    /// Resolves each setting as environment variable, then flag, then default.
    pub fn from_env(flags: &ConnectionFlags) -> Result<Self, ConfigError> {
        Self::resolve(flags, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(flags: &ConnectionFlags, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = resolve_setting(
            lookup(PARSEABLE_URL_ENV),
            flags.url.as_deref(),
            DEFAULT_PARSEABLE_URL,
        );
        let username = resolve_setting(
            lookup(PARSEABLE_USERNAME_ENV),
            flags.username.as_deref(),
            DEFAULT_PARSEABLE_USERNAME,
        );
        let password = resolve_setting(
            lookup(PARSEABLE_PASSWORD_ENV),
            flags.password.as_deref(),
            DEFAULT_PARSEABLE_PASSWORD,
        );

        let skip_tls_verify = match non_empty(lookup(UNSECURE_ENV)) {
            Some(raw) => parse_bool_flag(&raw).unwrap_or(false),
            None => flags.unsecure,
        };

        Self::new(
            base_url,
            username,
            password,
            TransportConfig { skip_tls_verify },
        )
    }
}

impl fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConnection")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("transport", &self.transport)
            .finish()
    }
}

/// Environment value wins over the flag, the flag over the default.
/// Empty or whitespace-only values count as unset; anything else is kept verbatim.
pub fn resolve_setting(env_value: Option<String>, flag: Option<&str>, default: &str) -> String {
    if let Some(value) = non_empty(env_value) {
        return value;
    }
    flag.filter(|value| !value.trim().is_empty())
        .unwrap_or(default)
        .to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
