//! Static client configuration.

use std::time::Duration;

use tillwise_auth::PermissionFallbackPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_SESSION_KEY: &str = "tillwise.session";

/// Configuration shared by the HTTP client and the session store.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL every relative request path is joined onto.
    pub api_base_url: String,
    pub request_timeout: Duration,
    /// Extra attempts for idempotent GETs after a network failure or timeout.
    pub retry_count: u32,
    pub retry_backoff: Duration,
    /// Storage key (file stem) of the persisted session.
    pub session_key: String,
    /// How long before expiry the proactive refresh fires.
    pub refresh_margin: Duration,
    pub permission_fallback: PermissionFallbackPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_millis(30_000),
            retry_count: 1,
            retry_backoff: Duration::from_millis(300),
            session_key: DEFAULT_SESSION_KEY.to_string(),
            refresh_margin: Duration::from_secs(60),
            permission_fallback: PermissionFallbackPolicy::Permissive,
        }
    }
}

impl ClientConfig {
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Self::default()
        }
    }

    /// Read configuration from `TILLWISE_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = lookup("TILLWISE_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.api_base_url);

        let request_timeout = parse_or("TILLWISE_REQUEST_TIMEOUT_MS", &lookup)
            .map(Duration::from_millis)
            .unwrap_or(defaults.request_timeout);

        let retry_count = parse_or("TILLWISE_RETRY_COUNT", &lookup).unwrap_or(defaults.retry_count);

        let retry_backoff = parse_or("TILLWISE_RETRY_BACKOFF_MS", &lookup)
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_backoff);

        let session_key = lookup("TILLWISE_SESSION_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.session_key);

        let refresh_margin = parse_or("TILLWISE_REFRESH_MARGIN_SECS", &lookup)
            .map(Duration::from_secs)
            .unwrap_or(defaults.refresh_margin);

        let permission_fallback = parse_or("TILLWISE_PERMISSION_FALLBACK", &lookup)
            .unwrap_or(defaults.permission_fallback);

        Self {
            api_base_url,
            request_timeout,
            retry_count,
            retry_backoff,
            session_key,
            refresh_margin,
            permission_fallback,
        }
    }

    /// Join a relative path onto the base URL.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn parse_or<T, F>(key: &str, lookup: &F) -> Option<T>
where
    T: core::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}
