//! Client configuration.
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HANDYMAN_API_URL` | Base URL of the API server | `http://localhost:8000` |
//! | `HANDYMAN_API_TIMEOUT_MS` | Timeout applied to every request, in milliseconds | `30000` |

use std::time::Duration;

use reqwest::{Method, StatusCode};
use thiserror::Error;

/// Environment variable holding the API base URL.
pub const API_URL_ENV: &str = "HANDYMAN_API_URL";

/// Environment variable holding the request timeout in milliseconds.
pub const API_TIMEOUT_MS_ENV: &str = "HANDYMAN_API_TIMEOUT_MS";

/// Base URL used when [`API_URL_ENV`] is not set.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Timeout used when [`API_TIMEOUT_MS_ENV`] is not set.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Path prefix shared by every mobile API endpoint.
pub const API_PREFIX: &str = "/api/v1/mobile";

const DEFAULT_RETRY_LIMIT: u32 = 2;
const DEFAULT_BACKOFF: Duration = Duration::from_millis(300);
const DEFAULT_RETRY_STATUS_CODES: [u16; 5] = [408, 500, 502, 503, 504];

/// Errors raised while building a [`ClientConfig`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The base URL does not use the `http` or `https` scheme.
    #[error("Invalid base URL `{0}`: must start with http:// or https://")]
    InvalidBaseUrl(String),
    /// The timeout value is not a positive integer number of milliseconds.
    #[error("Invalid timeout `{0}`: expected a positive number of milliseconds")]
    InvalidTimeout(String),
}

/// Which requests are retried, how often, and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts allowed after the first one.
    pub limit: u32,
    /// Methods eligible for retry.
    pub methods: Vec<Method>,
    /// Response statuses considered transient.
    pub status_codes: Vec<StatusCode>,
    /// Delay before the first retry; doubled on each subsequent one.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RETRY_LIMIT,
            methods: vec![Method::GET],
            status_codes: DEFAULT_RETRY_STATUS_CODES
                .iter()
                .filter_map(|code| StatusCode::from_u16(*code).ok())
                .collect(),
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            limit: 0,
            ..Self::default()
        }
    }

    /// Returns the same policy with a different base backoff.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub(crate) fn allows_method(&self, method: &Method) -> bool {
        self.limit > 0 && self.methods.contains(method)
    }

    pub(crate) fn retries_status(&self, status: StatusCode) -> bool {
        self.status_codes.contains(&status)
    }

    /// Delay before retry number `attempt` (starting at 1).
    pub(crate) fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor)
    }
}

/// Settings shared by every request a [`crate::HandymanClient`] sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub(crate) base_url: String,
    pub(crate) timeout: Duration,
    pub(crate) retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration targeting `base_url` with the default timeout and retry policy.
    ///
    /// # Example
    /// ```rust,ignore
    /// let config = ClientConfig::new("https://api.example.com")?;
    /// ```
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: validate_base_url(base_url)?,
            ..Self::default()
        })
    }

    /// Reads [`API_URL_ENV`] and [`API_TIMEOUT_MS_ENV`], falling back to the defaults
    /// for whichever is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(base_url) = lookup(API_URL_ENV) {
            config.base_url = validate_base_url(&base_url)?;
        }

        if let Some(raw) = lookup(API_TIMEOUT_MS_ENV) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|millis| *millis > 0)
                .ok_or_else(|| ConfigError::InvalidTimeout(raw.clone()))?;
            config.timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }

    /// Overrides the timeout applied to every request.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The server's base URL, without trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The default request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The retry policy.
    #[must_use]
    pub const fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Absolute URL of an API path such as `/jobs`.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{API_PREFIX}{path}", self.base_url)
        } else {
            format!("{}{API_PREFIX}/{path}", self.base_url)
        }
    }
}

fn validate_base_url(base_url: &str) -> Result<String, ConfigError> {
    let trimmed_url = base_url.trim().trim_end_matches('/');

    if trimmed_url.starts_with("http://") || trimmed_url.starts_with("https://") {
        Ok(trimmed_url.to_string())
    } else {
        Err(ConfigError::InvalidBaseUrl(base_url.to_string()))
    }
}
