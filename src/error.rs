//! Errors returned by the client, grouped by where the failure happened.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::auth::AuthError;
pub use crate::config::ConfigError;
pub use crate::session::storage::StorageError;

/// Represents errors when talking to the handyman API.
///
/// Every variant is produced where the HTTP layer fails, so callers can match on the
/// kind of failure instead of inspecting messages.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The request did not complete within its timeout.
    #[error("Timeout: the API did not answer within {timeout_ms} ms.")]
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
    /// The API could not be reached (DNS, refused connection, dropped socket...).
    #[error("Network Error: could not reach the API. {0}")]
    Network(String),
    /// Communication with the API was successful, but it answered with a non-success status.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("the API rejected the request"))]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The error message sent by the API, if it sent one.
        message: Option<String>,
    },
    /// The response could not be parsed into the expected data structure.
    #[error("Parse Error: could not parse the response into the expected data structure. {0}")]
    Parse(String),
    /// The request could not be built, e.g. its body failed to serialize.
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),
    /// Unhandled error.
    ///
    /// Usually emitted when something unexpected happened, and isn't handled correctly by this crate.
    #[error("Unhandled Error: {0}")]
    Unknown(String),
}

impl RequestError {
    /// Maps a transport error onto the typed variants.
    pub(crate) fn from_reqwest(error: &reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else if error.is_connect() || error.is_request() {
            Self::Network(error.to_string())
        } else if error.is_builder() {
            Self::InvalidRequest(error.to_string())
        } else if error.is_decode() || error.is_body() {
            Self::Parse(error.to_string())
        } else {
            Self::Unknown(error.to_string())
        }
    }

    /// Builds an [`RequestError::Http`] from a non-success response, keeping the server's message.
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let message = response
            .json::<ErrorResponse>()
            .await
            .ok()
            .and_then(ErrorResponse::into_message);

        Self::Http { status, message }
    }

    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network(_))
    }

    /// The HTTP status, for [`RequestError::Http`].
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// A short message suitable for showing to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout { .. } => "The request timed out. Please try again.".to_string(),
            Self::Network(_) => {
                "Unable to connect. Please check your internet connection.".to_string()
            }
            Self::Http {
                message: Some(message),
                ..
            } => message.clone(),
            Self::Http { status: 401, .. } => "Your session has expired. Please log in again.".to_string(),
            Self::Http { status: 403, .. } => {
                "You don't have permission to do that.".to_string()
            }
            Self::Http { status: 404, .. } => "We couldn't find what you were looking for.".to_string(),
            Self::Http { status, .. } if *status >= 500 => {
                "Something went wrong on our side. Please try again later.".to_string()
            }
            Self::Http { .. } => "The request could not be completed.".to_string(),
            Self::Parse(_) | Self::InvalidRequest(_) | Self::Unknown(_) => {
                "An unexpected error occurred.".to_string()
            }
        }
    }
}

/// Error body returned by the API.
///
/// Validation failures put a list of objects in `detail`, other failures a string.
#[derive(Deserialize, Debug)]
pub(crate) struct ErrorResponse {
    #[serde(default)]
    detail: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorResponse {
    fn into_message(self) -> Option<String> {
        match self.detail {
            Some(serde_json::Value::String(detail)) => Some(detail),
            Some(serde_json::Value::Array(items)) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(serde_json::Value::as_str))
                    .collect();

                if messages.is_empty() {
                    self.message
                } else {
                    Some(messages.join("; "))
                }
            }
            _ => self.message,
        }
    }
}
