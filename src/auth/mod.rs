use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::RequestError;

pub mod activate_role;
pub mod login;
pub mod logout;
pub mod refresh;
pub mod register;

pub(crate) const LOGIN_PATH: &str = "/auth/login";
pub(crate) const REGISTER_PATH: &str = "/auth/register";
pub(crate) const REFRESH_PATH: &str = "/auth/refresh";
pub(crate) const LOGOUT_PATH: &str = "/auth/logout";
pub(crate) const ACTIVATE_ROLE_PATH: &str = "/auth/activate-role";

/// Whether a 401 from `path` must be handed back as-is instead of triggering a refresh.
///
/// These endpoints answer 401 for bad credentials, not for an expired session, and
/// refreshing on them would loop.
pub(crate) fn bypasses_refresh(path: &str) -> bool {
    [LOGIN_PATH, REFRESH_PATH, LOGOUT_PATH]
        .iter()
        .any(|auth_path| path.contains(auth_path))
}

/// The session data returned by every successful login, registration, refresh and role switch.
///
/// The `Debug` implementation redacts both tokens.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AuthPayload {
    /// New bearer credential.
    pub access_token: String,
    /// New refresh credential.
    pub refresh_token: String,
    /// Role the user is now acting as.
    pub active_role: String,
    /// Onboarding step the app should show next.
    pub next_action: String,
    /// Whether the user's email address has been verified.
    pub email_verified: bool,
}

impl fmt::Debug for AuthPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthPayload")
            .field("access_token", &"***REDACTED***")
            .field("refresh_token", &"***REDACTED***")
            .field("active_role", &self.active_role)
            .field("next_action", &self.next_action)
            .field("email_verified", &self.email_verified)
            .finish()
    }
}

/// The `{ "data": ... }` envelope every mobile API response is wrapped in.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: Option<T>,
}

#[derive(Serialize)]
pub(crate) struct RefreshTokenBody<'a> {
    pub refresh_token: &'a str,
}

/// The two roles a marketplace user can act as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Posts jobs and hires handymen.
    Homeowner,
    /// Applies to jobs and receives direct offers.
    Handyman,
}

impl Role {
    /// The wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Homeowner => "homeowner",
            Self::Handyman => "handyman",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents errors that can occur while logging in, registering or switching roles.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Communication with the API was successful,
    /// but returned a [400 Bad Request]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/400")
    /// or [401 Unauthorized]("https://developer.mozilla.org/en-US/docs/Web/HTTP/Status/401") response to a login.
    ///
    /// Tip: The credentials you provided may be incorrect.
    #[error("Authentication failed: Invalid Credentials. Given email and/or password is wrong.")]
    InvalidCredentials,
    /// The API rejected the submitted fields.
    #[error("Authentication failed: {0}")]
    Validation(String),
    /// The API answered with a success status, but without the expected session data.
    #[error("Authentication failed due to an unexpected response: {0}")]
    MalformedResponse(String),
    /// The request itself failed, or the API answered with an unhandled status.
    #[error("Authentication failed: {0}")]
    Request(RequestError),
}

impl From<RequestError> for AuthError {
    fn from(error: RequestError) -> Self {
        Self::Request(error)
    }
}

/// Turns the response of an auth endpoint into its session data.
///
/// Statuses specific to one flow (bad credentials on login) are handled by the caller
/// before this.
pub(crate) async fn auth_response(response: reqwest::Response) -> Result<AuthPayload, AuthError> {
    let status = response.status();

    if status.is_success() {
        let envelope = response
            .json::<DataEnvelope<AuthPayload>>()
            .await
            .map_err(|error| AuthError::MalformedResponse(error.to_string()))?;

        return envelope
            .data
            .ok_or_else(|| AuthError::MalformedResponse("missing `data` field".to_string()));
    }

    match RequestError::from_response(response).await {
        RequestError::Http {
            status: 400 | 409 | 422,
            message,
        } => Err(AuthError::Validation(
            message.unwrap_or_else(|| status.to_string()),
        )),
        error => Err(AuthError::Request(error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_login_refresh_and_logout_bypass_refresh() {
        assert!(bypasses_refresh("/auth/login"));
        assert!(bypasses_refresh("/auth/refresh"));
        assert!(bypasses_refresh("/auth/logout"));
        assert!(!bypasses_refresh("/auth/register"));
        assert!(!bypasses_refresh("/auth/activate-role"));
        assert!(!bypasses_refresh("/jobs/42/applications"));
    }

    #[test]
    fn role_serializes_to_wire_name() {
        assert_eq!(
            serde_json::to_value(Role::Handyman).unwrap(),
            serde_json::json!("handyman")
        );
        assert_eq!(Role::Homeowner.to_string(), "homeowner");
    }

    #[test]
    fn payload_debug_redacts_tokens() {
        let payload = AuthPayload {
            access_token: "a-secret".to_string(),
            refresh_token: "r-secret".to_string(),
            active_role: "handyman".to_string(),
            next_action: "none".to_string(),
            email_verified: false,
        };

        let output = format!("{payload:?}");

        assert!(!output.contains("secret"));
        assert!(output.contains("handyman"));
    }
}
