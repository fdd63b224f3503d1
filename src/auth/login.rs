use serde::Serialize;

use super::{auth_response, AuthError, AuthPayload, LOGIN_PATH};
use crate::HandymanClient;

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

impl HandymanClient {
    /// Authenticate with **email** and **password**.
    ///
    /// On success, the tokens and session metadata are stored and used for subsequent requests.
    ///
    /// # Example
    /// ```rust,ignore
    /// let auth_data = client
    ///     .login("YOUR_EMAIL", "YOUR_PASSWORD")
    ///     .await?;
    ///
    /// println!("Next step: {}", auth_data.next_action);
    /// ```
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthPayload, AuthError> {
        let response = self
            .post(LOGIN_PATH)
            .json(&Credentials { email, password })
            .send()
            .await?;

        if matches!(
            response.status(),
            reqwest::StatusCode::BAD_REQUEST | reqwest::StatusCode::UNAUTHORIZED
        ) {
            return Err(AuthError::InvalidCredentials);
        }

        let payload = auth_response(response).await?;
        self.auth_store.apply(&payload);

        Ok(payload)
    }
}
