use super::{RefreshTokenBody, LOGOUT_PATH};
use crate::HandymanClient;

impl HandymanClient {
    /// End the session.
    ///
    /// The API is asked to revoke the refresh token, but the local session is cleared
    /// whatever it answers, along with the query cache.
    ///
    /// # Example
    /// ```rust,ignore
    /// client.logout().await;
    ///
    /// assert!(!client.auth_store().is_authenticated());
    /// ```
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.auth_store.refresh_token() {
            let revoked = self
                .post(LOGOUT_PATH)
                .json(&RefreshTokenBody {
                    refresh_token: &refresh_token,
                })
                .send()
                .await;

            match revoked {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    tracing::debug!(status = response.status().as_u16(), "logout was not acknowledged");
                }
                Err(error) => tracing::debug!(%error, "logout request failed"),
            }
        }

        self.clear_session();
    }
}
