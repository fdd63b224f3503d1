use serde::Serialize;

use super::{auth_response, AuthError, AuthPayload, REGISTER_PATH};
use crate::HandymanClient;

impl HandymanClient {
    /// Create an account and start a session for it.
    ///
    /// The registration form is sent as-is, so its shape follows whatever the API expects.
    ///
    /// # Example
    /// ```rust,ignore
    /// #[derive(Serialize)]
    /// struct Registration<'a> {
    ///     email: &'a str,
    ///     password: &'a str,
    ///     full_name: &'a str,
    ///     role: Role,
    /// }
    ///
    /// let auth_data = client
    ///     .register(&Registration {
    ///         email: "ada@example.com",
    ///         password: "correct horse battery staple",
    ///         full_name: "Ada Lovelace",
    ///         role: Role::Homeowner,
    ///     })
    ///     .await?;
    /// ```
    pub async fn register<T: Serialize + ?Sized>(
        &self,
        registration: &T,
    ) -> Result<AuthPayload, AuthError> {
        let response = self.post(REGISTER_PATH).json(registration).send().await?;

        let payload = auth_response(response).await?;
        self.auth_store.apply(&payload);

        Ok(payload)
    }
}
