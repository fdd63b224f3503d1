use serde::Serialize;

use super::{auth_response, AuthError, AuthPayload, Role, ACTIVATE_ROLE_PATH};
use crate::HandymanClient;

#[derive(Serialize)]
struct ActivateRoleBody {
    role: Role,
}

impl HandymanClient {
    /// Switch the signed-in user to `role`, enabling it first if needed.
    ///
    /// The API answers with a new token pair scoped to the role, which replaces the stored one.
    ///
    /// # Example
    /// ```rust,ignore
    /// client.activate_role(Role::Handyman).await?;
    ///
    /// assert_eq!(
    ///     client.auth_store().state().active_role.as_deref(),
    ///     Some("handyman")
    /// );
    /// ```
    pub async fn activate_role(&self, role: Role) -> Result<AuthPayload, AuthError> {
        let response = self
            .post(ACTIVATE_ROLE_PATH)
            .json(&ActivateRoleBody { role })
            .send()
            .await?;

        let payload = auth_response(response).await?;
        self.auth_store.apply(&payload);

        Ok(payload)
    }
}
