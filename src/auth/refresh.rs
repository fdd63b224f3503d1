use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;

use super::{AuthPayload, DataEnvelope, RefreshTokenBody, REFRESH_PATH};
use crate::error::RequestError;
use crate::HandymanClient;

type Outcome = watch::Receiver<Option<bool>>;

/// Ensures at most one token refresh is in flight per client.
///
/// The first caller runs the refresh; callers arriving while it runs wait for the same
/// outcome. The in-flight slot is emptied when the refresh settles, including when the
/// refresh future panics or is dropped, in which case waiting callers observe a failure.
#[derive(Debug, Default)]
pub(crate) struct RefreshCoordinator {
    in_flight: Mutex<Option<Outcome>>,
}

enum Turn {
    Leader(watch::Sender<Option<bool>>),
    Follower(Outcome),
    Settled,
}

/// Empties the in-flight slot on drop.
struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<Outcome>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl RefreshCoordinator {
    pub(crate) fn is_refreshing(&self) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs `refresh` unless one is already in flight, and returns the shared outcome.
    pub(crate) async fn run<F, Fut>(&self, refresh: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        self.run_unless(|| false, refresh).await
    }

    /// Like [`RefreshCoordinator::run`], but a caller about to start a new refresh first
    /// asks `settled` whether an earlier refresh already renewed the session, and reports
    /// success without refreshing again if so.
    ///
    /// `settled` runs under the slot lock. A finished refresh has stored its tokens before
    /// releasing the slot, so it cannot be missed.
    pub(crate) async fn run_unless<S, F, Fut>(&self, settled: S, refresh: F) -> bool
    where
        S: FnOnce() -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        // Check-and-set without crossing an await point.
        let turn = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(outcome) => Turn::Follower(outcome.clone()),
                None if settled() => Turn::Settled,
                None => {
                    let (sender, receiver) = watch::channel(None);
                    *slot = Some(receiver);
                    Turn::Leader(sender)
                }
            }
        };

        match turn {
            Turn::Leader(sender) => {
                let _guard = InFlightGuard {
                    slot: &self.in_flight,
                };

                let succeeded = refresh().await;
                sender.send_replace(Some(succeeded));
                succeeded
            }
            Turn::Follower(mut outcome) => {
                tracing::debug!("joining in-flight token refresh");

                let succeeded = outcome
                    .wait_for(Option::is_some)
                    .await
                    .is_ok_and(|settled| *settled == Some(true));

                tracing::debug!(succeeded, "in-flight token refresh settled");
                succeeded
            }
            Turn::Settled => {
                tracing::debug!("session already renewed, not refreshing");
                true
            }
        }
    }
}

impl HandymanClient {
    /// Exchanges the stored refresh token for a new token pair.
    ///
    /// Concurrent calls, including the ones made internally when requests come back
    /// with a 401, share a single request to the API. Returns whether the session was
    /// renewed. On failure the session has been cleared, unless it was ended or replaced
    /// while the refresh was in flight.
    ///
    /// # Example
    /// ```rust,ignore
    /// // On app resume
    /// if !client.refresh().await {
    ///     show_login_screen();
    /// }
    /// ```
    pub async fn refresh(&self) -> bool {
        self.refresh_coordinator.run(|| self.refresh_session()).await
    }

    /// Whether a token refresh is currently in flight.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.refresh_coordinator.is_refreshing()
    }

    /// The uncoordinated refresh: never fails, reports the outcome instead.
    pub(crate) async fn refresh_session(&self) -> bool {
        let Some(refresh_token) = self.auth_store.refresh_token() else {
            tracing::warn!("no refresh token available, ending session");
            self.clear_session();
            return false;
        };

        tracing::debug!("refreshing access token");

        match self.request_token_refresh(&refresh_token).await {
            Ok(payload) => {
                // A logout or login while the request was in flight wins over its result.
                let applied = self
                    .auth_store
                    .apply_if_refresh_token(&refresh_token, &payload);
                if !applied {
                    tracing::debug!("session changed during token refresh, discarding new tokens");
                }
                applied
            }
            Err(error) => {
                tracing::warn!(%error, "token refresh failed, ending session");
                self.clear_session_holding(&refresh_token);
                false
            }
        }
    }

    async fn request_token_refresh(&self, refresh_token: &str) -> Result<AuthPayload, RequestError> {
        let timeout = self.config.timeout;

        let response = self
            .reqwest_client
            .post(self.config.endpoint(REFRESH_PATH))
            .timeout(timeout)
            .json(&RefreshTokenBody { refresh_token })
            .send()
            .await
            .map_err(|error| RequestError::from_reqwest(&error, timeout))?;

        if !response.status().is_success() {
            return Err(RequestError::from_response(response).await);
        }

        let envelope = response
            .json::<DataEnvelope<AuthPayload>>()
            .await
            .map_err(|error| RequestError::Parse(error.to_string()))?;

        envelope
            .data
            .ok_or_else(|| RequestError::Parse("missing `data` field".to_string()))
    }
}
