use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use reqwest::Response;

use super::ApiRequest;
use crate::error::RequestError;
use crate::HandymanClient;

impl HandymanClient {
    /// Sends `request`, retrying transient failures as the retry policy allows.
    ///
    /// The last response or error is returned once the budget is spent.
    pub(super) async fn send_with_retry(
        &self,
        request: &ApiRequest<'_>,
        access_token: Option<&str>,
    ) -> Result<Response, RequestError> {
        let policy = &self.config.retry;
        let retryable = policy.allows_method(&request.method);
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let mut attempt = 0;

        loop {
            let outcome = self.dispatch(request, access_token, timeout).await;

            let should_retry = retryable
                && attempt < policy.limit
                && match &outcome {
                    Ok(response) => policy.retries_status(response.status()),
                    Err(error) => error.is_transient(),
                };

            if !should_retry {
                return outcome;
            }

            attempt += 1;

            let delay = outcome
                .as_ref()
                .ok()
                .and_then(retry_after)
                .map_or_else(|| policy.delay_for(attempt), |delay| delay.min(timeout));

            match &outcome {
                Ok(response) => tracing::debug!(
                    method = %request.method,
                    path = %request.path,
                    status = response.status().as_u16(),
                    attempt,
                    ?delay,
                    "retrying request"
                ),
                Err(error) => tracing::debug!(
                    method = %request.method,
                    path = %request.path,
                    %error,
                    attempt,
                    ?delay,
                    "retrying request"
                ),
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// The delay requested by a `Retry-After: <seconds>` header.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
