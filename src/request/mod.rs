use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{bypasses_refresh, DataEnvelope};
use crate::error::RequestError;
use crate::HandymanClient;

mod retry;

type FormFactory = Arc<dyn Fn() -> Form + Send + Sync>;

/// A request body that can be rebuilt for every attempt.
pub(crate) enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Multipart(FormFactory),
    /// The body failed to serialize; reported when the request is sent.
    Invalid(String),
}

/// A request to the mobile API, built with [`HandymanClient::request`] or one of its shorthands.
///
/// The request carries the current access token, recovers once from an expired session
/// and retries transient failures according to the client's [`crate::RetryPolicy`].
pub struct ApiRequest<'a> {
    client: &'a HandymanClient,
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
    timeout: Option<Duration>,
}

impl HandymanClient {
    /// Starts a request to `path`, relative to `{base_url}/api/v1/mobile`.
    ///
    /// # Example
    /// ```rust,ignore
    /// #[derive(Deserialize)]
    /// struct Job {
    ///     id: i64,
    ///     title: String,
    /// }
    ///
    /// let jobs: Vec<Job> = client
    ///     .request(Method::GET, "/jobs")
    ///     .query_param("status", "open")
    ///     .call_data()
    ///     .await?;
    /// ```
    #[must_use]
    pub fn request(&self, method: Method, path: impl Into<String>) -> ApiRequest<'_> {
        ApiRequest {
            client: self,
            method,
            path: path.into(),
            query: vec![],
            body: RequestBody::Empty,
            timeout: None,
        }
    }

    /// Starts a `GET` request.
    #[must_use]
    pub fn get(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::GET, path)
    }

    /// Starts a `POST` request.
    #[must_use]
    pub fn post(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::POST, path)
    }

    /// Starts a `PUT` request.
    #[must_use]
    pub fn put(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::PUT, path)
    }

    /// Starts a `PATCH` request.
    #[must_use]
    pub fn patch(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::PATCH, path)
    }

    /// Starts a `DELETE` request.
    #[must_use]
    pub fn delete(&self, path: impl Into<String>) -> ApiRequest<'_> {
        self.request(Method::DELETE, path)
    }
}

impl ApiRequest<'_> {
    /// Sends `body` as JSON.
    ///
    /// # Example
    /// ```rust,ignore
    /// client
    ///     .post("/jobs")
    ///     .json(&NewJob { title: "Fix the sink", budget: 120 })
    ///     .call_data::<Job>()
    ///     .await?;
    /// ```
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.body = match serde_json::to_value(body) {
            Ok(value) => RequestBody::Json(value),
            Err(error) => RequestBody::Invalid(error.to_string()),
        };
        self
    }

    /// Sends `fields` URL-encoded.
    #[must_use]
    pub fn form(mut self, fields: &[(&str, &str)]) -> Self {
        self.body = RequestBody::Form(
            fields
                .iter()
                .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
                .collect(),
        );
        self
    }

    /// Sends a multipart form, e.g. for photo uploads.
    ///
    /// A multipart body is consumed when sent, so it is given as a function building it;
    /// the function runs once per attempt.
    ///
    /// # Example
    /// ```rust,ignore
    /// let photo = std::fs::read("./leak.jpg")?;
    ///
    /// client
    ///     .post("/jobs/42/daily-reports")
    ///     .multipart(move || {
    ///         let part = Part::bytes(photo.clone()).file_name("leak.jpg");
    ///         Form::new().text("notes", "Replaced the seal").part("photo", part)
    ///     })
    ///     .send()
    ///     .await?;
    /// ```
    #[must_use]
    pub fn multipart<F>(mut self, build: F) -> Self
    where
        F: Fn() -> Form + Send + Sync + 'static,
    {
        self.body = RequestBody::Multipart(Arc::new(build));
        self
    }

    /// Appends search parameters.
    #[must_use]
    pub fn query(mut self, params: &[(&str, &str)]) -> Self {
        self.query.extend(
            params
                .iter()
                .map(|(key, value)| ((*key).to_string(), (*value).to_string())),
        );
        self
    }

    /// Appends a single search parameter.
    #[must_use]
    pub fn query_param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Overrides the client's timeout for this request only.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends the request and returns the final response, whatever its status.
    ///
    /// Errors are only returned when no response was obtained at all.
    pub async fn send(self) -> Result<Response, RequestError> {
        self.client.execute(&self).await
    }

    /// Sends the request and deserializes a successful response body into `T`.
    ///
    /// Non-success statuses become [`RequestError::Http`].
    pub async fn call<T: DeserializeOwned>(self) -> Result<T, RequestError> {
        let response = self.send().await?;

        if !response.status().is_success() {
            return Err(RequestError::from_response(response).await);
        }

        response
            .json::<T>()
            .await
            .map_err(|error| RequestError::Parse(error.to_string()))
    }

    /// Like [`ApiRequest::call`], for endpoints wrapping their result in `{ "data": ... }`.
    pub async fn call_data<T: DeserializeOwned>(self) -> Result<T, RequestError> {
        self.call::<DataEnvelope<T>>()
            .await?
            .data
            .ok_or_else(|| RequestError::Parse("missing `data` field".to_string()))
    }
}

impl HandymanClient {
    /// Runs a request through authentication, retries and 401 recovery.
    async fn execute(&self, request: &ApiRequest<'_>) -> Result<Response, RequestError> {
        let sent_token = self.auth_store.access_token();
        let response = self
            .send_with_retry(request, sent_token.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if bypasses_refresh(&request.path) {
            tracing::debug!(path = %request.path, "401 from auth endpoint, not refreshing");
            return Ok(response);
        }

        match self.recover_unauthorized(sent_token.as_deref()).await {
            Some(access_token) => self.send_with_retry(request, Some(&access_token)).await,
            None => Ok(response),
        }
    }

    /// Finds the access token to retry a rejected request with, refreshing if needed.
    ///
    /// Returns `None` when the request must not be retried and its 401 stands.
    async fn recover_unauthorized(&self, sent_token: Option<&str>) -> Option<String> {
        match (self.auth_store.access_token(), sent_token) {
            (Some(current), sent) if sent != Some(current.as_str()) => {
                tracing::debug!("session renewed while the request was in flight");
                return Some(current);
            }
            (None, Some(_)) => {
                tracing::debug!("session already ended, not refreshing");
                return None;
            }
            _ => {}
        }

        let renewed = self
            .refresh_coordinator
            .run_unless(
                || {
                    self.auth_store
                        .access_token()
                        .is_some_and(|current| Some(current.as_str()) != sent_token)
                },
                || self.refresh_session(),
            )
            .await;

        if !renewed {
            return None;
        }

        match self.auth_store.access_token() {
            Some(access_token) if Some(access_token.as_str()) != sent_token => Some(access_token),
            _ => {
                tracing::warn!("refresh returned the rejected access token, not retrying");
                None
            }
        }
    }

    /// Sends a single attempt of `request`.
    async fn dispatch(
        &self,
        request: &ApiRequest<'_>,
        access_token: Option<&str>,
        timeout: Duration,
    ) -> Result<Response, RequestError> {
        let mut request_builder = self
            .reqwest_client
            .request(request.method.clone(), self.config.endpoint(&request.path))
            .timeout(timeout)
            .header(ACCEPT, "application/json");

        if !request.query.is_empty() {
            request_builder = request_builder.query(&request.query);
        }

        request_builder = match &request.body {
            RequestBody::Empty => request_builder,
            RequestBody::Json(value) => request_builder.json(value),
            RequestBody::Form(fields) => request_builder.form(fields),
            RequestBody::Multipart(build) => request_builder.multipart(build()),
            RequestBody::Invalid(message) => {
                return Err(RequestError::InvalidRequest(message.clone()));
            }
        };

        Self::with_authorization_token(request_builder, access_token)
            .send()
            .await
            .map_err(|error| RequestError::from_reqwest(&error, timeout))
    }

    /// Adds a bearer authorization header, if a token is available.
    fn with_authorization_token(
        request_builder: RequestBuilder,
        access_token: Option<&str>,
    ) -> RequestBuilder {
        if let Some(access_token) = access_token {
            request_builder.bearer_auth(access_token)
        } else {
            request_builder
        }
    }
}
