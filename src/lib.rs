//! `handyman-client` is a Rust client for the handyman marketplace mobile API.
//!
//! Every request carries the stored access token. When the API answers 401, the client
//! refreshes the session once, shared by all requests that were rejected at the same
//! time, and replays them. Idempotent requests are retried on transient failures.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::error::Error;
//!
//! use handyman_client::{ClientConfig, HandymanClient};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Job {
//!     id: i64,
//!     title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let client = HandymanClient::new(ClientConfig::from_env()?)?;
//!
//!     client.login("YOUR_EMAIL", "YOUR_PASSWORD").await?;
//!
//!     let jobs: Vec<Job> = client
//!         .get("/jobs")
//!         .query_param("status", "open")
//!         .call_data()
//!         .await?;
//!
//!     for job in jobs {
//!         println!("#{} {}", job.id, job.title);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

use std::sync::Arc;
use std::time::Duration;

pub use auth::{AuthError, AuthPayload, Role};
pub use cache::{MemoryQueryCache, NoopQueryCache, QueryCache};
pub use config::{ClientConfig, ConfigError, RetryPolicy};
pub use error::RequestError;
pub use request::ApiRequest;
pub use reqwest::multipart::{Form, Part};
pub use reqwest::{Method, Response, StatusCode};
pub use session::storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use session::{AuthStore, Session};

use auth::refresh::RefreshCoordinator;

pub(crate) mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub(crate) mod request;
pub mod session;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A client for sending requests to the handyman marketplace API.
///
/// Clones share the session, the query cache and the refresh coordination, so a single
/// client (and its clones) should be used per application.
///
/// The `Debug` implementation for this struct redacts sensitive authentication data
/// to prevent accidental exposure in logs.
///
/// # Example
/// ```rust,ignore
/// use std::sync::Arc;
///
/// use handyman_client::{AuthStore, ClientConfig, FileStorage, HandymanClient, MemoryQueryCache};
///
/// let storage = Arc::new(FileStorage::open("/data/auth.json")?);
///
/// let client = HandymanClient::new(ClientConfig::new("https://api.example.com")?)?
///     .with_auth_store(AuthStore::new(storage))
///     .with_query_cache(Arc::new(MemoryQueryCache::new()));
/// ```
#[derive(Clone)]
pub struct HandymanClient {
    pub(crate) config: ClientConfig,
    pub(crate) auth_store: AuthStore,
    pub(crate) query_cache: Arc<dyn QueryCache>,
    pub(crate) refresh_coordinator: Arc<RefreshCoordinator>,
    pub(crate) reqwest_client: reqwest::Client,
}

impl std::fmt::Debug for HandymanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandymanClient")
            .field("config", &self.config)
            .field("auth_store", &self.auth_store)
            .field("is_refreshing", &self.refresh_coordinator.is_refreshing())
            .field("reqwest_client", &"Client")
            .finish_non_exhaustive()
    }
}

impl HandymanClient {
    /// Creates a new client with an in-memory session and no query cache.
    ///
    /// # Example
    /// ```rust,ignore
    /// let client = HandymanClient::new(ClientConfig::default())?;
    /// ```
    pub fn new(config: ClientConfig) -> Result<Self, RequestError> {
        let reqwest_client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|error| RequestError::Unknown(error.to_string()))?;

        Ok(Self::new_with_client(config, reqwest_client))
    }

    /// Creates a new client on top of a custom reqwest client.
    ///
    /// The configured timeout is applied per request and takes precedence over the
    /// reqwest client's own.
    ///
    /// # Example
    /// ```rust
    /// use handyman_client::{ClientConfig, HandymanClient};
    ///
    /// let reqwest_client = reqwest::Client::builder()
    ///     .user_agent("handyman-app/1.0")
    ///     .build()
    ///     .expect("Failed to build client");
    ///
    /// let client = HandymanClient::new_with_client(ClientConfig::default(), reqwest_client);
    /// assert_eq!(client.base_url(), "http://localhost:8000");
    /// ```
    #[must_use]
    pub fn new_with_client(config: ClientConfig, client: reqwest::Client) -> Self {
        Self {
            config,
            auth_store: AuthStore::in_memory(),
            query_cache: Arc::new(NoopQueryCache),
            refresh_coordinator: Arc::new(RefreshCoordinator::default()),
            reqwest_client: client,
        }
    }

    /// Uses `auth_store` as the session, e.g. one restored from persistent storage.
    #[must_use]
    pub fn with_auth_store(mut self, auth_store: AuthStore) -> Self {
        self.auth_store = auth_store;
        self
    }

    /// Uses `query_cache` as the cache cleared when the session ends.
    #[must_use]
    pub fn with_query_cache(mut self, query_cache: Arc<dyn QueryCache>) -> Self {
        self.query_cache = query_cache;
        self
    }

    /// The session store.
    ///
    /// # Example
    /// ```rust,ignore
    /// if client.auth_store().is_authenticated() {
    ///     println!("Signed in as {:?}", client.auth_store().state().active_role);
    /// } else {
    ///     println!("Not authenticated");
    /// }
    /// ```
    #[must_use]
    pub const fn auth_store(&self) -> &AuthStore {
        &self.auth_store
    }

    /// Retrieves the current access token, if available.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.auth_store.access_token()
    }

    /// Returns the base URL of the API server.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// The configuration requests are sent with.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Forgets the session and every cached query result.
    pub(crate) fn clear_session(&self) {
        self.auth_store.logout();
        self.query_cache.clear();
        tracing::info!("session ended");
    }

    /// Like [`HandymanClient::clear_session`], unless the session no longer holds
    /// `refresh_token` because it was ended or replaced in the meantime.
    pub(crate) fn clear_session_holding(&self, refresh_token: &str) {
        if self.auth_store.logout_if_refresh_token(refresh_token) {
            self.query_cache.clear();
            tracing::info!("session ended");
        }
    }
}
