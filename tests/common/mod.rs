#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use handyman_client::{ClientConfig, HandymanClient, MemoryQueryCache, RetryPolicy};
use httpmock::MockServer;
use serde_json::{json, Value};

pub const JOBS_PATH: &str = "/api/v1/mobile/jobs";
pub const REFRESH_PATH: &str = "/api/v1/mobile/auth/refresh";
pub const LOGIN_PATH: &str = "/api/v1/mobile/auth/login";
pub const LOGOUT_PATH: &str = "/api/v1/mobile/auth/logout";
pub const REGISTER_PATH: &str = "/api/v1/mobile/auth/register";
pub const ACTIVATE_ROLE_PATH: &str = "/api/v1/mobile/auth/activate-role";

/// A client pointed at `server`, retrying without delay.
pub fn client_for(server: &MockServer) -> HandymanClient {
    let config = ClientConfig::new(&server.base_url())
        .unwrap()
        .with_retry(RetryPolicy::default().with_backoff(Duration::ZERO));

    HandymanClient::new(config).unwrap()
}

/// Like [`client_for`], with tokens already stored and a query cache holding one entry.
pub fn signed_in_client(
    server: &MockServer,
    access_token: &str,
    refresh_token: &str,
) -> (HandymanClient, Arc<MemoryQueryCache>) {
    let query_cache = Arc::new(MemoryQueryCache::new());
    query_cache.insert("jobs", json!([{ "id": 1 }]));

    let client = client_for(server).with_query_cache(query_cache.clone());
    client.auth_store().set_tokens(access_token, refresh_token);

    (client, query_cache)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// The body of a successful login, refresh, registration or role switch.
pub fn auth_body(access_token: &str, refresh_token: &str, active_role: &str) -> Value {
    json!({
        "data": {
            "access_token": access_token,
            "refresh_token": refresh_token,
            "active_role": active_role,
            "next_action": "none",
            "email_verified": true
        }
    })
}
