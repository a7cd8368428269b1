//! Registry implementations and the HTTP plumbing they share

pub mod ghcr;
pub mod github;
pub mod hub;
pub mod quay;

pub use ghcr::GhcrRegistry;
pub use github::GitHubClient;
pub use hub::HubRegistry;
pub use quay::QuayRegistry;

use std::time::Duration;

use serde::Deserialize;

use crate::config::{FETCH_TIMEOUT_MS, MAX_BODY_BYTES, USER_AGENT};

/// Token endpoint response shared by Docker Hub and GHCR
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub token: String,
}

/// Builds the HTTP client every registry uses
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
        .build()
        .expect("Failed to create HTTP client")
}

/// Reads a response body, keeping at most `MAX_BODY_BYTES`
pub(crate) async fn read_body(mut response: reqwest::Response) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = MAX_BODY_BYTES - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Reads a response body as (lossy) UTF-8 text
pub(crate) async fn read_text(response: reqwest::Response) -> Result<String, reqwest::Error> {
    let body = read_body(response).await?;
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Adds `Authorization: Bearer` when there is a token to send
pub(crate) fn with_bearer(
    request: reqwest::RequestBuilder,
    token: &str,
) -> reqwest::RequestBuilder {
    if token.is_empty() {
        request
    } else {
        request.bearer_auth(token)
    }
}

/// Percent-encodes one query-string value
pub(crate) fn encode_query_value(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
