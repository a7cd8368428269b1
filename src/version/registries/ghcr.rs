//! GitHub Container Registry implementation

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Duration, Utc};

use crate::config::{REFRESHED_TOKEN_LIFETIME_SECS, STATIC_TOKEN_LIFETIME_DAYS};
use crate::version::docker::DockerRegistryType;
use crate::version::docker::credential::QueryToken;
use crate::version::error::RegistryError;
use crate::version::registries::{TokenResponse, http_client, read_text, with_bearer};
use crate::version::registry::ContainerRegistry;

/// Default base URL for GHCR
const DEFAULT_BASE_URL: &str = "https://ghcr.io";

/// Prefix of GitHub personal access tokens, which GHCR wants base64-encoded
const PERSONAL_ACCESS_TOKEN_PREFIX: &str = "ghp_";

/// Manifest type GHCR must be asked for
const OCI_INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// Registry implementation for ghcr.io
pub struct GhcrRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl GhcrRegistry {
    /// Creates a new GhcrRegistry with a custom base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.to_string(),
        }
    }
}

impl Default for GhcrRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Bearer token GHCR accepts for a static secret
pub fn bearer_for_secret(secret: &str) -> String {
    if secret.starts_with(PERSONAL_ACCESS_TOKEN_PREFIX) {
        STANDARD.encode(secret)
    } else {
        secret.to_string()
    }
}

#[async_trait::async_trait]
impl ContainerRegistry for GhcrRegistry {
    fn registry_type(&self) -> DockerRegistryType {
        DockerRegistryType::Ghcr
    }

    async fn fetch_query_token(
        &self,
        secret: &str,
        _username: &str,
        image: &str,
    ) -> Result<QueryToken, RegistryError> {
        let now = Utc::now();

        if !secret.is_empty() {
            return Ok(QueryToken::new(
                bearer_for_secret(secret),
                now + Duration::days(STATIC_TOKEN_LIFETIME_DAYS),
            ));
        }

        // Anonymous pull token scoped to this image
        let url = format!("{}/token?scope=repository:{}:pull", self.base_url, image);
        let response = self
            .client
            .get(&url)
            .header("Connection", "close")
            .send()
            .await?;

        let status = response.status();
        let body = read_text(response).await?;
        if status != reqwest::StatusCode::OK {
            return Err(RegistryError::TokenRefresh {
                registry: "ghcr",
                message: format!("{}: {}", status, body.trim()),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))?;

        Ok(QueryToken::new(
            parsed.token,
            now + Duration::seconds(REFRESHED_TOKEN_LIFETIME_SECS),
        ))
    }

    async fn tag_exists(&self, image: &str, tag: &str, token: &str) -> Result<(), RegistryError> {
        let url = format!("{}/v2/{}/manifests/{}", self.base_url, image, tag);

        let response = with_bearer(self.client.get(&url), token)
            .header("Connection", "close")
            .header("Accept", OCI_INDEX_MEDIA_TYPE)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            return Ok(());
        }

        let body = read_text(response).await?;
        Err(RegistryError::NotFound(format!("{} {}", status, body.trim())))
    }
}
