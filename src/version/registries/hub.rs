//! Docker Hub registry implementation

use chrono::{Duration, Utc};
use tracing::debug;

use crate::config::{REFRESHED_TOKEN_LIFETIME_SECS, STATIC_TOKEN_LIFETIME_DAYS};
use crate::version::docker::DockerRegistryType;
use crate::version::docker::credential::QueryToken;
use crate::version::error::RegistryError;
use crate::version::registries::{TokenResponse, http_client, read_text, with_bearer};
use crate::version::registry::ContainerRegistry;

/// Default base URL for Docker Hub
const DEFAULT_BASE_URL: &str = "https://registry.hub.docker.com";

/// Registry implementation for Docker Hub
pub struct HubRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl HubRegistry {
    /// Creates a new HubRegistry with a custom base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.to_string(),
        }
    }
}

impl Default for HubRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait::async_trait]
impl ContainerRegistry for HubRegistry {
    fn registry_type(&self) -> DockerRegistryType {
        DockerRegistryType::Hub
    }

    async fn fetch_query_token(
        &self,
        secret: &str,
        username: &str,
        _image: &str,
    ) -> Result<QueryToken, RegistryError> {
        let now = Utc::now();

        // Anonymous pulls need no token at all
        if secret.is_empty() {
            return Ok(QueryToken::new(
                "",
                now + Duration::days(STATIC_TOKEN_LIFETIME_DAYS),
            ));
        }

        let url = format!("{}/v2/users/login", self.base_url);
        let form: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("username", username)
            .append_pair("password", secret)
            .finish();

        debug!("Logging in to Docker Hub as {}", username);
        let response = self
            .client
            .post(&url)
            .header("Connection", "close")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(form)
            .send()
            .await?;

        let status = response.status();
        let body = read_text(response).await?;
        if status != reqwest::StatusCode::OK {
            return Err(RegistryError::TokenRefresh {
                registry: "hub",
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
        let url = format!("{}/v2/repositories/{}/tags/{}", self.base_url, image, tag);

        let response = with_bearer(self.client.get(&url), token)
            .header("Connection", "close")
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
