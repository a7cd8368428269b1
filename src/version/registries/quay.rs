//! Quay registry implementation

use chrono::{Duration, Utc};

use crate::config::STATIC_TOKEN_LIFETIME_DAYS;
use crate::version::docker::DockerRegistryType;
use crate::version::docker::credential::QueryToken;
use crate::version::error::RegistryError;
use crate::version::registries::{encode_query_value, http_client, read_text, with_bearer};
use crate::version::registry::ContainerRegistry;

/// Default base URL for Quay
const DEFAULT_BASE_URL: &str = "https://quay.io";

/// Registry implementation for quay.io
pub struct QuayRegistry {
    client: reqwest::Client,
    base_url: String,
}

impl QuayRegistry {
    /// Creates a new QuayRegistry with a custom base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.to_string(),
        }
    }
}

impl Default for QuayRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Quay answers 200 for unknown tags, with an empty tag list
fn has_no_tags(body: &str) -> bool {
    body.contains(r#""tags": []"#) || body.contains(r#""tags":[]"#)
}

#[async_trait::async_trait]
impl ContainerRegistry for QuayRegistry {
    fn registry_type(&self) -> DockerRegistryType {
        DockerRegistryType::Quay
    }

    async fn fetch_query_token(
        &self,
        secret: &str,
        _username: &str,
        _image: &str,
    ) -> Result<QueryToken, RegistryError> {
        Ok(QueryToken::new(
            secret,
            Utc::now() + Duration::days(STATIC_TOKEN_LIFETIME_DAYS),
        ))
    }

    async fn tag_exists(&self, image: &str, tag: &str, token: &str) -> Result<(), RegistryError> {
        let url = format!(
            "{}/api/v1/repository/{}/tag/?onlyActiveTags=true&specificTag={}",
            self.base_url,
            image,
            encode_query_value(tag)
        );

        let response = with_bearer(self.client.get(&url), token)
            .header("Connection", "close")
            .send()
            .await?;

        let status = response.status();
        let body = read_text(response).await?;
        if status != reqwest::StatusCode::OK {
            return Err(RegistryError::NotFound(format!("{} {}", status, body.trim())));
        }
        if has_no_tags(&body) {
            return Err(RegistryError::NotFound(format!("tag {:?} not found", tag)));
        }

        Ok(())
    }
}
