//! Container registry trait for token refresh and tag existence checks

use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::version::docker::DockerRegistryType;
use crate::version::docker::credential::QueryToken;
use crate::version::error::RegistryError;
use crate::version::registries::{GhcrRegistry, HubRegistry, QuayRegistry};

/// Trait for talking to one container registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ContainerRegistry: Send + Sync {
    /// Returns the type of registry this implementation handles
    fn registry_type(&self) -> DockerRegistryType;

    /// Exchanges a static secret for a query token
    ///
    /// # Arguments
    /// * `secret` - The resolved static secret (empty for anonymous access)
    /// * `username` - The account name, for registries that need one
    /// * `image` - The image the token will be used for (e.g., "release-argus/argus")
    async fn fetch_query_token(
        &self,
        secret: &str,
        username: &str,
        image: &str,
    ) -> Result<QueryToken, RegistryError>;

    /// Confirms that `image:tag` exists
    ///
    /// # Returns
    /// * `Ok(())` - The tag exists
    /// * `Err(RegistryError::NotFound)` - The registry does not know the tag
    /// * `Err(RegistryError)` - Any other failure
    async fn tag_exists(&self, image: &str, tag: &str, token: &str) -> Result<(), RegistryError>;
}

/// One client per supported registry
#[derive(Clone)]
pub struct RegistryClients {
    hub: Arc<dyn ContainerRegistry>,
    ghcr: Arc<dyn ContainerRegistry>,
    quay: Arc<dyn ContainerRegistry>,
}

impl RegistryClients {
    pub fn new(
        hub: Arc<dyn ContainerRegistry>,
        ghcr: Arc<dyn ContainerRegistry>,
        quay: Arc<dyn ContainerRegistry>,
    ) -> Self {
        Self { hub, ghcr, quay }
    }

    /// Returns the client for `registry_type`
    pub fn get(&self, registry_type: DockerRegistryType) -> &dyn ContainerRegistry {
        match registry_type {
            DockerRegistryType::Hub => self.hub.as_ref(),
            DockerRegistryType::Ghcr => self.ghcr.as_ref(),
            DockerRegistryType::Quay => self.quay.as_ref(),
        }
    }
}

impl Default for RegistryClients {
    fn default() -> Self {
        Self::new(
            Arc::new(HubRegistry::default()),
            Arc::new(GhcrRegistry::default()),
            Arc::new(QuayRegistry::default()),
        )
    }
}
