//! Container registry test utilities

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use release_probe::version::docker::DockerRegistryType;
use release_probe::version::docker::credential::QueryToken;
use release_probe::version::error::RegistryError;
use release_probe::version::registry::{ContainerRegistry, RegistryClients};

/// In-memory registry knowing a fixed set of image tags
pub struct MockRegistry {
    registry_type: DockerRegistryType,
    tags: HashMap<String, Vec<String>>,
    token_fetches: AtomicUsize,
}

impl MockRegistry {
    pub fn new(registry_type: DockerRegistryType) -> Self {
        Self {
            registry_type,
            tags: HashMap::new(),
            token_fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_tags(mut self, image: &str, tags: Vec<&str>) -> Self {
        self.tags.insert(
            image.to_string(),
            tags.into_iter().map(|t| t.to_string()).collect(),
        );
        self
    }

    /// How many times a query token was requested
    pub fn token_fetches(&self) -> usize {
        self.token_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerRegistry for MockRegistry {
    fn registry_type(&self) -> DockerRegistryType {
        self.registry_type
    }

    async fn fetch_query_token(
        &self,
        secret: &str,
        _username: &str,
        _image: &str,
    ) -> Result<QueryToken, RegistryError> {
        self.token_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(QueryToken::new(
            format!("query-{}", secret),
            Utc::now() + Duration::minutes(5),
        ))
    }

    async fn tag_exists(&self, image: &str, tag: &str, _token: &str) -> Result<(), RegistryError> {
        match self.tags.get(image) {
            Some(tags) if tags.iter().any(|t| t == tag) => Ok(()),
            _ => Err(RegistryError::NotFound(format!("{}:{}", image, tag))),
        }
    }
}

/// Registry clients where every registry is `registry`
pub fn registry_clients(registry: Arc<MockRegistry>) -> RegistryClients {
    RegistryClients::new(registry.clone(), registry.clone(), registry)
}
