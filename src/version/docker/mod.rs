//! Container image tag requirement with layered registry credentials
//!
//! A [`DockerTagRequirement`] resolves its registry type, secret and cached
//! query token through an ordered list of layers: the requirement itself, then
//! each [`DockerDefaults`] it was attached to (service defaults, then hard
//! defaults). The first non-empty value wins.
//!
//! Locks are taken on one layer at a time, instance first, and never across a
//! network call.

pub mod credential;

use std::fmt;
use std::sync::{Arc, LazyLock};

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::config::first_non_empty;
use crate::version::error::{RegistryError, RequireError};
use crate::version::registry::RegistryClients;
use crate::version::template::{check_template, render_version};

use credential::{QueryToken, RegistryCredential};

static IMAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-./]+$").expect("valid image regex"));

/// Supported container registries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DockerRegistryType {
    Hub,
    Ghcr,
    Quay,
}

impl DockerRegistryType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hub" => Some(Self::Hub),
            "ghcr" => Some(Self::Ghcr),
            "quay" => Some(Self::Quay),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hub => "hub",
            Self::Ghcr => "ghcr",
            Self::Quay => "quay",
        }
    }
}

impl fmt::Display for DockerRegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Docker settings shared by many requirements
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DockerDefaults {
    #[serde(rename = "type")]
    pub registry_type: Option<String>,
    pub ghcr: Option<RegistryCredential>,
    pub hub: Option<RegistryCredential>,
    pub quay: Option<RegistryCredential>,
}

impl DockerDefaults {
    /// Defaults that only pick a registry type
    pub fn with_type(registry_type: &str) -> Self {
        Self {
            registry_type: Some(registry_type.to_string()),
            ..Self::default()
        }
    }

    /// Credentials this layer holds for `registry_type`
    pub fn credential(&self, registry_type: DockerRegistryType) -> Option<&RegistryCredential> {
        match registry_type {
            DockerRegistryType::Hub => self.hub.as_ref(),
            DockerRegistryType::Ghcr => self.ghcr.as_ref(),
            DockerRegistryType::Quay => self.quay.as_ref(),
        }
    }

    /// Validate this layer, returning one line per problem
    pub fn validate(&self, prefix: &str) -> Vec<String> {
        let mut problems = Vec::new();
        let registry_type = self.registry_type.as_deref().unwrap_or_default();
        if !registry_type.is_empty() && DockerRegistryType::parse(registry_type).is_none() {
            problems.push(format!(
                "{prefix}.type: {registry_type:?} <invalid> (supported types = ['ghcr','hub','quay'])"
            ));
        }
        if let Some(hub) = &self.hub {
            let has_token = hub.token.as_deref().is_some_and(|t| !t.is_empty());
            let has_username = hub.username.as_deref().is_some_and(|u| !u.is_empty());
            if has_token && !has_username {
                problems.push(format!(
                    "{prefix}.hub.username: <required> (token is for who?)"
                ));
            }
        }
        problems
    }
}

/// Requires a registry tag derived from the candidate version to exist
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct DockerTagRequirement {
    #[serde(rename = "type")]
    pub registry_type: Option<String>,
    /// Image name, e.g. `release-argus/argus`
    pub image: String,
    /// Tag template, e.g. `{{ version }}`
    pub tag: String,
    #[serde(flatten)]
    pub credential: RegistryCredential,
    #[serde(skip)]
    defaults: Vec<Arc<DockerDefaults>>,
}

impl fmt::Debug for DockerTagRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerTagRequirement")
            .field("registry_type", &self.registry_type)
            .field("image", &self.image)
            .field("tag", &self.tag)
            .field("credential", &self.credential)
            .field("defaults", &self.defaults.len())
            .finish()
    }
}

impl DockerTagRequirement {
    pub fn new(registry_type: Option<&str>, image: &str, tag: &str) -> Self {
        Self {
            registry_type: registry_type.map(str::to_string),
            image: image.to_string(),
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    /// Attach the ordered defaults layers (service defaults, then hard defaults)
    pub fn set_defaults(&mut self, defaults: Vec<Arc<DockerDefaults>>) {
        self.defaults = defaults;
    }

    /// Registry type from the first layer that names one
    pub fn resolved_type(&self) -> Option<DockerRegistryType> {
        let layers = std::iter::once(self.registry_type.as_deref())
            .chain(self.defaults.iter().map(|d| d.registry_type.as_deref()));
        first_non_empty(layers).and_then(DockerRegistryType::parse)
    }

    /// Credential layers for `registry_type`, instance first
    fn layers(&self, registry_type: DockerRegistryType) -> Vec<&RegistryCredential> {
        std::iter::once(&self.credential)
            .chain(self.defaults.iter().filter_map(|d| d.credential(registry_type)))
            .collect()
    }

    /// Static secret from the first layer that sets one, with env references expanded
    pub fn secret(&self, registry_type: DockerRegistryType) -> Option<String> {
        self.layers(registry_type)
            .into_iter()
            .find_map(RegistryCredential::secret)
    }

    /// Username from the first layer that sets one
    pub fn username(&self, registry_type: DockerRegistryType) -> Option<String> {
        let layers = self.layers(registry_type);
        first_non_empty(layers.iter().map(|c| c.username.as_deref())).map(str::to_string)
    }

    /// Image name as the registry API wants it
    pub fn query_image(&self, registry_type: DockerRegistryType) -> String {
        if registry_type == DockerRegistryType::Hub && !self.image.contains('/') {
            return format!("library/{}", self.image);
        }
        self.image.clone()
    }

    /// Tag to look for when checking `version`
    pub fn tag_for(&self, version: &str) -> String {
        render_version(&self.tag, version).into_owned()
    }

    /// Validate the requirement, returning one line per problem
    pub fn validate(&self, prefix: &str) -> Vec<String> {
        let mut problems = Vec::new();

        let registry_type = self.resolved_type();
        match (&self.registry_type, registry_type) {
            (Some(value), _) if !value.is_empty() && DockerRegistryType::parse(value).is_none() => {
                problems.push(format!(
                    "{prefix}.type: {value:?} <invalid> (supported types = ['ghcr','hub','quay'])"
                ));
            }
            (_, None) => {
                problems.push(format!(
                    "{prefix}.type: <required> (supported types = ['ghcr','hub','quay'])"
                ));
            }
            _ => {}
        }

        if self.image.is_empty() {
            problems.push(format!("{prefix}.image: <required>"));
        } else if !IMAGE_NAME.is_match(&self.image) {
            problems.push(format!(
                "{prefix}.image: {:?} <invalid> (non-ASCII)",
                self.image
            ));
        }

        if self.tag.is_empty() {
            problems.push(format!("{prefix}.tag: <required>"));
        } else if !check_template(&self.tag) {
            problems.push(format!(
                "{prefix}.tag: {:?} <invalid> (didn't pass templating)",
                self.tag
            ));
        }

        if registry_type == Some(DockerRegistryType::Hub) {
            let has_token = self.secret(DockerRegistryType::Hub).is_some();
            let has_username = self.username(DockerRegistryType::Hub).is_some();
            if has_token && !has_username {
                problems.push(format!("{prefix}.username: <required> (token is for who?)"));
            } else if has_username && !has_token {
                problems.push(format!(
                    "{prefix}.token: <required> (token for {})",
                    self.username(DockerRegistryType::Hub).unwrap_or_default()
                ));
            }
        }

        problems
    }

    /// A cached query token that is still usable.
    ///
    /// Layers are checked from the instance down to the layer that owns the
    /// static secret; tokens below that layer came from another secret.
    pub fn valid_query_token(&self, registry_type: DockerRegistryType) -> Option<String> {
        let now = Utc::now();
        for layer in self.layers(registry_type) {
            if let Some(token) = layer.valid_query_token(now) {
                return Some(token);
            }
            if layer.secret().is_some() {
                break;
            }
        }
        None
    }

    /// Cache `token` on the layer owning `secret`.
    ///
    /// A token from a defaults secret is stored only on that defaults layer,
    /// where [`Self::valid_query_token`] finds it. Tokens derived from no
    /// secret stay on the instance as they may be scoped to this image.
    pub fn set_query_token(
        &self,
        registry_type: DockerRegistryType,
        secret: &str,
        token: QueryToken,
    ) {
        if secret.is_empty() || self.credential.secret().as_deref() == Some(secret) {
            self.credential.set_query_token(token);
            return;
        }
        match self
            .defaults
            .iter()
            .filter_map(|d| d.credential(registry_type))
            .find(|c| c.secret().as_deref() == Some(secret))
        {
            Some(owner) => owner.set_query_token(token),
            None => self.credential.set_query_token(token),
        }
    }

    /// Query token for this requirement, refreshed from the registry when stale
    pub async fn query_token(&self, registries: &RegistryClients) -> Result<String, RegistryError> {
        let registry_type = self.resolved_type().unwrap_or(DockerRegistryType::Hub);
        if let Some(token) = self.valid_query_token(registry_type) {
            return Ok(token);
        }

        let secret = self.secret(registry_type).unwrap_or_default();
        let username = self.username(registry_type).unwrap_or_default();
        let image = self.query_image(registry_type);

        debug!("Refreshing {} query token for {}", registry_type, image);
        let token = registries
            .get(registry_type)
            .fetch_query_token(&secret, &username, &image)
            .await?;

        let query_token = token.token.clone();
        self.set_query_token(registry_type, &secret, token);
        Ok(query_token)
    }

    /// Check that the tag templated from `version` exists
    pub async fn check_tag(
        &self,
        version: &str,
        registries: &RegistryClients,
    ) -> Result<(), RequireError> {
        let registry_type = self.resolved_type().unwrap_or(DockerRegistryType::Hub);
        let image = self.query_image(registry_type);
        let tag = self.tag_for(version);
        let wrap = |source: RegistryError| RequireError::DockerTag {
            image: self.image.clone(),
            tag: tag.clone(),
            source,
        };

        let token = self.query_token(registries).await.map_err(wrap)?;
        registries
            .get(registry_type)
            .tag_exists(&image, &tag, &token)
            .await
            .map_err(wrap)
    }

    /// Take over the query token of the requirement being replaced, when it
    /// targets the same registry, image and secret
    pub fn inherit(&self, old: &DockerTagRequirement) {
        let (Some(registry_type), Some(old_type)) = (self.resolved_type(), old.resolved_type())
        else {
            return;
        };
        if registry_type != old_type
            || self.image != old.image
            || self.secret(registry_type) != old.secret(old_type)
        {
            return;
        }

        self.credential.set_query_token(old.credential.query_token());
    }
}
