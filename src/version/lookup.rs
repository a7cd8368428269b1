//! GitHub latest-version lookup
//!
//! One [`GitHubLookup`] per monitored repository. A query walks the release
//! pages until a release passes the filters and requirements, then confirms an
//! apparent change with a second check before committing it to the status.
//!
//! ```text
//! fetch ──▶ classify ──┬─▶ 200 body ──────────┐
//!                      ├─▶ 200 [] / 304 empty ─┴─▶ flip /releases ⇄ /tags, retry once
//!                      ├─▶ 304 cached ────────────▶ cached releases
//!                      └─▶ 401/403/429/other ─────▶ error
//! ```

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use tracing::{debug, error, info, warn};

use crate::config::{
    CONFIRM_DELAY_MS, DefaultsConfig, LookupConfig, ProbeConfig, first_non_empty, first_set,
};
use crate::version::cache::{EmptyListEtag, ReleaseCache};
use crate::version::docker::DockerDefaults;
use crate::version::error::{QueryError, RequireError};
use crate::version::registries::github::{
    GitHubClient, classify_error, next_page, normalize_repo, strip_weak_prefix,
};
use crate::version::registry::RegistryClients;
use crate::version::release::{FilteredRelease, Release, filter_releases};
use crate::version::require::{ContentSource, Requirement};
use crate::version::semver::{compare_versions, parse_version};
use crate::version::status::LookupStatus;
use crate::version::template::eval_env_vars;

/// Collaborators and settings shared by every lookup
pub struct LookupContext {
    pub github: GitHubClient,
    pub registries: RegistryClients,
    pub empty_list_etag: Arc<EmptyListEtag>,
    pub defaults: DefaultsConfig,
    pub hard_defaults: DefaultsConfig,
    docker_defaults: Vec<Arc<DockerDefaults>>,
    /// Pause before the confirming second check
    pub confirm_delay: Duration,
}

impl LookupContext {
    pub fn new(
        defaults: DefaultsConfig,
        hard_defaults: DefaultsConfig,
        github: GitHubClient,
        registries: RegistryClients,
        empty_list_etag: Arc<EmptyListEtag>,
    ) -> Self {
        let docker_defaults = vec![
            Arc::new(defaults.require.docker.clone()),
            Arc::new(hard_defaults.require.docker.clone()),
        ];
        Self {
            github,
            registries,
            empty_list_etag,
            defaults,
            hard_defaults,
            docker_defaults,
            confirm_delay: Duration::from_millis(CONFIRM_DELAY_MS),
        }
    }

    /// Context for the defaults of `config` talking to the public APIs
    pub fn from_config(config: &ProbeConfig, empty_list_etag: Arc<EmptyListEtag>) -> Self {
        Self::new(
            config.defaults.clone(),
            config.hard_defaults(),
            GitHubClient::default(),
            RegistryClients::default(),
            empty_list_etag,
        )
    }

    pub fn with_confirm_delay(mut self, confirm_delay: Duration) -> Self {
        self.confirm_delay = confirm_delay;
        self
    }

    /// Access token from the defaults layers only
    pub fn default_access_token(&self) -> Option<String> {
        first_non_empty([
            self.defaults.access_token.as_deref(),
            self.hard_defaults.access_token.as_deref(),
        ])
        .map(|token| eval_env_vars(token).into_owned())
    }

    /// Shared docker defaults layers, service defaults first
    pub fn docker_defaults(&self) -> Vec<Arc<DockerDefaults>> {
        self.docker_defaults.clone()
    }
}

/// What fetching one page produced
enum PageVersion {
    Found {
        version: String,
        release_date: Option<String>,
    },
    /// Nothing usable here; try `page` next
    NextPage { page: u32, error: QueryError },
}

/// Outcome of querying one page
enum PageOutcome {
    /// Query finished; whether a new version was committed
    Done(bool),
    /// Nothing usable on this page
    Next { page: u32, error: QueryError },
}

/// Latest-version lookup for one GitHub repository
pub struct GitHubLookup {
    id: String,
    repo: String,
    config: LookupConfig,
    require: Option<Requirement>,
    context: Arc<LookupContext>,
    status: Arc<dyn LookupStatus>,
    cache: ReleaseCache,
}

impl GitHubLookup {
    pub fn new(
        id: &str,
        config: LookupConfig,
        context: Arc<LookupContext>,
        status: Arc<dyn LookupStatus>,
    ) -> Self {
        let mut require = config.require.clone();
        if let Some(require) = require.as_mut() {
            require.set_docker_defaults(context.docker_defaults());
        }

        Self {
            id: id.to_string(),
            repo: normalize_repo(&config.url),
            cache: ReleaseCache::new(&context.empty_list_etag.get()),
            config,
            require,
            context,
            status,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `owner/repo` this lookup queries
    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn cache(&self) -> &ReleaseCache {
        &self.cache
    }

    /// Access token from the first layer that sets one
    pub fn access_token(&self) -> Option<String> {
        first_non_empty([
            self.config.access_token.as_deref(),
            self.context.defaults.access_token.as_deref(),
            self.context.hard_defaults.access_token.as_deref(),
        ])
        .map(|token| eval_env_vars(token).into_owned())
    }

    pub fn use_prerelease(&self) -> bool {
        first_set([
            self.config.use_prerelease,
            self.context.defaults.use_prerelease,
            self.context.hard_defaults.use_prerelease,
        ])
        .unwrap_or(false)
    }

    pub fn semantic_versioning(&self) -> bool {
        first_set([
            self.config.semantic_versioning,
            self.context.defaults.semantic_versioning,
            self.context.hard_defaults.semantic_versioning,
        ])
        .unwrap_or(true)
    }

    /// Whether the token in use is the shared default one
    fn uses_default_access_token(&self) -> bool {
        let own = self.config.access_token.as_deref().unwrap_or_default();
        own.is_empty() || self.access_token() == self.context.default_access_token()
    }

    /// Take over cached state from the lookup this one replaces
    pub fn inherit(&self, old: &GitHubLookup) {
        if self.repo == old.repo {
            debug!("{}: inheriting cache of {}", self.id, old.id);
            self.cache.copy_from(&old.cache);
        }
        if let (Some(require), Some(old_require)) = (&self.require, &old.require) {
            require.inherit(old_require);
        }
    }

    /// Query GitHub, returning whether a new version was found
    pub async fn query(&self) -> Result<bool, QueryError> {
        let mut page = 1;
        loop {
            match self.query_page(page).await? {
                PageOutcome::Done(new_version) => return Ok(new_version),
                PageOutcome::Next { page: next, error } => {
                    if next <= page {
                        return Err(error);
                    }
                    page = next;
                }
            }
        }
    }

    /// One page of the query, confirming any version change
    async fn query_page(&self, page: u32) -> Result<PageOutcome, QueryError> {
        let version = match self.find_version(page).await? {
            PageVersion::Found { version, .. } => version,
            PageVersion::NextPage { page, error } => {
                return Ok(PageOutcome::Next { page, error });
            }
        };

        self.status.set_last_queried();

        let previous = self.status.latest_version();
        if version == previous {
            self.status.announce_query();
            return Ok(PageOutcome::Done(false));
        }
        if self.semantic_versioning() {
            self.verify_semantic_versioning(&version, &previous)?;
        }

        info!(
            "{}: Possibly found a new version (From {:?} to {:?}). Checking again",
            self.id, previous, version
        );
        tokio::time::sleep(self.context.confirm_delay).await;

        let (version, release_date) = match self.find_version(page).await? {
            PageVersion::Found {
                version,
                release_date,
            } => (version, release_date),
            PageVersion::NextPage { .. } => return Ok(PageOutcome::Done(false)),
        };

        let previous = self.status.latest_version();
        if version == previous {
            info!(
                "{}: Staying on {:?} as that's the latest version in the second check",
                self.id, version
            );
            self.status.announce_query();
            return Ok(PageOutcome::Done(false));
        }
        if self.semantic_versioning() {
            self.verify_semantic_versioning(&version, &previous)?;
        }

        Ok(PageOutcome::Done(
            self.handle_new_version(&version, release_date),
        ))
    }

    /// Fetch `page` and pick the first release passing every gate
    async fn find_version(&self, page: u32) -> Result<PageVersion, QueryError> {
        let (body, next) = self.http_request(page).await?;

        match self.get_version(body, page).await {
            Ok((version, release_date)) => Ok(PageVersion::Found {
                version,
                release_date,
            }),
            Err(e) => {
                error!("{}: {}", self.id, e);
                match next {
                    Some(next) => Ok(PageVersion::NextPage {
                        page: next,
                        error: e,
                    }),
                    None => Err(e),
                }
            }
        }
    }

    /// GET one page, following the releases/tags fallback at most once.
    ///
    /// Returns the body to decode (`None` means use the cached releases) and
    /// the next page, if any.
    async fn http_request(&self, page: u32) -> Result<(Option<Vec<u8>>, Option<u32>), QueryError> {
        let access_token = self.access_token();
        let mut retried = false;

        loop {
            let url = self
                .context
                .github
                .releases_url(&self.repo, self.cache.tag_fallback(), page);
            let etag = (page <= 1).then(|| self.cache.etag());
            let response = self
                .context
                .github
                .get(&url, access_token.as_deref(), etag.as_deref())
                .await?;

            match response.status {
                200 => {
                    let etag = strip_weak_prefix(response.etag.as_deref().unwrap_or_default());
                    let next = response.link.as_deref().and_then(next_page);
                    if page <= 1 {
                        self.cache.set_etag(etag);
                        self.cache.set_next_page(next);
                    }

                    if response.body.as_slice() == b"[]" {
                        if page <= 1 && self.uses_default_access_token() {
                            self.context.empty_list_etag.set(etag);
                        }
                        if self.cache.toggle_tag_fallback() && !retried {
                            debug!("{}: /releases gave [], trying /tags", self.id);
                            retried = true;
                            continue;
                        }
                    } else {
                        debug!("{}: Potentially found new releases (new ETag {})", self.id, etag);
                    }

                    return Ok((Some(response.body), next));
                }
                304 => {
                    if self.cache.has_releases() {
                        return Ok((None, self.cache.next_page()));
                    }
                    if self.cache.toggle_tag_fallback() && !retried {
                        debug!("{}: no tags found on /releases, trying /tags", self.id);
                        retried = true;
                        continue;
                    }
                    return Ok((None, None));
                }
                status => {
                    let body = String::from_utf8_lossy(&response.body);
                    return Err(classify_error(status, &body, &self.repo));
                }
            }
        }
    }

    /// Version and release date of the first release passing every gate
    async fn get_version(
        &self,
        body: Option<Vec<u8>>,
        page: u32,
    ) -> Result<(String, Option<String>), QueryError> {
        let releases = match body {
            Some(body) => {
                let releases: Arc<Vec<Release>> = Arc::new(serde_json::from_slice(&body)?);
                if page <= 1 {
                    self.cache.set_releases(Arc::clone(&releases));
                }
                releases
            }
            None => {
                debug!("{}: Using cached releases (ETag unchanged)", self.id);
                self.cache.releases()
            }
        };

        let filtered = filter_releases(
            &releases,
            &self.config.url_commands,
            self.use_prerelease(),
            self.semantic_versioning(),
        );
        if filtered.is_empty() {
            return Err(QueryError::NoFilteredReleases { page });
        }

        let mut first_error = None;
        for release in &filtered {
            match self.release_meets_requirements(release).await {
                Ok(found) => return Ok(found),
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(QueryError::NoReleaseMatched(e)),
            None => Err(QueryError::NoFilteredReleases { page }),
        }
    }

    /// Version and release date of `release`, if it passes every gate
    async fn release_meets_requirements(
        &self,
        release: &FilteredRelease,
    ) -> Result<(String, Option<String>), RequireError> {
        let version = release.display_version();
        let mut release_date = release.release.published_at.clone();
        if let Some(date) = release_date.as_deref() {
            if let Err(e) = DateTime::parse_from_rfc3339(date) {
                if !date.is_empty() {
                    warn!(
                        "{}: ignoring release date of {:?} for version {:?} as it's not in RFC3339 format: {}",
                        self.id, date, version, e
                    );
                }
                release_date = None;
            }
        }

        let Some(require) = &self.require else {
            return Ok((version, release_date));
        };

        let asset_date = require
            .check(
                &version,
                ContentSource::Assets(&release.release.assets),
                self.status.as_ref(),
                &self.context.registries,
            )
            .await
            .inspect_err(|e| debug!("{}: {} rejected: {}", self.id, version, e))?;

        Ok((version, asset_date.or(release_date)))
    }

    /// A version change must not go below the deployed version.
    ///
    /// Only checked once a latest version is known; a deployed version that
    /// does not parse skips the check.
    fn verify_semantic_versioning(&self, version: &str, latest: &str) -> Result<(), QueryError> {
        if parse_version(version).is_none() {
            return Err(QueryError::NotSemantic {
                version: version.to_string(),
            });
        }
        if latest.is_empty() {
            return Ok(());
        }

        let deployed = self.status.deployed_version();
        if compare_versions(version, &deployed) == Some(Ordering::Less) {
            let err = QueryError::VersionRegression {
                queried: version.to_string(),
                deployed,
            };
            warn!("{}: {}", self.id, err);
            return Err(err);
        }
        Ok(())
    }

    /// Commit a confirmed version; only a change from a known version is new
    fn handle_new_version(&self, version: &str, release_date: Option<String>) -> bool {
        self.status.reset_regex_misses();

        if self.status.latest_version().is_empty() {
            self.status.set_latest_version(version, release_date);
            if self.status.deployed_version().is_empty() {
                self.status.set_deployed_version(version);
            }
            info!("{}: Latest Release - {:?}", self.id, version);
            self.status.announce_first_version();
            return false;
        }

        self.status.set_latest_version(version, release_date);
        info!("{}: New Release - {:?}", self.id, version);
        true
    }
}
