//! Per-lookup conditional request state and the shared empty-list ETag

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::version::error::QueryError;
use crate::version::registries::github::{GitHubClient, classify_error, strip_weak_prefix};
use crate::version::release::Release;

/// ETag GitHub returns for an empty JSON array
pub const DEFAULT_EMPTY_LIST_ETAG: &str =
    r#""4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945""#;

/// Repository known to have no tags, used to learn the empty-list ETag
pub const EMPTY_LIST_PROBE_REPO: &str = "release-argus/.github";

/// Everything one lookup remembers between polls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheState {
    pub etag: String,
    /// Page-1 releases exactly as last fetched, before any filtering
    pub releases: Arc<Vec<Release>>,
    /// Whether `/tags` is queried instead of `/releases`
    pub tag_fallback: bool,
    /// `rel="next"` page of the cached response
    pub next_page: Option<u32>,
}

/// Cache of a single lookup, guarded by one lock
#[derive(Debug, Default)]
pub struct ReleaseCache {
    state: RwLock<CacheState>,
}

impl ReleaseCache {
    /// Creates a cache that starts out sending `etag`
    pub fn new(etag: &str) -> Self {
        Self {
            state: RwLock::new(CacheState {
                etag: etag.to_string(),
                ..CacheState::default()
            }),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn etag(&self) -> String {
        self.read().etag.clone()
    }

    pub fn set_etag(&self, etag: &str) {
        self.write().etag = etag.to_string();
    }

    pub fn releases(&self) -> Arc<Vec<Release>> {
        Arc::clone(&self.read().releases)
    }

    pub fn set_releases(&self, releases: Arc<Vec<Release>>) {
        self.write().releases = releases;
    }

    pub fn has_releases(&self) -> bool {
        !self.read().releases.is_empty()
    }

    pub fn tag_fallback(&self) -> bool {
        self.read().tag_fallback
    }

    /// Flip between `/releases` and `/tags`, returning the new value
    pub fn toggle_tag_fallback(&self) -> bool {
        let mut state = self.write();
        state.tag_fallback = !state.tag_fallback;
        state.tag_fallback
    }

    pub fn next_page(&self) -> Option<u32> {
        self.read().next_page
    }

    pub fn set_next_page(&self, next_page: Option<u32>) {
        self.write().next_page = next_page;
    }

    /// Copy of the whole state
    pub fn snapshot(&self) -> CacheState {
        self.read().clone()
    }

    /// Replace this cache's state with `from`'s as one unit.
    ///
    /// Both locks are held for the copy, taken in address order.
    pub fn copy_from(&self, from: &ReleaseCache) {
        if std::ptr::eq(self, from) {
            return;
        }

        if (self as *const Self) < (from as *const Self) {
            let mut to = self.write();
            let from = from.read();
            *to = from.clone();
        } else {
            let from = from.read();
            let mut to = self.write();
            *to = from.clone();
        }
    }
}

/// ETag of an empty release list, shared by every lookup using default credentials
#[derive(Debug)]
pub struct EmptyListEtag {
    etag: RwLock<String>,
}

impl Default for EmptyListEtag {
    fn default() -> Self {
        Self::new(DEFAULT_EMPTY_LIST_ETAG)
    }
}

impl EmptyListEtag {
    pub fn new(etag: &str) -> Self {
        Self {
            etag: RwLock::new(etag.to_string()),
        }
    }

    pub fn get(&self) -> String {
        self.etag
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, etag: &str) {
        debug!("Empty list ETag is now {}", etag);
        *self.etag.write().unwrap_or_else(PoisonError::into_inner) = etag.to_string();
    }

    /// Learn the current empty-list ETag from a repository without tags
    pub async fn probe(
        &self,
        client: &GitHubClient,
        access_token: Option<&str>,
    ) -> Result<String, QueryError> {
        let url = client.releases_url(EMPTY_LIST_PROBE_REPO, true, 1);
        let response = client.get(&url, access_token, None).await?;

        if response.status != 200 {
            let body = String::from_utf8_lossy(&response.body);
            return Err(classify_error(
                response.status,
                &body,
                EMPTY_LIST_PROBE_REPO,
            ));
        }

        let etag = strip_weak_prefix(response.etag.as_deref().unwrap_or_default()).to_string();
        if etag.is_empty() {
            return Ok(self.get());
        }

        info!("Learned empty list ETag {}", etag);
        self.set(&etag);
        Ok(etag)
    }
}
