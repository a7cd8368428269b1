//! Status collaborator a lookup reports its findings to

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

#[cfg(test)]
use mockall::automock;

/// Trait for recording what a lookup found
#[cfg_attr(test, automock)]
pub trait LookupStatus: Send + Sync {
    /// Latest version recorded so far (empty when none)
    fn latest_version(&self) -> String;

    /// Record a new latest version and its release date
    fn set_latest_version(&self, version: &str, release_date: Option<String>);

    /// Version currently deployed (empty when unknown)
    fn deployed_version(&self) -> String;

    fn set_deployed_version(&self, version: &str);

    /// Stamp the time of the last successful query
    fn set_last_queried(&self);

    /// Called once, when the very first version is found
    fn announce_first_version(&self);

    /// Called after a query that found nothing new
    fn announce_query(&self);

    /// Count a version regex miss, returning the running total
    fn record_version_regex_miss(&self) -> u32;

    /// Count a content regex miss, returning the running total
    fn record_content_regex_miss(&self) -> u32;

    fn reset_regex_misses(&self);
}

/// Announcement kinds recorded by [`MemoryStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    FirstVersion,
    Query,
}

#[derive(Debug, Default)]
struct StatusState {
    latest_version: String,
    latest_release_date: Option<String>,
    deployed_version: String,
    last_queried: Option<DateTime<Utc>>,
    version_regex_misses: u32,
    content_regex_misses: u32,
    announcements: Vec<Announcement>,
}

/// In-process [`LookupStatus`]
#[derive(Debug, Default)]
pub struct MemoryStatus {
    state: Mutex<StatusState>,
}

impl MemoryStatus {
    /// Status that already knows a latest and deployed version
    pub fn with_versions(latest: &str, deployed: &str) -> Self {
        Self {
            state: Mutex::new(StatusState {
                latest_version: latest.to_string(),
                deployed_version: deployed.to_string(),
                ..StatusState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn latest_release_date(&self) -> Option<String> {
        self.lock().latest_release_date.clone()
    }

    pub fn last_queried(&self) -> Option<DateTime<Utc>> {
        self.lock().last_queried
    }

    pub fn announcements(&self) -> Vec<Announcement> {
        self.lock().announcements.clone()
    }

    /// (version, content) regex miss counts
    pub fn regex_misses(&self) -> (u32, u32) {
        let state = self.lock();
        (state.version_regex_misses, state.content_regex_misses)
    }
}

impl LookupStatus for MemoryStatus {
    fn latest_version(&self) -> String {
        self.lock().latest_version.clone()
    }

    fn set_latest_version(&self, version: &str, release_date: Option<String>) {
        let mut state = self.lock();
        state.latest_version = version.to_string();
        state.latest_release_date = release_date;
    }

    fn deployed_version(&self) -> String {
        self.lock().deployed_version.clone()
    }

    fn set_deployed_version(&self, version: &str) {
        self.lock().deployed_version = version.to_string();
    }

    fn set_last_queried(&self) {
        self.lock().last_queried = Some(Utc::now());
    }

    fn announce_first_version(&self) {
        self.lock().announcements.push(Announcement::FirstVersion);
    }

    fn announce_query(&self) {
        self.lock().announcements.push(Announcement::Query);
    }

    fn record_version_regex_miss(&self) -> u32 {
        let mut state = self.lock();
        state.version_regex_misses += 1;
        state.version_regex_misses
    }

    fn record_content_regex_miss(&self) -> u32 {
        let mut state = self.lock();
        state.content_regex_misses += 1;
        state.content_regex_misses
    }

    fn reset_regex_misses(&self) {
        let mut state = self.lock();
        state.version_regex_misses = 0;
        state.content_regex_misses = 0;
    }
}
