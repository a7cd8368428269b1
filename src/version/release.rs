//! GitHub release data and the policy/filter/sort step applied to it

use semver::Version;
use serde::Deserialize;
use tracing::debug;

use crate::version::filter::FilterChain;
use crate::version::semver::parse_version;

/// A release (or tag) as returned by the GitHub API
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Release {
    pub tag_name: Option<String>,
    /// `/tags` only carries `name`
    pub name: Option<String>,
    pub prerelease: bool,
    pub published_at: Option<String>,
    pub assets: Vec<Asset>,
}

impl Release {
    /// `tag_name`, falling back to `name`
    pub fn tag(&self) -> &str {
        self.tag_name
            .as_deref()
            .filter(|tag| !tag.is_empty())
            .or(self.name.as_deref())
            .unwrap_or_default()
    }
}

/// A downloadable asset attached to a release
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    pub created_at: Option<String>,
}

/// A release that passed prerelease policy and the filter chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredRelease {
    /// First value the filter chain produced for the tag
    pub version: String,
    /// Parsed form of `version` when semantic versioning is on
    pub semantic_version: Option<Version>,
    pub release: Release,
}

impl FilteredRelease {
    /// Version string to report: canonical semver when parsed
    pub fn display_version(&self) -> String {
        match &self.semantic_version {
            Some(version) => version.to_string(),
            None => self.version.clone(),
        }
    }
}

/// Apply prerelease policy and the filter chain, and order the result.
///
/// With `semantic_versioning` the output is sorted newest first and tags that
/// do not parse are dropped; otherwise encounter order is kept.
pub fn filter_releases(
    releases: &[Release],
    url_commands: &FilterChain,
    use_prerelease: bool,
    semantic_versioning: bool,
) -> Vec<FilteredRelease> {
    let mut filtered: Vec<FilteredRelease> = Vec::with_capacity(releases.len());

    for release in releases {
        if release.prerelease && !use_prerelease {
            continue;
        }

        let version = match url_commands.get_versions(release.tag()) {
            Ok(versions) => match versions.into_iter().next() {
                Some(version) => version,
                None => continue,
            },
            Err(e) => {
                debug!("Skipping tag {:?}: {}", release.tag(), e);
                continue;
            }
        };

        if !semantic_versioning {
            filtered.push(FilteredRelease {
                version,
                semantic_version: None,
                release: release.clone(),
            });
            continue;
        }

        let Some(semantic_version) = parse_version(&version) else {
            debug!("Skipping tag {:?}: not a semantic version", version);
            continue;
        };

        let item = FilteredRelease {
            version,
            semantic_version: Some(semantic_version),
            release: release.clone(),
        };
        insertion_sort(item, &mut filtered);
    }

    filtered
}

/// Insert `item` keeping `sorted` in descending semantic version order
fn insertion_sort(item: FilteredRelease, sorted: &mut Vec<FilteredRelease>) {
    let position =
        sorted.partition_point(|existing| existing.semantic_version >= item.semantic_version);
    sorted.insert(position, item);
}
