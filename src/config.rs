use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::version::docker::DockerDefaults;
use crate::version::error::ConfigError;
use crate::version::filter::FilterChain;
use crate::version::registries::github::{is_valid_repo, normalize_repo};
use crate::version::require::Requirement;

// =============================================================================
// Time-related constants
// =============================================================================

/// Timeout for every outgoing HTTP request in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Delay before re-checking an apparent version change (1 second)
pub const CONFIRM_DELAY_MS: u64 = 1_000;

/// Delay between starting each service query to avoid rate limiting (10ms)
pub const QUERY_STAGGER_DELAY_MS: u64 = 10;

/// A cached query token must stay valid at least this long to be handed out
pub const TOKEN_EXPIRY_MARGIN_SECS: i64 = 2;

/// Lifetime of tokens that never really expire (static secrets, anonymous Hub)
pub const STATIC_TOKEN_LIFETIME_DAYS: i64 = 365;

/// Lifetime of tokens obtained from a registry token endpoint (5 minutes)
pub const REFRESHED_TOKEN_LIFETIME_SECS: i64 = 5 * 60;

// =============================================================================
// Size constants
// =============================================================================

/// Upper bound on any response body we read (10 MiB)
pub const MAX_BODY_BYTES: usize = 10 << 20;

/// Page size requested when following GitHub pagination
pub const GITHUB_PER_PAGE: u32 = 30;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("release-probe/", env!("CARGO_PKG_VERSION"));

/// Root of a probe configuration file
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProbeConfig {
    /// Service-level defaults shared by every lookup
    pub defaults: DefaultsConfig,
    /// Application-wide fallbacks, consulted after `defaults`
    pub hard_defaults: Option<DefaultsConfig>,
    /// Lookups keyed by service id, in file order
    pub services: IndexMap<String, LookupConfig>,
}

impl ProbeConfig {
    /// Read and decode a JSON probe configuration
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Decode {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Hard defaults from the file, or the built-in ones
    pub fn hard_defaults(&self) -> DefaultsConfig {
        self.hard_defaults
            .clone()
            .unwrap_or_else(DefaultsConfig::hard)
    }

    /// Check every layer and service, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = self.defaults.require.docker.validate("defaults.require.docker");
        if let Some(hard) = &self.hard_defaults {
            problems.extend(hard.require.docker.validate("hard_defaults.require.docker"));
        }
        for (id, service) in &self.services {
            problems.extend(service.validate(&format!("services.{id}")));
        }
        ConfigError::from_problems(problems)
    }
}

/// One override layer below the per-service settings
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DefaultsConfig {
    pub access_token: Option<String>,
    pub use_prerelease: Option<bool>,
    pub semantic_versioning: Option<bool>,
    pub require: RequireDefaultsConfig,
}

impl DefaultsConfig {
    /// Built-in hard defaults
    pub fn hard() -> Self {
        Self {
            access_token: None,
            use_prerelease: Some(false),
            semantic_versioning: Some(true),
            require: RequireDefaultsConfig {
                docker: DockerDefaults::with_type("hub"),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RequireDefaultsConfig {
    pub docker: DockerDefaults,
}

/// Configuration of a single GitHub lookup
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LookupConfig {
    /// `owner/repo` or `https://github.com/owner/repo`
    pub url: String,
    pub access_token: Option<String>,
    pub use_prerelease: Option<bool>,
    pub semantic_versioning: Option<bool>,
    pub url_commands: FilterChain,
    pub require: Option<Requirement>,
}

impl LookupConfig {
    /// Validate this lookup, returning one line per problem
    pub fn validate(&self, prefix: &str) -> Vec<String> {
        let mut problems = Vec::new();

        if self.url.trim().is_empty() {
            problems.push(format!("{prefix}.url: <required>"));
        } else if !is_valid_repo(&normalize_repo(&self.url)) {
            problems.push(format!(
                "{prefix}.url: {:?} <invalid> (expected owner/repo)",
                self.url
            ));
        }
        problems.extend(self.url_commands.validate(&format!("{prefix}.url_commands")));
        if let Some(require) = &self.require {
            problems.extend(require.validate(&format!("{prefix}.require")));
        }

        problems
    }
}

/// Returns the first layer value that is set and non-empty
pub fn first_non_empty<'a, I>(layers: I) -> Option<&'a str>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    layers.into_iter().flatten().find(|value| !value.is_empty())
}

/// Returns the first layer value that is set
pub fn first_set<T: Copy, I>(layers: I) -> Option<T>
where
    I: IntoIterator<Item = Option<T>>,
{
    layers.into_iter().flatten().next()
}

/// Returns the path to the data directory for release-probe.
/// Uses $XDG_DATA_HOME/release-probe if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/release-probe,
/// or ./release-probe if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("release-probe.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("release-probe")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::filter::FilterCommand;
    use rstest::rstest;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn probe_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<ProbeConfig>(json!({
            "services": {
                "argus": { "url": "release-argus/Argus" }
            }
        }))
        .unwrap();

        assert!(result.hard_defaults.is_none());
        assert_eq!(result.defaults.access_token, None);
        assert_eq!(result.services["argus"].url, "release-argus/Argus");
        assert!(result.services["argus"].url_commands.is_empty());
        assert!(result.services["argus"].require.is_none());
    }

    #[test]
    fn probe_config_keeps_service_order() {
        let result = serde_json::from_str::<ProbeConfig>(
            r#"{
                "services": {
                    "zeta": { "url": "a/z" },
                    "alpha": { "url": "a/a" },
                    "mid": { "url": "a/m" }
                }
            }"#,
        )
        .unwrap();

        let ids: Vec<&str> = result.services.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn probe_config_parses_full_lookup() {
        let result = serde_json::from_value::<ProbeConfig>(json!({
            "defaults": {
                "access_token": "ghp_default",
                "require": {
                    "docker": { "type": "ghcr", "ghcr": { "token": "ghp_shared" } }
                }
            },
            "services": {
                "argus": {
                    "url": "https://github.com/release-argus/Argus",
                    "use_prerelease": true,
                    "url_commands": { "type": "regex", "regex": "v([0-9.]+)" },
                    "require": {
                        "regex_version": "^[0-9.]+$",
                        "docker": { "image": "releaseargus/argus", "tag": "{{ version }}" }
                    }
                }
            }
        }))
        .unwrap();

        let service = &result.services["argus"];
        assert_eq!(service.use_prerelease, Some(true));
        assert_eq!(service.url_commands.len(), 1);
        assert!(matches!(
            service.url_commands.commands()[0],
            FilterCommand::Regex { .. }
        ));
        let require = service.require.as_ref().unwrap();
        assert_eq!(require.regex_version.as_deref(), Some("^[0-9.]+$"));
        assert_eq!(result.defaults.access_token.as_deref(), Some("ghp_default"));
    }

    #[test]
    fn from_file_reports_decode_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = ProbeConfig::from_file(file.path()).unwrap_err();

        assert!(matches!(err, ConfigError::Decode { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn from_file_reads_valid_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"services": {{"one": {{"url": "o/r"}}}}}}"#).unwrap();

        let config = ProbeConfig::from_file(file.path()).unwrap();

        assert_eq!(config.services.len(), 1);
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        let config = serde_json::from_value::<ProbeConfig>(json!({
            "services": {
                "argus": {
                    "url": "https://github.com/release-argus/Argus",
                    "url_commands": [{ "type": "split", "text": "-", "index": 0 }],
                    "require": { "regex_content": "argus-{{ version }}.linux" }
                }
            }
        }))
        .unwrap();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_reports_every_problem_with_field_path() {
        let config = serde_json::from_value::<ProbeConfig>(json!({
            "defaults": { "require": { "docker": { "type": "ecr" } } },
            "services": {
                "empty": { "url": "" },
                "bad": {
                    "url": "not-a-repo",
                    "url_commands": { "type": "regex", "regex": "v([0-9" },
                    "require": { "regex_version": "(" }
                }
            }
        }))
        .unwrap();

        let err = config.validate().unwrap_err();
        let ConfigError::Invalid(problems) = &err else {
            panic!("expected Invalid, got {err:?}");
        };

        assert!(problems.iter().any(|p| p.starts_with("defaults.require.docker.type:")));
        assert!(problems.contains(&"services.empty.url: <required>".to_string()));
        assert!(problems.iter().any(|p| p.starts_with("services.bad.url:")));
        assert!(problems.iter().any(|p| p.starts_with("services.bad.url_commands[0].regex:")));
        assert!(problems.iter().any(|p| p.starts_with("services.bad.require.regex_version:")));
    }

    #[test]
    fn hard_defaults_fall_back_to_built_in_values() {
        let config = ProbeConfig::default();

        let hard = config.hard_defaults();

        assert_eq!(hard.use_prerelease, Some(false));
        assert_eq!(hard.semantic_versioning, Some(true));
    }

    #[rstest]
    #[case(vec![Some("a"), Some("b")], Some("a"))]
    #[case(vec![None, Some(""), Some("b")], Some("b"))]
    #[case(vec![Some(""), None], None)]
    #[case(vec![], None)]
    fn first_non_empty_returns_expected(
        #[case] layers: Vec<Option<&str>>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(first_non_empty(layers), expected);
    }

    #[rstest]
    #[case(vec![None, Some(false), Some(true)], Some(false))]
    #[case(vec![None, None], None)]
    fn first_set_returns_expected(
        #[case] layers: Vec<Option<bool>>,
        #[case] expected: Option<bool>,
    ) {
        assert_eq!(first_set(layers), expected);
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/release-probe"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/release-probe"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./release-probe"));
    }
}
