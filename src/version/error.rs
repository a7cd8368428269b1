use std::path::PathBuf;

use thiserror::Error;

/// Problems found while loading or validating configuration.
///
/// Raised before any poll runs; never produced mid-query.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

impl ConfigError {
    /// Collect validation problems into an error, if there were any
    pub fn from_problems(problems: Vec<String>) -> Result<(), ConfigError> {
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }
}

/// A filter command could not produce a value from its input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("regex {pattern:?} didn't return any matches{}", on_text(.preview))]
    NoMatches {
        pattern: String,
        preview: Option<String>,
    },

    #[error("split didn't find any {separator:?} to split on")]
    SeparatorNotFound { separator: String },

    #[error("{kind} ({needle}) returned {len} elements but the index wants element number {wanted}")]
    IndexOutOfRange {
        kind: &'static str,
        needle: String,
        len: usize,
        wanted: i64,
    },

    #[error("regex {pattern:?} is invalid: {message}")]
    InvalidRegex { pattern: String, message: String },
}

fn on_text(preview: &Option<String>) -> String {
    preview
        .as_ref()
        .map(|text| format!(" on {text:?}"))
        .unwrap_or_default()
}

/// Transport and protocol failures talking to a container registry
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("{registry} token refresh failed: {message}")]
    TokenRefresh {
        registry: &'static str,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A candidate version did not satisfy one of the requirement gates
#[derive(Debug, Error)]
pub enum RequireError {
    #[error("regex not matched on version {version:?}")]
    VersionMismatch { version: String },

    #[error("regex {regex:?} not matched on content for version {version:?}")]
    ContentMismatch { regex: String, version: String },

    #[error("regex {pattern:?} is invalid: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("command {command:?} failed to start: {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command {command:?} failed ({status}){}", stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("{image}:{tag} - {source}")]
    DockerTag {
        image: String,
        tag: String,
        #[source]
        source: RegistryError,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// Failures of a GitHub query cycle
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("github access token is invalid")]
    BadCredentials,

    #[error("unknown 401 response\n{0}")]
    Unauthorized(String),

    #[error("rate limit reached for GitHub")]
    RateLimited,

    #[error("tag_name not found at {url}\n{body}")]
    MissingTagName { url: String, body: String },

    #[error("unknown 403 response\n{0}")]
    Forbidden(String),

    #[error("too many requests made to GitHub{}", quoted_suffix(.0))]
    TooManyRequests(Option<String>),

    #[error("unknown status code {status}\n{body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("release data failed to parse\n{0}")]
    Decode(#[from] serde_json::Error),

    #[error("no releases were found matching the url_commands on page {page} of the API response")]
    NoFilteredReleases { page: u32 },

    #[error("no releases were found matching the require fields\n{0}")]
    NoReleaseMatched(#[source] RequireError),

    #[error("version {version:?} is not a valid semantic version")]
    NotSemantic { version: String },

    #[error("queried version {queried:?} is less than the deployed version {deployed:?}")]
    VersionRegression { queried: String, deployed: String },
}

fn quoted_suffix(message: &Option<String>) -> String {
    message
        .as_ref()
        .map(|m| format!(" - {m:?}"))
        .unwrap_or_default()
}
