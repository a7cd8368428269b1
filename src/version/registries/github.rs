//! GitHub REST API client for release and tag listings

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, error, warn};

use crate::config::GITHUB_PER_PAGE;
use crate::version::error::QueryError;
use crate::version::registries::{http_client, read_body};

/// Default base URL for GitHub API
const DEFAULT_BASE_URL: &str = "https://api.github.com";

static NEXT_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>;\s*rel="next""#).expect("valid link regex"));

static PAGE_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]page=(\d+)").expect("valid page regex"));

/// `{"message": ...}` envelope GitHub wraps errors in
#[derive(Debug, Deserialize)]
struct Message {
    message: String,
}

/// The parts of a GitHub response a lookup acts on
#[derive(Debug, Clone, Default)]
pub struct GitHubResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub link: Option<String>,
    pub body: Vec<u8>,
}

/// Client for the GitHub releases/tags endpoints
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
}

impl GitHubClient {
    /// Creates a new GitHubClient with a custom base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: http_client(),
            base_url: base_url.to_string(),
        }
    }

    /// URL of one page of `/releases` (or `/tags`) for `repo`
    pub fn releases_url(&self, repo: &str, tags: bool, page: u32) -> String {
        let endpoint = if tags { "tags" } else { "releases" };
        let url = format!("{}/repos/{}/{}", self.base_url, repo, endpoint);
        if page <= 1 {
            url
        } else {
            format!("{}?page={}&per_page={}", url, page, GITHUB_PER_PAGE)
        }
    }

    /// Conditional GET of `url`
    pub async fn get(
        &self,
        url: &str,
        access_token: Option<&str>,
        etag: Option<&str>,
    ) -> Result<GitHubResponse, reqwest::Error> {
        let mut request = self
            .client
            .get(url)
            .header("Connection", "close")
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            request = request.header("Authorization", format!("token {}", token));
        }
        if let Some(etag) = etag.filter(|e| !e.is_empty()) {
            request = request.header("If-None-Match", etag);
        }

        let response = request.send().await?;
        debug!("GET {} -> {}", url, response.status());

        let status = response.status().as_u16();
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let etag = header("etag");
        let link = header("link");
        let body = read_body(response).await?;

        Ok(GitHubResponse {
            status,
            etag,
            link,
            body,
        })
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// `owner/repo` from either `owner/repo` or a github.com URL
pub fn normalize_repo(url: &str) -> String {
    let trimmed = url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let path = without_scheme
        .strip_prefix("www.github.com/")
        .or_else(|| without_scheme.strip_prefix("github.com/"))
        .unwrap_or(without_scheme);
    let path = path.trim_end_matches('/');
    path.strip_suffix(".git").unwrap_or(path).to_string()
}

/// Whether `repo` looks like `owner/repo`
pub fn is_valid_repo(repo: &str) -> bool {
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}

/// Drop the weak validator marker from an ETag
pub fn strip_weak_prefix(etag: &str) -> &str {
    etag.strip_prefix("W/").unwrap_or(etag)
}

/// Page number of the `rel="next"` link, if there is one
pub fn next_page(link: &str) -> Option<u32> {
    let target = NEXT_LINK.captures(link)?;
    let page = PAGE_PARAM.captures(&target[1])?;
    page[1].parse().ok()
}

/// Turn a non-200/304 response into the error to report
pub fn classify_error(status: u16, body: &str, repo: &str) -> QueryError {
    let err = match status {
        401 => {
            if body.contains("Bad credentials") {
                QueryError::BadCredentials
            } else {
                QueryError::Unauthorized(body.to_string())
            }
        }
        403 => {
            if body.contains("rate limit") {
                let err = QueryError::RateLimited;
                warn!("{}: {}", repo, err);
                return err;
            } else if !body.contains(r#""tag_name""#) {
                QueryError::MissingTagName {
                    url: repo.to_string(),
                    body: body.to_string(),
                }
            } else {
                QueryError::Forbidden(body.to_string())
            }
        }
        429 => match serde_json::from_str::<Message>(body) {
            Ok(message) => QueryError::TooManyRequests(Some(message.message)),
            Err(e) => {
                debug!("Failed to parse 429 body: {}", e);
                QueryError::TooManyRequests(None)
            }
        },
        _ => QueryError::UnexpectedStatus {
            status,
            body: body.to_string(),
        },
    };
    error!("{}: {}", repo, err);
    err
}
