//! GitHub lookup E2E tests against a mock GitHub API

mod helper;

use std::sync::Arc;

use mockito::Server;
use serde_json::json;

use helper::{
    MockRegistry, create_test_context, create_test_lookup, list_body, lookup_config,
    registry_clients, release_json, tag_json,
};
use release_probe::version::cache::DEFAULT_EMPTY_LIST_ETAG;
use release_probe::version::docker::DockerRegistryType;
use release_probe::version::error::QueryError;
use release_probe::version::registry::RegistryClients;
use release_probe::version::status::{Announcement, LookupStatus, MemoryStatus};

#[tokio::test]
async fn empty_release_list_falls_back_to_tags_once() {
    let mut server = Server::new_async().await;
    let releases = server
        .mock("GET", "/repos/owner/repo/releases")
        .with_status(200)
        .with_header("etag", "W/\"empty\"")
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;
    let tags = server
        .mock("GET", "/repos/owner/repo/tags")
        .with_status(200)
        .with_header("etag", "\"tags\"")
        .with_body(list_body(vec![tag_json("v1.2"), tag_json("v1.1.0")]))
        .expect(2)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context.clone(),
        MemoryStatus::default(),
    );

    let new_version = lookup.query().await.unwrap();

    releases.assert_async().await;
    tags.assert_async().await;
    assert!(!new_version);
    assert_eq!(status.latest_version(), "1.2.0");
    assert_eq!(status.deployed_version(), "1.2.0");
    assert_eq!(status.announcements(), vec![Announcement::FirstVersion]);
    assert!(lookup.cache().tag_fallback());
    assert_eq!(context.empty_list_etag.get(), "\"empty\"");
}

#[tokio::test]
async fn empty_release_list_with_own_token_keeps_shared_etag() {
    let mut server = Server::new_async().await;
    let releases = server
        .mock("GET", "/repos/owner/repo/releases")
        .match_header("authorization", "token ghp_own")
        .with_status(200)
        .with_header("etag", "\"private\"")
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;
    let tags = server
        .mock("GET", "/repos/owner/repo/tags")
        .with_status(200)
        .with_body(list_body(vec![tag_json("1.0.0")]))
        .expect(2)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, _status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo", "access_token": "ghp_own" })),
        context.clone(),
        MemoryStatus::default(),
    );

    lookup.query().await.unwrap();

    releases.assert_async().await;
    tags.assert_async().await;
    assert_eq!(context.empty_list_etag.get(), DEFAULT_EMPTY_LIST_ETAG);
}

#[tokio::test]
async fn not_modified_without_cache_falls_back_to_tags() {
    let mut server = Server::new_async().await;
    let releases = server
        .mock("GET", "/repos/owner/repo/releases")
        .match_header("if-none-match", DEFAULT_EMPTY_LIST_ETAG)
        .with_status(304)
        .expect(1)
        .create_async()
        .await;
    let tags = server
        .mock("GET", "/repos/owner/repo/tags")
        .with_status(200)
        .with_body(list_body(vec![tag_json("2.0.0")]))
        .expect(2)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context,
        MemoryStatus::default(),
    );

    lookup.query().await.unwrap();

    releases.assert_async().await;
    tags.assert_async().await;
    assert_eq!(status.latest_version(), "2.0.0");
}

#[tokio::test]
async fn repository_without_releases_or_tags_reports_no_version() {
    let mut server = Server::new_async().await;
    let releases = server
        .mock("GET", "/repos/owner/repo/releases")
        .with_status(304)
        .expect(1)
        .create_async()
        .await;
    let tags = server
        .mock("GET", "/repos/owner/repo/tags")
        .with_status(304)
        .expect(1)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context,
        MemoryStatus::default(),
    );

    let err = lookup.query().await.unwrap_err();

    releases.assert_async().await;
    tags.assert_async().await;
    assert!(matches!(err, QueryError::NoFilteredReleases { page: 1 }));
    assert!(!lookup.cache().tag_fallback());
    assert_eq!(status.latest_version(), "");
}

#[tokio::test]
async fn confirmed_change_is_reported_as_new() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/owner/repo/releases")
        .with_status(200)
        .with_header("etag", "\"v110\"")
        .with_body(list_body(vec![
            release_json("v1.1.0", "2024-03-01T12:00:00Z"),
            release_json("v1.0.0", "2024-01-15T00:00:00Z"),
        ]))
        .expect(2)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({ "url": "https://github.com/owner/repo" })),
        context,
        MemoryStatus::with_versions("1.0.0", "1.0.0"),
    );

    let new_version = lookup.query().await.unwrap();

    mock.assert_async().await;
    assert!(new_version);
    assert_eq!(status.latest_version(), "1.1.0");
    assert_eq!(status.deployed_version(), "1.0.0");
    assert_eq!(
        status.latest_release_date().as_deref(),
        Some("2024-03-01T12:00:00Z")
    );
    assert!(status.last_queried().is_some());
    assert!(status.announcements().is_empty());
}

#[tokio::test]
async fn change_not_seen_on_second_check_is_dropped() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/repos/owner/repo/releases")
        .match_header("if-none-match", DEFAULT_EMPTY_LIST_ETAG)
        .with_status(200)
        .with_header("etag", "\"briefly-new\"")
        .with_body(list_body(vec![release_json("1.1.0", "")]))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/repos/owner/repo/releases")
        .match_header("if-none-match", "\"briefly-new\"")
        .with_status(200)
        .with_header("etag", "\"rolled-back\"")
        .with_body(list_body(vec![release_json("1.0.0", "")]))
        .expect(1)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context,
        MemoryStatus::with_versions("1.0.0", "1.0.0"),
    );

    let new_version = lookup.query().await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert!(!new_version);
    assert_eq!(status.latest_version(), "1.0.0");
    assert_eq!(status.announcements(), vec![Announcement::Query]);
    assert_eq!(lookup.cache().etag(), "\"rolled-back\"");
}

#[tokio::test]
async fn older_version_is_rejected() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/owner/repo/releases")
        .with_status(200)
        .with_body(list_body(vec![release_json("1.9.0", "")]))
        .expect(1)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context,
        MemoryStatus::with_versions("2.0.0", "2.0.0"),
    );

    let err = lookup.query().await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, QueryError::VersionRegression { .. }));
    assert_eq!(status.latest_version(), "2.0.0");
}

#[tokio::test]
async fn version_below_latest_but_above_deployed_is_accepted() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/owner/repo/releases")
        .with_status(200)
        .with_body(list_body(vec![release_json("1.5.0", "")]))
        .expect(2)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context,
        MemoryStatus::with_versions("2.0.0", "1.0.0"),
    );

    let new_version = lookup.query().await.unwrap();

    mock.assert_async().await;
    assert!(new_version);
    assert_eq!(status.latest_version(), "1.5.0");
    assert_eq!(status.deployed_version(), "1.0.0");
}

#[tokio::test]
async fn second_check_commits_its_own_release_date() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("GET", "/repos/owner/repo/releases")
        .match_header("if-none-match", DEFAULT_EMPTY_LIST_ETAG)
        .with_status(200)
        .with_header("etag", "\"first\"")
        .with_body(list_body(vec![release_json("1.1.0", "2024-01-01T00:00:00Z")]))
        .expect(1)
        .create_async()
        .await;
    let second = server
        .mock("GET", "/repos/owner/repo/releases")
        .match_header("if-none-match", "\"first\"")
        .with_status(200)
        .with_header("etag", "\"second\"")
        .with_body(list_body(vec![
            release_json("1.2.0", ""),
            release_json("1.1.0", "2024-01-01T00:00:00Z"),
        ]))
        .expect(1)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context,
        MemoryStatus::with_versions("1.0.0", "1.0.0"),
    );

    let new_version = lookup.query().await.unwrap();

    first.assert_async().await;
    second.assert_async().await;
    assert!(new_version);
    assert_eq!(status.latest_version(), "1.2.0");
    assert_eq!(status.latest_release_date(), None);
}

#[tokio::test]
async fn next_page_is_queried_when_nothing_on_first_page_passes() {
    let mut server = Server::new_async().await;
    let page_1 = server
        .mock("GET", "/repos/owner/repo/releases")
        .with_status(200)
        .with_header(
            "link",
            r#"<https://api.github.com/repositories/1/releases?page=2>; rel="next", <https://api.github.com/repositories/1/releases?page=2>; rel="last""#,
        )
        .with_body(list_body(vec![release_json("3.0.0-rc.1", ""), release_json("1.5.0", "")]))
        .expect(1)
        .create_async()
        .await;
    let page_2 = server
        .mock("GET", "/repos/owner/repo/releases?page=2&per_page=30")
        .with_status(200)
        .with_body(list_body(vec![release_json("2.4.0", "2024-02-02T02:02:02Z")]))
        .expect(2)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({
            "url": "owner/repo",
            "require": { "regex_version": "^2\\." }
        })),
        context,
        MemoryStatus::default(),
    );

    lookup.query().await.unwrap();

    page_1.assert_async().await;
    page_2.assert_async().await;
    assert_eq!(status.latest_version(), "2.4.0");
    assert_eq!(status.regex_misses(), (0, 0));
}

#[tokio::test]
async fn last_page_without_match_returns_first_requirement_error() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/owner/repo/releases")
        .with_status(200)
        .with_body(list_body(vec![release_json("1.5.0", ""), release_json("1.4.0", "")]))
        .expect(1)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({
            "url": "owner/repo",
            "require": { "regex_version": "^2\\." }
        })),
        context,
        MemoryStatus::default(),
    );

    let err = lookup.query().await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, QueryError::NoReleaseMatched(_)));
    assert!(
        err.to_string()
            .starts_with("no releases were found matching the require fields\n")
    );
    assert!(err.to_string().contains("1.5.0"));
    assert_eq!(status.regex_misses().0, 2);
}

#[tokio::test]
async fn docker_requirement_skips_release_without_image_tag() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/release-argus/Argus/releases")
        .with_status(200)
        .with_body(list_body(vec![
            release_json("0.19.0", "2024-06-01T00:00:00Z"),
            release_json("0.18.0", "2024-05-01T00:00:00Z"),
        ]))
        .expect(2)
        .create_async()
        .await;

    let registry = Arc::new(
        MockRegistry::new(DockerRegistryType::Ghcr)
            .with_tags("release-argus/argus", vec!["0.17.0", "0.18.0"]),
    );
    let context = create_test_context(&server.url(), registry_clients(registry.clone()));
    let (lookup, status) = create_test_lookup(
        lookup_config(json!({
            "url": "release-argus/Argus",
            "require": {
                "docker": {
                    "type": "ghcr",
                    "image": "release-argus/argus",
                    "tag": "{{ version }}",
                    "token": "ghp_secret"
                }
            }
        })),
        context,
        MemoryStatus::default(),
    );

    lookup.query().await.unwrap();

    mock.assert_async().await;
    assert_eq!(status.latest_version(), "0.18.0");
    assert_eq!(
        status.latest_release_date().as_deref(),
        Some("2024-05-01T00:00:00Z")
    );
    assert_eq!(registry.token_fetches(), 1);
}

#[tokio::test]
async fn replacement_lookup_reuses_cached_releases() {
    let mut server = Server::new_async().await;
    let fresh = server
        .mock("GET", "/repos/owner/repo/releases")
        .match_header("if-none-match", DEFAULT_EMPTY_LIST_ETAG)
        .with_status(200)
        .with_header("etag", "W/\"v1\"")
        .with_body(list_body(vec![release_json("1.0.0", "")]))
        .expect(1)
        .create_async()
        .await;
    let not_modified = server
        .mock("GET", "/repos/owner/repo/releases")
        .match_header("if-none-match", "\"v1\"")
        .with_status(304)
        .expect(2)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (old, _) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context.clone(),
        MemoryStatus::default(),
    );
    old.query().await.unwrap();

    let (replacement, status) = create_test_lookup(
        lookup_config(json!({ "url": "https://github.com/owner/repo" })),
        context,
        MemoryStatus::with_versions("1.0.0", "1.0.0"),
    );
    replacement.inherit(&old);
    let new_version = replacement.query().await.unwrap();

    fresh.assert_async().await;
    not_modified.assert_async().await;
    assert!(!new_version);
    assert_eq!(status.announcements(), vec![Announcement::Query]);
}

#[tokio::test]
async fn rate_limit_is_reported() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/owner/repo/releases")
        .with_status(403)
        .with_body(r#"{"message": "API rate limit exceeded for 127.0.0.1."}"#)
        .create_async()
        .await;

    let context = create_test_context(&server.url(), RegistryClients::default());
    let (lookup, _status) = create_test_lookup(
        lookup_config(json!({ "url": "owner/repo" })),
        context,
        MemoryStatus::default(),
    );

    let err = lookup.query().await.unwrap_err();

    mock.assert_async().await;
    assert!(matches!(err, QueryError::RateLimited));
}
