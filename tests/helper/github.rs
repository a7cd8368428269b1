//! GitHub lookup test utilities

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use release_probe::config::{DefaultsConfig, LookupConfig};
use release_probe::version::cache::EmptyListEtag;
use release_probe::version::lookup::{GitHubLookup, LookupContext};
use release_probe::version::registries::GitHubClient;
use release_probe::version::registry::RegistryClients;
use release_probe::version::status::{LookupStatus, MemoryStatus};

/// One entry of a `/releases` response
pub fn release_json(tag: &str, published_at: &str) -> Value {
    json!({
        "tag_name": tag,
        "name": tag,
        "prerelease": false,
        "published_at": published_at,
        "assets": []
    })
}

/// One entry of a `/tags` response
pub fn tag_json(name: &str) -> Value {
    json!({
        "name": name,
        "commit": { "sha": "c5b8b8f", "url": "https://api.github.com/repos/o/r/commits/c5b8b8f" }
    })
}

/// Body for a list of entries
pub fn list_body(entries: Vec<Value>) -> String {
    Value::Array(entries).to_string()
}

/// Context pointing at `github_url` with no confirmation delay
pub fn create_test_context(github_url: &str, registries: RegistryClients) -> Arc<LookupContext> {
    Arc::new(
        LookupContext::new(
            DefaultsConfig::default(),
            DefaultsConfig::hard(),
            GitHubClient::new(github_url),
            registries,
            Arc::new(EmptyListEtag::default()),
        )
        .with_confirm_delay(Duration::ZERO),
    )
}

/// Lookup config decoded from JSON, as it would be read from a file
pub fn lookup_config(value: Value) -> LookupConfig {
    serde_json::from_value(value).unwrap()
}

/// Build a lookup reporting to a fresh [`MemoryStatus`]
pub fn create_test_lookup(
    config: LookupConfig,
    context: Arc<LookupContext>,
    status: MemoryStatus,
) -> (GitHubLookup, Arc<MemoryStatus>) {
    let status = Arc::new(status);
    let lookup = GitHubLookup::new(
        "test",
        config,
        context,
        Arc::clone(&status) as Arc<dyn LookupStatus>,
    );
    (lookup, status)
}
