//! Small string templating helpers shared by filters and requirements

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static VERSION_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*version\s*\}\}").expect("valid placeholder regex"));

static ANY_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").expect("valid placeholder regex"));

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env regex"));

/// Variables a template may reference
const KNOWN_VARIABLES: &[&str] = &["version"];

/// Substitute every `{{ version }}` in `template`
pub fn render_version<'a>(template: &'a str, version: &str) -> Cow<'a, str> {
    VERSION_PLACEHOLDER.replace_all(template, regex::NoExpand(version))
}

/// Whether `template` only uses balanced, known placeholders
pub fn check_template(template: &str) -> bool {
    for caps in ANY_PLACEHOLDER.captures_iter(template) {
        if !KNOWN_VARIABLES.contains(&&caps[1]) {
            return false;
        }
    }

    let stripped = ANY_PLACEHOLDER.replace_all(template, "");
    !stripped.contains("{{") && !stripped.contains("}}")
}

/// Expand `${NAME}` environment references; unset variables are left as written
pub fn eval_env_vars(text: &str) -> Cow<'_, str> {
    if !text.contains("${") {
        return Cow::Borrowed(text);
    }

    ENV_VAR.replace_all(text, |caps: &Captures| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
}

/// Build the value of one regex match.
///
/// Without a template the last capture group is used (the whole match when the
/// pattern has no groups). With one, `$N` is replaced by group N, highest
/// group first so `$10` is not read as `$1` followed by `0`. Placeholders past
/// the last group are left in place.
pub fn regex_template(caps: &Captures, template: Option<&str>) -> String {
    let Some(template) = template else {
        let last = caps.len() - 1;
        return caps
            .get(last)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
    };

    let mut result = template.to_string();
    for group in (1..caps.len()).rev() {
        let value = caps.get(group).map(|m| m.as_str()).unwrap_or_default();
        result = result.replace(&format!("${group}"), value);
    }
    result
}
