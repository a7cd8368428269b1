//! Text filter pipeline turning raw tag or body text into candidate versions
//!
//! A [`FilterChain`] is an ordered list of [`FilterCommand`]s applied to a
//! working list of strings that starts as `[text]`. Commands without an index
//! may fan one string out into many.

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::version::error::FilterError;
use crate::version::template::regex_template;

/// Inputs at least this long are only quoted as a truncated preview in errors
const PREVIEW_LIMIT: usize = 20;

/// A single text transform
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterCommand {
    /// Extract regex matches (optionally one, optionally templated)
    Regex {
        regex: String,
        #[serde(default)]
        index: Option<i64>,
        #[serde(default)]
        template: Option<String>,
    },
    /// Literal replacement of every occurrence of `old`
    Replace {
        old: String,
        #[serde(default)]
        new: String,
    },
    /// Split on a literal separator (optionally keeping one piece)
    Split {
        text: String,
        #[serde(default)]
        index: Option<i64>,
    },
}

impl FilterCommand {
    /// Validate this command, returning one line per problem
    pub fn validate(&self, prefix: &str) -> Vec<String> {
        let mut problems = Vec::new();
        match self {
            FilterCommand::Regex { regex, .. } => {
                if regex.is_empty() {
                    problems.push(format!("{prefix}.regex: <required> (regex to use)"));
                } else if let Err(e) = Regex::new(regex) {
                    problems.push(format!("{prefix}.regex: {regex:?} <invalid> ({e})"));
                }
            }
            FilterCommand::Replace { old, .. } => {
                if old.is_empty() {
                    problems.push(format!("{prefix}.old: <required> (text you want replaced)"));
                }
            }
            FilterCommand::Split { text, .. } => {
                if text.is_empty() {
                    problems.push(format!("{prefix}.text: <required> (text to split on)"));
                }
            }
        }
        problems
    }

    /// Apply this command to one element, producing its replacement(s)
    fn apply(&self, text: &str) -> Result<Vec<String>, FilterError> {
        match self {
            FilterCommand::Regex {
                regex,
                index,
                template,
            } => apply_regex(regex, *index, template.as_deref(), text),
            FilterCommand::Replace { old, new } => Ok(vec![text.replace(old.as_str(), new)]),
            FilterCommand::Split { text: separator, index } => {
                apply_split(separator, *index, text)
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            FilterCommand::Regex { regex, index, .. } => {
                format!("Regexing {regex:?} with index {index:?}")
            }
            FilterCommand::Replace { old, new } => format!("Replacing {old:?} with {new:?}"),
            FilterCommand::Split { text, index } => {
                format!("Splitting on {text:?} with index {index:?}")
            }
        }
    }
}

/// Ordered sequence of filter commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterChain(Vec<FilterCommand>);

impl<'de> Deserialize<'de> for FilterChain {
    /// Accepts a single command object as well as a list of them
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            Many(Vec<FilterCommand>),
            One(FilterCommand),
        }

        Ok(match OneOrMany::deserialize(deserializer)? {
            OneOrMany::Many(commands) => FilterChain(commands),
            OneOrMany::One(command) => FilterChain(vec![command]),
        })
    }
}

impl From<Vec<FilterCommand>> for FilterChain {
    fn from(commands: Vec<FilterCommand>) -> Self {
        Self(commands)
    }
}

impl FilterChain {
    pub fn new(commands: Vec<FilterCommand>) -> Self {
        Self(commands)
    }

    pub fn commands(&self) -> &[FilterCommand] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate every command, returning one line per problem
    pub fn validate(&self, prefix: &str) -> Vec<String> {
        self.0
            .iter()
            .enumerate()
            .flat_map(|(i, command)| command.validate(&format!("{prefix}[{i}]")))
            .collect()
    }

    /// Candidate versions for `text`.
    ///
    /// An empty chain passes non-empty text through untouched and yields
    /// nothing for empty text.
    pub fn get_versions(&self, text: &str) -> Result<Vec<String>, FilterError> {
        if self.is_empty() {
            if text.is_empty() {
                return Ok(Vec::new());
            }
            return Ok(vec![text.to_string()]);
        }

        self.run(text)
    }

    /// Apply every command left to right to the working list `[text]`
    pub fn run(&self, text: &str) -> Result<Vec<String>, FilterError> {
        if self.is_empty() && text.is_empty() {
            return Ok(Vec::new());
        }

        let mut versions = vec![text.to_string()];
        for command in &self.0 {
            debug!("{} on {:?}", command.describe(), versions);

            let mut next = Vec::with_capacity(versions.len());
            for version in &versions {
                next.extend(command.apply(version)?);
            }
            versions = next;

            debug!("Resolved to {:?}", versions);
        }

        Ok(versions)
    }
}

/// Resolve a possibly negative index against `len` elements
fn resolve_index(index: i64, len: usize) -> Result<usize, i64> {
    let effective = if index < 0 { len as i64 + index } else { index };
    if effective < 0 || effective >= len as i64 {
        return Err(effective);
    }
    Ok(effective as usize)
}

fn apply_regex(
    pattern: &str,
    index: Option<i64>,
    template: Option<&str>,
    text: &str,
) -> Result<Vec<String>, FilterError> {
    let re = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let matches: Vec<_> = re.captures_iter(text).collect();
    if matches.is_empty() {
        return Err(FilterError::NoMatches {
            pattern: pattern.to_string(),
            preview: Some(preview(text)),
        });
    }

    match index {
        Some(index) => {
            let i = resolve_index(index, matches.len()).map_err(|effective| {
                FilterError::IndexOutOfRange {
                    kind: "regex",
                    needle: pattern.to_string(),
                    len: matches.len(),
                    wanted: effective + 1,
                }
            })?;
            Ok(vec![regex_template(&matches[i], template)])
        }
        None => Ok(matches
            .iter()
            .map(|caps| regex_template(caps, template))
            .collect()),
    }
}

fn apply_split(
    separator: &str,
    index: Option<i64>,
    text: &str,
) -> Result<Vec<String>, FilterError> {
    if !text.contains(separator) {
        return Err(FilterError::SeparatorNotFound {
            separator: separator.to_string(),
        });
    }

    let pieces: Vec<&str> = text.split(separator).collect();
    match index {
        Some(index) => {
            let i = resolve_index(index, pieces.len()).map_err(|effective| {
                FilterError::IndexOutOfRange {
                    kind: "split",
                    needle: separator.to_string(),
                    len: pieces.len(),
                    wanted: effective + 1,
                }
            })?;
            Ok(vec![pieces[i].to_string()])
        }
        None => Ok(pieces.into_iter().map(str::to_string).collect()),
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() < PREVIEW_LIMIT {
        return text.to_string();
    }
    let head: String = text.chars().take(PREVIEW_LIMIT).collect();
    format!("{head}...")
}
