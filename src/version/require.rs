//! Gates a candidate version must pass before it is accepted
//!
//! Each gate is skipped when unconfigured and the first miss is returned:
//!
//! 1. `regex_version` must match the version
//! 2. `regex_content` (with `{{ version }}` templated in) must match the body,
//!    or an asset's name or download URL
//! 3. `command` must exit successfully
//! 4. `docker` tag must exist in its registry

use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::version::docker::{DockerDefaults, DockerTagRequirement};
use crate::version::error::RequireError;
use crate::version::registry::RegistryClients;
use crate::version::release::Asset;
use crate::version::status::LookupStatus;
use crate::version::template::{check_template, render_version};

/// Version used to check that templated regexes compile
const SAMPLE_VERSION: &str = "1.2.3";

/// What a content regex is matched against
#[derive(Debug, Clone, Copy)]
pub enum ContentSource<'a> {
    /// A raw response body
    Body(&'a str),
    /// Release assets; a match yields the asset's creation time
    Assets(&'a [Asset]),
}

/// Conditions a candidate version has to meet
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Requirement {
    pub regex_version: Option<String>,
    pub regex_content: Option<String>,
    /// argv, each element may use `{{ version }}`
    pub command: Vec<String>,
    pub docker: Option<DockerTagRequirement>,
}

fn compile(pattern: &str) -> Result<Regex, RequireError> {
    Regex::new(pattern).map_err(|e| RequireError::InvalidRegex {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

impl Requirement {
    /// Attach the docker defaults layers, if there is a docker gate
    pub fn set_docker_defaults(&mut self, defaults: Vec<Arc<DockerDefaults>>) {
        if let Some(docker) = self.docker.as_mut() {
            docker.set_defaults(defaults);
        }
    }

    /// Validate every gate, returning one line per problem
    pub fn validate(&self, prefix: &str) -> Vec<String> {
        let mut problems = Vec::new();

        if let Some(pattern) = self.regex_version.as_deref().filter(|p| !p.is_empty()) {
            if let Err(e) = Regex::new(pattern) {
                problems.push(format!("{prefix}.regex_version: {pattern:?} <invalid> ({e})"));
            }
        }

        if let Some(pattern) = self.regex_content.as_deref().filter(|p| !p.is_empty()) {
            if !check_template(pattern) {
                problems.push(format!(
                    "{prefix}.regex_content: {pattern:?} <invalid> (didn't pass templating)"
                ));
            } else if let Err(e) = Regex::new(&render_version(pattern, SAMPLE_VERSION)) {
                problems.push(format!("{prefix}.regex_content: {pattern:?} <invalid> ({e})"));
            }
        }

        for (i, arg) in self.command.iter().enumerate() {
            if !check_template(arg) {
                problems.push(format!(
                    "{prefix}.command[{i}]: {arg:?} <invalid> (didn't pass templating)"
                ));
            }
        }

        if let Some(docker) = &self.docker {
            problems.extend(docker.validate(&format!("{prefix}.docker")));
        }

        problems
    }

    /// Version regex gate
    pub fn check_version(
        &self,
        version: &str,
        status: &dyn LookupStatus,
    ) -> Result<(), RequireError> {
        let Some(pattern) = self.regex_version.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(());
        };

        if compile(pattern)?.is_match(version) {
            return Ok(());
        }

        let err = RequireError::VersionMismatch {
            version: version.to_string(),
        };
        debug!("{}", err);
        if status.record_version_regex_miss() == 1 {
            info!("{}", err);
        }
        Err(err)
    }

    /// Content regex gate.
    ///
    /// Returns the creation time of the matching asset, when matched against
    /// assets that carry one.
    pub fn check_content(
        &self,
        version: &str,
        source: ContentSource<'_>,
        status: &dyn LookupStatus,
    ) -> Result<Option<String>, RequireError> {
        let Some(template) = self.regex_content.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let pattern = render_version(template, version);
        let re = compile(&pattern)?;

        match source {
            ContentSource::Body(body) => {
                if re.is_match(body) {
                    return Ok(None);
                }
            }
            ContentSource::Assets(assets) => {
                if let Some(asset) = assets
                    .iter()
                    .find(|a| re.is_match(&a.name) || re.is_match(&a.browser_download_url))
                {
                    debug!("Content regex matched asset {:?}", asset.name);
                    return Ok(asset.created_at.clone().filter(|d| !d.is_empty()));
                }
            }
        }

        let err = RequireError::ContentMismatch {
            regex: pattern.into_owned(),
            version: version.to_string(),
        };
        debug!("{}", err);
        if status.record_content_regex_miss() == 1 {
            info!("{}", err);
        }
        Err(err)
    }

    /// Command gate
    pub async fn exec_command(&self, version: &str) -> Result<(), RequireError> {
        let Some((program, args)) = self.command.split_first() else {
            return Ok(());
        };

        let program = render_version(program, version).into_owned();
        let args: Vec<String> = args
            .iter()
            .map(|arg| render_version(arg, version).into_owned())
            .collect();
        let command_line = std::iter::once(program.as_str())
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        debug!("Executing {:?}", command_line);
        let output = tokio::process::Command::new(&program)
            .args(&args)
            .output()
            .await
            .map_err(|e| RequireError::CommandSpawn {
                command: command_line.clone(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(RequireError::CommandFailed {
                command: command_line,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }

    /// Docker tag gate
    pub async fn check_docker(
        &self,
        version: &str,
        registries: &RegistryClients,
    ) -> Result<(), RequireError> {
        let Some(docker) = &self.docker else {
            return Ok(());
        };

        docker.check_tag(version, registries).await?;
        info!(
            "found {} container \"{}:{}\"",
            docker
                .resolved_type()
                .map(|t| t.as_str())
                .unwrap_or_default(),
            docker.image,
            docker.tag_for(version)
        );
        Ok(())
    }

    /// Run every gate in order, returning a release date override from the
    /// content gate, if any
    pub async fn check(
        &self,
        version: &str,
        source: ContentSource<'_>,
        status: &dyn LookupStatus,
        registries: &RegistryClients,
    ) -> Result<Option<String>, RequireError> {
        self.check_version(version, status)?;
        let release_date = self.check_content(version, source, status)?;
        self.exec_command(version).await?;
        self.check_docker(version, registries).await?;
        Ok(release_date)
    }

    /// Take over derived state from the requirement being replaced
    pub fn inherit(&self, old: &Requirement) {
        if let (Some(docker), Some(old_docker)) = (&self.docker, &old.docker) {
            docker.inherit(old_docker);
        }
    }
}
