//! Latest-release discovery for GitHub repositories
//!
//! This module provides the core functionality for finding the newest release of a
//! repository that passes a chain of text filters and release requirements.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   GitHub    │────▶│    Cache    │◀────│   Lookup    │
//! │  (fetch)    │     │ (ETag/page) │     │ (confirm)   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                     ┌──────────────────────────┤
//!                     ▼                          ▼
//!              ┌─────────────┐           ┌─────────────┐     ┌─────────────┐
//!              │   Filter    │           │   Require   │────▶│  Registries │
//!              │ (url_cmds)  │           │ (gates)     │     │ (hub,ghcr,  │
//!              └─────────────┘           └─────────────┘     │  quay)      │
//!                                                            └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Per-lookup ETag/release cache and the shared empty-list ETag
//! - [`docker`]: Docker tag requirement and its layered credentials
//! - [`error`]: Error types for every component
//! - [`filter`]: Regex/replace/split filter pipeline
//! - [`lookup`]: GitHub query engine with two-phase confirmation
//! - [`registry`]: Container registry trait and the client set
//! - [`registries`]: Concrete registry and GitHub clients
//! - [`release`]: GitHub release data and release filtering
//! - [`require`]: Requirement gates (version regex, content regex, command, docker)
//! - [`semver`]: Shared semver utilities
//! - [`status`]: Status collaborator a lookup reports to
//! - [`template`]: `{{ version }}` templating and env expansion

pub mod cache;
pub mod docker;
pub mod error;
pub mod filter;
pub mod lookup;
pub mod registries;
pub mod registry;
pub mod release;
pub mod require;
pub mod semver;
pub mod status;
pub mod template;
