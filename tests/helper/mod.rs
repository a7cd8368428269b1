//! Shared test utilities

#![allow(dead_code)]

pub mod github;
pub mod registry;

pub use github::*;
pub use registry::*;
