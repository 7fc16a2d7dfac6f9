//! Galaxy Beacon CLI - command-line interface for rebuilding and searching the beacon.
//!
//! This crate provides the CLI application that ties together all Galaxy Beacon components.

pub mod config;
pub mod criteria;
pub mod report;

pub use config::{Command, Config, RebuildArgs, SearchKind, SearchTarget};
