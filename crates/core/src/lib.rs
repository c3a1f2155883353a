//! Core library for the gitspace orchestrator
//!
//! This crate provisions, resumes, stops and removes per-user development
//! containers ("gitspaces") on a Docker or Podman host: container identity and
//! state probing, the lifecycle and teardown drivers, IDE services, script
//! templates, operator log streams, logging, and error handling.

pub mod config;
pub mod container;
pub mod devcontainer;
pub mod docker;
pub mod errors;
pub mod ide;
pub mod infra;
pub mod logging;
pub mod logstream;
pub mod observability;
pub mod orchestrator;
pub mod runtime;
pub mod templates;

pub use orchestrator::{Orchestrator, PipelineResult};

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
