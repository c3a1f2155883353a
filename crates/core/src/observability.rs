//! Observability utilities for standardized tracing spans and structured fields
//!
//! Every orchestrator operation and pipeline step runs inside one of the
//! canonical spans below, so diagnostics for a gitspace can be filtered by
//! `container_name` or `gitspace_id` regardless of which step emitted them.

use std::time::Instant;
use tracing::{span, Span};

/// Canonical span names for orchestrator workflows
pub mod spans {
    pub const GITSPACE_START: &str = "gitspace.start";
    pub const GITSPACE_STOP: &str = "gitspace.stop";
    pub const GITSPACE_REMOVE: &str = "gitspace.remove";
    pub const CONTAINER_PROBE: &str = "container.probe";
    pub const CONTAINER_PULL: &str = "container.pull";
    pub const CONTAINER_CREATE: &str = "container.create";
    pub const IDE_SETUP: &str = "ide.setup";
    pub const IDE_RUN: &str = "ide.run";
    pub const CODE_CLONE: &str = "code.clone";
    pub const LIFECYCLE_POST_CREATE: &str = "lifecycle.post_create";
}

/// Common field names for structured logging
pub mod fields {
    pub const CONTAINER_NAME: &str = "container_name";
    pub const GITSPACE_ID: &str = "gitspace_id";
    pub const IMAGE: &str = "image";
    pub const IDE: &str = "ide";
    pub const DURATION_MS: &str = "duration_ms";
}

/// Span for a create-and-start operation
pub fn gitspace_start_span(container_name: &str, gitspace_id: i64) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::GITSPACE_START,
        duration_ms = tracing::field::Empty,
        container_name = %container_name,
        gitspace_id = gitspace_id
    )
}

/// Span for a stop operation
pub fn gitspace_stop_span(container_name: &str, gitspace_id: i64) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::GITSPACE_STOP,
        duration_ms = tracing::field::Empty,
        container_name = %container_name,
        gitspace_id = gitspace_id
    )
}

/// Span for a stop-and-remove operation
pub fn gitspace_remove_span(container_name: &str, gitspace_id: i64) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::GITSPACE_REMOVE,
        duration_ms = tracing::field::Empty,
        container_name = %container_name,
        gitspace_id = gitspace_id
    )
}

/// Span for a container state probe
pub fn container_probe_span(container_name: &str) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::DEBUG,
        spans::CONTAINER_PROBE,
        container_name = %container_name
    )
}

/// Span for an image pull
pub fn container_pull_span(image: &str) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::CONTAINER_PULL,
        duration_ms = tracing::field::Empty,
        image = %image
    )
}

/// Span for container creation
pub fn container_create_span(container_name: &str, image: &str) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::CONTAINER_CREATE,
        duration_ms = tracing::field::Empty,
        container_name = %container_name,
        image = %image
    )
}

/// Span for IDE setup
pub fn ide_setup_span(ide: &str) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::IDE_SETUP,
        duration_ms = tracing::field::Empty,
        ide = %ide
    )
}

/// Span for starting the IDE
pub fn ide_run_span(ide: &str) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::IDE_RUN,
        duration_ms = tracing::field::Empty,
        ide = %ide
    )
}

/// Span for the repository checkout
pub fn code_clone_span(repo_url: &str, branch: &str) -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::CODE_CLONE,
        duration_ms = tracing::field::Empty,
        repo_url = %repo_url,
        branch = %branch
    )
}

/// Span for the post-create command
pub fn post_create_span() -> Span {
    span!(
        target: "gitspace_core::observability",
        tracing::Level::INFO,
        spans::LIFECYCLE_POST_CREATE,
        duration_ms = tracing::field::Empty
    )
}

/// Records `duration_ms` on a span when completed
///
/// The span is not entered here; async code attaches it to a future with
/// [`tracing::Instrument::instrument`] using [`TimedSpan::span`].
#[derive(Debug)]
pub struct TimedSpan {
    span: Span,
    start_time: Instant,
}

impl TimedSpan {
    /// Start timing an existing span
    pub fn new(span: Span) -> Self {
        Self {
            span,
            start_time: Instant::now(),
        }
    }

    /// Complete the span and record duration
    pub fn complete(self) {
        let duration_ms = self.start_time.elapsed().as_millis() as u64;
        self.span.record(fields::DURATION_MS, duration_ms);
    }

    /// Handle onto the span for instrumenting futures
    pub fn span(&self) -> Span {
        self.span.clone()
    }
}

/// Create a [`TimedSpan`] from one of the span constructors
#[macro_export]
macro_rules! timed_span {
    ($span_fn:expr) => {{
        let span = $span_fn;
        $crate::observability::TimedSpan::new(span)
    }};
}
