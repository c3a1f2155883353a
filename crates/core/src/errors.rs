//! Error types and handling
//!
//! This module provides domain-specific error types for the gitspace orchestrator.
//! Each domain (configuration, container runtime, script templates, log streams)
//! has its own error enum; all of them are wrapped in [`GitspaceError`] for unified
//! handling by the lifecycle and teardown drivers.

use std::time::Duration;
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file parsing error
    #[error("Failed to parse configuration file: {message}")]
    Parsing { message: String },

    /// Configuration validation error
    #[error("Configuration validation error: {message}")]
    Validation { message: String },

    /// Configuration file I/O error
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
}

/// Container runtime errors
#[derive(Error, Debug)]
pub enum DockerError {
    /// Runtime binary is not installed or the daemon is not reachable
    #[error("Docker is not installed or not accessible")]
    NotInstalled,

    /// Runtime CLI command error
    #[error("Docker CLI error: {0}")]
    CLIError(String),

    /// Container not found
    #[error("Container not found: {id}")]
    ContainerNotFound { id: String },

    /// In-container command exited with a non-zero code
    #[error("Command execution failed with exit code {code}: {output}")]
    ExecFailed { code: i32, output: String },
}

/// Script template errors
#[derive(Error, Debug)]
pub enum TemplateError {
    /// No embedded template with this name
    #[error("Template not found: {name}")]
    NotFound { name: String },

    /// Template references a variable the payload does not provide
    #[error("Template {template} references unknown variable '{variable}'")]
    MissingVariable { template: String, variable: String },
}

/// Log stream errors
#[derive(Error, Debug)]
pub enum LogStreamError {
    /// Underlying sink I/O failure
    #[error("log stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be serialized
    #[error("log stream serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stream no longer accepts writes
    #[error("log stream for gitspace {gitspace_id} is closed")]
    Closed { gitspace_id: i64 },
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum GitspaceError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Container runtime errors
    #[error("Docker error: {0}")]
    Docker(#[from] DockerError),

    /// Script template errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// No IDE service is bound to the requested type
    #[error("unsupported IDE: {ide}")]
    UnsupportedIde { ide: String },

    /// Stop requested for a gitspace whose container no longer exists
    #[error("gitspace {name} is removed")]
    Removed { name: String },

    /// Container reported a status the lifecycle driver cannot act on
    #[error("gitspace {name} is in a bad state: {status}")]
    BadState { name: String, status: String },

    /// Error annotated with the operation and container it came from
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<GitspaceError>,
    },

    /// Writing to or flushing the log stream failed
    #[error("logging error: {0}")]
    Logging(#[source] LogStreamError),

    /// A primary failure followed by a failure to log it
    #[error("original error: {original}; logging error: {logging}")]
    Composite {
        original: Box<GitspaceError>,
        logging: LogStreamError,
    },

    /// Operation exceeded its configured deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },
}

impl GitspaceError {
    /// Wrap this error with a context message
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Combine a logging failure with the error (if any) that was being reported
    pub fn with_logging_failure(original: Option<GitspaceError>, logging: LogStreamError) -> Self {
        match original {
            Some(original) => Self::Composite {
                original: Box::new(original),
                logging,
            },
            None => Self::Logging(logging),
        }
    }
}

impl From<LogStreamError> for GitspaceError {
    fn from(err: LogStreamError) -> Self {
        Self::Logging(err)
    }
}

/// Context helpers for results carrying domain errors
pub trait ErrorContext<T> {
    /// Wrap the error with a lazily built context message
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<GitspaceError>,
{
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|e| e.into().context(f()))
    }
}

/// Convenience type alias for Results with GitspaceError
pub type Result<T> = std::result::Result<T, GitspaceError>;
