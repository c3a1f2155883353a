//! Container runtime selection and client factory
//!
//! Lets the orchestrator obtain a fresh runtime client per operation for a given
//! infrastructure target, switching between Docker and Podman without changing
//! the lifecycle logic.

use crate::docker::{CliRuntime, Docker};
use crate::errors::{GitspaceError, Result};
use crate::infra::Infrastructure;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Runtime selection options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// Docker runtime
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl RuntimeKind {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }

    /// Detect runtime from CLI flag, environment variable, or default
    ///
    /// Precedence: CLI flag > GITSPACE_RUNTIME env var > default (docker)
    pub fn detect(cli_runtime: Option<RuntimeKind>) -> RuntimeKind {
        if let Some(runtime) = cli_runtime {
            return runtime;
        }

        if let Ok(env_runtime) = std::env::var("GITSPACE_RUNTIME") {
            if let Ok(runtime) = env_runtime.parse() {
                return runtime;
            }
        }

        RuntimeKind::Docker
    }
}

impl std::str::FromStr for RuntimeKind {
    type Err = GitspaceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(crate::errors::ConfigError::Validation {
                message: format!("Unknown runtime: {}. Supported runtimes: docker, podman", s),
            }
            .into()),
        }
    }
}

impl std::fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Produces runtime clients bound to an infrastructure target
#[async_trait]
pub trait DockerClientFactory: Send + Sync {
    /// Create a client for `infra`; the caller releases it with [`Docker::close`]
    async fn new_client(&self, infra: &Infrastructure) -> Result<Arc<dyn Docker>>;
}

/// Factory creating CLI-backed clients for the infrastructure's runtime
#[derive(Debug, Clone, Default)]
pub struct CliRuntimeFactory;

impl CliRuntimeFactory {
    /// Build the runtime client for `infra` without checking reachability
    pub fn runtime_for(infra: &Infrastructure) -> CliRuntime {
        match &infra.runtime_path {
            Some(path) => CliRuntime::with_runtime_path(path.clone()),
            None => match infra.runtime {
                RuntimeKind::Docker => CliRuntime::docker(),
                RuntimeKind::Podman => CliRuntime::podman(),
            },
        }
    }
}

#[async_trait]
impl DockerClientFactory for CliRuntimeFactory {
    #[instrument(skip(self, infra), fields(infra = %infra.identifier, runtime = %infra.runtime))]
    async fn new_client(&self, infra: &Infrastructure) -> Result<Arc<dyn Docker>> {
        let runtime = Self::runtime_for(infra);
        debug!("Using runtime binary {}", runtime.runtime_path());
        runtime.ping().await?;
        Ok(Arc::new(runtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_runtime_kind_from_str() {
        assert_eq!("docker".parse::<RuntimeKind>().unwrap(), RuntimeKind::Docker);
        assert_eq!("Podman".parse::<RuntimeKind>().unwrap(), RuntimeKind::Podman);

        let err = "containerd".parse::<RuntimeKind>().unwrap_err();
        assert!(err.to_string().contains("Unknown runtime: containerd"));
    }

    #[test]
    fn test_runtime_kind_display() {
        assert_eq!(RuntimeKind::Docker.to_string(), "docker");
        assert_eq!(RuntimeKind::Podman.to_string(), "podman");
    }

    #[test]
    #[serial]
    fn test_detect_runtime_default() {
        std::env::remove_var("GITSPACE_RUNTIME");
        assert_eq!(RuntimeKind::detect(None), RuntimeKind::Docker);
    }

    #[test]
    #[serial]
    fn test_detect_runtime_cli_precedence() {
        std::env::set_var("GITSPACE_RUNTIME", "docker");
        let runtime = RuntimeKind::detect(Some(RuntimeKind::Podman));
        std::env::remove_var("GITSPACE_RUNTIME");
        assert_eq!(runtime, RuntimeKind::Podman);
    }

    #[test]
    #[serial]
    fn test_detect_runtime_env_var() {
        std::env::set_var("GITSPACE_RUNTIME", "podman");
        let runtime = RuntimeKind::detect(None);
        std::env::remove_var("GITSPACE_RUNTIME");
        assert_eq!(runtime, RuntimeKind::Podman);
    }

    #[test]
    fn test_runtime_for_infrastructure() {
        let mut infra = Infrastructure::new("local", "vol-1");
        infra.runtime = RuntimeKind::Podman;
        assert_eq!(CliRuntimeFactory::runtime_for(&infra).runtime_path(), "podman");

        infra.runtime_path = Some("/usr/local/bin/docker".to_string());
        assert_eq!(
            CliRuntimeFactory::runtime_for(&infra).runtime_path(),
            "/usr/local/bin/docker"
        );
    }

    #[tokio::test]
    async fn test_missing_runtime_binary_is_reported() {
        let mut infra = Infrastructure::new("local", "vol-1");
        infra.runtime_path = Some("/nonexistent/gitspace-runtime".to_string());
        let err = match CliRuntimeFactory.new_client(&infra).await {
            Ok(_) => panic!("expected factory to fail"),
            Err(e) => e,
        };
        assert_eq!(
            err.to_string(),
            "Docker error: Docker is not installed or not accessible"
        );
    }
}
