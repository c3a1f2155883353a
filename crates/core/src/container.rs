//! Container identity, observed state and creation parameters
//!
//! A gitspace's container is addressed only by its deterministic name; its
//! state is never stored and is re-derived from the runtime on every call.

use crate::config::GitspaceConfig;
use crate::docker::{CreateContainerOptions, Docker, MountSpec, MountType, PortBinding};
use crate::errors::{ErrorContext, Result};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Prefix of every gitspace container name
pub const CONTAINER_NAME_PREFIX: &str = "gitspace";

/// Runtime state string for a running container
pub const STATE_RUNNING: &str = "running";
/// Runtime state string for a stopped container
pub const STATE_STOPPED: &str = "exited";

/// Host address published ports bind to
pub const CATCH_ALL_IP: &str = "0.0.0.0";
/// Host port requesting an ephemeral port from the runtime
pub const CATCH_ALL_PORT: &str = "0";

/// Keeps the container alive independently of any process started inside it
pub const KEEP_ALIVE_SCRIPT: &str = "trap 'exit 0' 15; sleep infinity & wait $!";

/// Deterministic container identity of a gitspace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerIdentity {
    pub user_id: String,
    pub identifier: String,
}

impl ContainerIdentity {
    /// Identity for a gitspace config
    pub fn from_config(config: &GitspaceConfig) -> Self {
        Self {
            user_id: config.user_id.clone(),
            identifier: config.identifier.clone(),
        }
    }

    /// `gitspace-{userID}-{identifier}`
    pub fn container_name(&self) -> String {
        format!(
            "{}-{}-{}",
            CONTAINER_NAME_PREFIX, self.user_id, self.identifier
        )
    }
}

impl std::fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.container_name())
    }
}

/// Observed container state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Running,
    Stopped,
    /// No container with the identity exists
    Removed,
    /// Any other runtime status, e.g. "paused" or "dead"
    Invalid(String),
}

impl ContainerState {
    /// Map a runtime state string
    pub fn from_status(status: &str) -> Self {
        match status {
            STATE_RUNNING => Self::Running,
            STATE_STOPPED => Self::Stopped,
            other => Self::Invalid(other.to_string()),
        }
    }
}

impl std::fmt::Display for ContainerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Removed => write!(f, "removed"),
            Self::Invalid(status) => write!(f, "invalid ({})", status),
        }
    }
}

/// Query the runtime for the state of the container named `container_name`
///
/// The runtime's name filter matches substrings, so only exact name matches
/// are considered.
#[instrument(skip(docker))]
pub async fn probe_state(docker: &dyn Docker, container_name: &str) -> Result<ContainerState> {
    let containers = docker
        .list_containers(Some(container_name))
        .await
        .with_context(|| format!("could not list container {}", container_name))?;

    let state = containers
        .iter()
        .find(|c| c.has_name(container_name))
        .map_or(ContainerState::Removed, |c| {
            ContainerState::from_status(&c.state)
        });

    debug!("Container {} is {}", container_name, state);
    Ok(state)
}

/// Working directory of a repository inside the container
pub fn working_dir(repo_name: &str) -> String {
    format!("/{}", repo_name.trim_start_matches('/'))
}

/// Creation parameters for a gitspace container
///
/// `port_and_protocol` is the IDE's declared `"port/proto"`; when `None` no
/// port is exposed. The storage volume is mounted at the working directory.
pub fn create_options(
    container_name: &str,
    image: &str,
    port_and_protocol: Option<&str>,
    storage: &str,
    working_dir: &str,
) -> CreateContainerOptions {
    let mut exposed_ports = Vec::new();
    let mut port_bindings = BTreeMap::new();
    if let Some(port) = port_and_protocol.filter(|p| !p.is_empty()) {
        exposed_ports.push(port.to_string());
        port_bindings.insert(
            port.to_string(),
            vec![PortBinding {
                host_ip: CATCH_ALL_IP.to_string(),
                host_port: CATCH_ALL_PORT.to_string(),
            }],
        );
    }

    CreateContainerOptions {
        name: container_name.to_string(),
        image: image.to_string(),
        entrypoint: vec!["/bin/sh".to_string(), "-c".to_string()],
        command: vec![KEEP_ALIVE_SCRIPT.to_string()],
        exposed_ports,
        port_bindings,
        mounts: vec![MountSpec {
            mount_type: MountType::Volume,
            source: storage.to_string(),
            target: working_dir.to_string(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GitspaceInstance, IdeType};
    use crate::docker::mock::{MockContainer, MockDocker, MockOperation};

    fn gitspace(user_id: &str, identifier: &str) -> GitspaceConfig {
        GitspaceConfig {
            id: 1,
            identifier: identifier.to_string(),
            user_id: user_id.to_string(),
            code_repo_url: "https://example.com/org/proj.git".to_string(),
            branch: "main".to_string(),
            ide: IdeType::VsCode,
            instance: GitspaceInstance::default(),
        }
    }

    #[test]
    fn test_container_name_is_deterministic() {
        let a = ContainerIdentity::from_config(&gitspace("u1", "proj"));
        let b = ContainerIdentity::from_config(&gitspace("u1", "proj"));
        assert_eq!(a.container_name(), "gitspace-u1-proj");
        assert_eq!(a.container_name(), b.container_name());
    }

    #[test]
    fn test_container_name_differs_per_user_and_identifier() {
        let base = ContainerIdentity::from_config(&gitspace("u1", "proj")).container_name();
        let other_user = ContainerIdentity::from_config(&gitspace("u2", "proj")).container_name();
        let other_id = ContainerIdentity::from_config(&gitspace("u1", "proj2")).container_name();
        assert_ne!(base, other_user);
        assert_ne!(base, other_id);
    }

    #[test]
    fn test_state_from_status() {
        assert_eq!(ContainerState::from_status("running"), ContainerState::Running);
        assert_eq!(ContainerState::from_status("exited"), ContainerState::Stopped);
        assert_eq!(
            ContainerState::from_status("paused"),
            ContainerState::Invalid("paused".to_string())
        );
        // "created" is neither running nor stopped
        assert_eq!(
            ContainerState::from_status("created"),
            ContainerState::Invalid("created".to_string())
        );
    }

    #[test]
    fn test_working_dir() {
        assert_eq!(working_dir("proj"), "/proj");
        assert_eq!(working_dir("/proj"), "/proj");
    }

    #[test]
    fn test_create_options_without_port() {
        let options = create_options("gitspace-u1-proj", "alpine", None, "vol", "/proj");
        assert!(options.exposed_ports.is_empty());
        assert!(options.port_bindings.is_empty());
        assert_eq!(options.mounts[0].target, "/proj");
        assert_eq!(options.command, vec![KEEP_ALIVE_SCRIPT.to_string()]);
    }

    #[test]
    fn test_create_options_binds_ephemeral_port() {
        let options = create_options("n", "alpine", Some("8089/tcp"), "vol", "/proj");
        assert_eq!(options.exposed_ports, vec!["8089/tcp".to_string()]);
        let bindings = &options.port_bindings["8089/tcp"];
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].host_ip, "0.0.0.0");
        assert_eq!(bindings[0].host_port, "0");
    }

    #[tokio::test]
    async fn test_probe_absent_container_is_removed() {
        let docker = MockDocker::new();
        let state = probe_state(&docker, "gitspace-u1-proj").await.unwrap();
        assert_eq!(state, ContainerState::Removed);
    }

    #[tokio::test]
    async fn test_probe_ignores_substring_matches() {
        let docker = MockDocker::new();
        docker.add_container(
            MockContainer::new("2".into(), "gitspace-u1-proj-old".into(), "alpine".into())
                .with_state("exited".into(), "Exited (0)".into()),
        );
        docker.add_container(MockContainer::new(
            "1".into(),
            "gitspace-u1-proj".into(),
            "alpine".into(),
        ));

        let state = probe_state(&docker, "gitspace-u1-proj").await.unwrap();
        assert_eq!(state, ContainerState::Running);
    }

    #[tokio::test]
    async fn test_probe_reports_invalid_status() {
        let docker = MockDocker::new();
        docker.add_container(
            MockContainer::new("1".into(), "gitspace-u1-proj".into(), "alpine".into())
                .with_state("paused".into(), "Up 1 hour (Paused)".into()),
        );
        let state = probe_state(&docker, "gitspace-u1-proj").await.unwrap();
        assert_eq!(state, ContainerState::Invalid("paused".to_string()));
    }

    #[tokio::test]
    async fn test_probe_wraps_runtime_errors() {
        let docker = MockDocker::new();
        docker.fail_on(MockOperation::List);
        let err = probe_state(&docker, "gitspace-u1-proj").await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("could not list container gitspace-u1-proj: "));
    }
}
