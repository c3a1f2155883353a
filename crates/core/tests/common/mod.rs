//! Shared test helpers for core integration tests.

#![allow(dead_code)]

use gitspace_core::config::{
    DevcontainerConfig, GitspaceConfig, GitspaceInstance, IdeType, OrchestratorConfig,
};
use gitspace_core::docker::mock::{MockDocker, MockDockerFactory};
use gitspace_core::ide::IdeRegistry;
use gitspace_core::infra::Infrastructure;
use gitspace_core::logstream::mock::MemoryLogStreamFactory;
use gitspace_core::Orchestrator;
use std::sync::Arc;

pub const DEFAULT_IMAGE: &str = "mcr.microsoft.com/devcontainers/base:dev-ubuntu-24.04";

/// Orchestrator wired to an in-memory runtime and log stream
pub struct Harness {
    pub docker: MockDocker,
    pub factory: MockDockerFactory,
    pub logs: MemoryLogStreamFactory,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let docker = MockDocker::new();
        let factory = MockDockerFactory::new(docker.clone());
        let logs = MemoryLogStreamFactory::new();
        let orchestrator = Orchestrator::new(
            config,
            Arc::new(factory.clone()),
            Arc::new(logs.clone()),
            IdeRegistry::with_defaults(),
        );
        Self {
            docker,
            factory,
            logs,
            orchestrator,
        }
    }
}

pub fn gitspace(user_id: &str, identifier: &str, ide: IdeType) -> GitspaceConfig {
    GitspaceConfig {
        id: 42,
        identifier: identifier.to_string(),
        user_id: user_id.to_string(),
        code_repo_url: "https://example.com/org/proj.git".to_string(),
        branch: "main".to_string(),
        ide,
        instance: GitspaceInstance {
            identifier: "instance-1".to_string(),
            access_key: Some("s3cret".to_string()),
            ..Default::default()
        },
    }
}

pub fn devcontainer(image: &str, post_create_command: &str) -> DevcontainerConfig {
    DevcontainerConfig {
        image: Some(image.to_string()),
        post_create_command: Some(post_create_command.to_string()),
    }
}

pub fn infra() -> Infrastructure {
    Infrastructure::new("local", "gitspace-storage")
}

/// Name the pipeline step an in-container command belongs to
pub fn classify_exec(command: &[String]) -> &'static str {
    let script = command.last().map(String::as_str).unwrap_or_default();
    if script.contains("openssh-server") {
        "setup"
    } else if script.contains("/usr/sbin/sshd -p") {
        "run"
    } else if script.contains("code-server.dev/install.sh") {
        "setup"
    } else if script.contains("exec code-server") {
        "run"
    } else if script.contains("git clone") {
        "clone"
    } else {
        "post-create"
    }
}

/// Pipeline steps executed inside the container, in order
pub fn exec_steps(docker: &MockDocker) -> Vec<&'static str> {
    docker
        .get_exec_history()
        .iter()
        .map(|(_, command, _)| classify_exec(command))
        .collect()
}
