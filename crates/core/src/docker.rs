//! Docker and OCI container runtime integration
//!
//! This module defines the runtime client abstraction the orchestrator drives
//! (list, inspect, pull, create, start, stop, remove, exec) and a CLI-backed
//! implementation that shells out to `docker` or `podman`.
//!
//! Every runtime call spawns its child process with `kill_on_drop`, so dropping
//! the returned future (caller cancellation or an elapsed deadline) aborts the
//! call instead of leaving it running in the background.

use crate::errors::{DockerError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Container information returned by list and inspect
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Container ID
    pub id: String,
    /// Container names (without the leading `/`)
    pub names: Vec<String>,
    /// Container image
    pub image: String,
    /// Human readable status (e.g. "Up 5 minutes")
    pub status: String,
    /// Machine state (e.g. "running", "exited")
    pub state: String,
    /// Port mappings from host to container (inspect only)
    pub port_mappings: Vec<PortMapping>,
}

impl ContainerInfo {
    /// Whether one of the container's names equals `name` exactly
    pub fn has_name(&self, name: &str) -> bool {
        self.names
            .iter()
            .any(|n| n.trim_start_matches('/') == name)
    }

    /// First host port bound to a `"port/proto"` container port
    pub fn host_port_for(&self, port_and_protocol: &str) -> Option<u16> {
        let (port, protocol) = split_port_and_protocol(port_and_protocol)?;
        self.port_mappings
            .iter()
            .find(|m| m.container_port == port && m.protocol == protocol)
            .map(|m| m.host_port)
    }
}

/// Represents a port mapping from host to container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host port
    pub host_port: u16,
    /// Container port
    pub container_port: u16,
    /// Protocol (tcp/udp)
    pub protocol: String,
    /// Host IP
    pub host_ip: String,
}

/// Requested host side of a published port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    /// Host address to bind, `0.0.0.0` for all interfaces
    pub host_ip: String,
    /// Host port, `0` (or empty) lets the runtime pick an ephemeral port
    pub host_port: String,
}

/// Mount kinds supported at container creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountType {
    /// Named volume
    Volume,
    /// Host path
    Bind,
}

impl MountType {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Volume => "volume",
            Self::Bind => "bind",
        }
    }
}

/// A mount attached at container creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub mount_type: MountType,
    /// Volume name or host path
    pub source: String,
    /// Path inside the container
    pub target: String,
}

/// Parameters for creating a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateContainerOptions {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Entrypoint executable followed by its leading arguments
    pub entrypoint: Vec<String>,
    /// Arguments appended after the entrypoint
    pub command: Vec<String>,
    /// Exposed container ports as `"port/proto"`
    pub exposed_ports: Vec<String>,
    /// Published ports keyed by `"port/proto"`
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    /// Mounts
    pub mounts: Vec<MountSpec>,
}

/// Configuration for executing commands in containers
#[derive(Debug, Clone, Default)]
pub struct ExecConfig {
    /// User to run command as
    pub user: Option<String>,
    /// Working directory
    pub working_dir: Option<String>,
    /// Environment variables
    pub env: HashMap<String, String>,
    /// Run in background and return immediately
    pub detach: bool,
}

/// Result of executing a command in a container
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit code of the command
    pub exit_code: i32,
    /// Whether the command completed successfully (exit code 0)
    pub success: bool,
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
}

impl ExecResult {
    /// Stdout followed by stderr
    pub fn combined_output(&self) -> String {
        let mut output = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&self.stderr);
        }
        output
    }
}

/// Split `"8089/tcp"` into `(8089, "tcp")`; a bare port defaults to tcp
pub fn split_port_and_protocol(port_and_protocol: &str) -> Option<(u16, &str)> {
    let (port, protocol) = match port_and_protocol.split_once('/') {
        Some((port, protocol)) => (port, protocol),
        None => (port_and_protocol, "tcp"),
    };
    port.trim().parse().ok().map(|port| (port, protocol))
}

/// Container runtime client
///
/// Obtained per operation from a [`crate::runtime::DockerClientFactory`] and
/// released with [`Docker::close`] when the operation completes.
#[async_trait]
pub trait Docker: Send + Sync {
    /// Health check for runtime availability
    async fn ping(&self) -> Result<()>;

    /// List all containers (including stopped ones) whose name matches `name_filter`
    async fn list_containers(&self, name_filter: Option<&str>) -> Result<Vec<ContainerInfo>>;

    /// Inspect a container by ID or name
    async fn inspect_container(&self, id: &str) -> Result<Option<ContainerInfo>>;

    /// Pull an image, returning the fully drained progress output
    async fn pull_image(&self, image: &str) -> Result<String>;

    /// Create a container, returning its ID
    async fn create_container(&self, options: &CreateContainerOptions) -> Result<String>;

    /// Start a created or stopped container
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container with optional timeout in seconds
    async fn stop_container(&self, id: &str, timeout: Option<u32>) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Execute a command in a running container
    async fn exec(&self, id: &str, command: &[String], config: ExecConfig) -> Result<ExecResult>;

    /// Release the client
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// CLI-based container runtime implementation
#[derive(Debug, Clone)]
pub struct CliRuntime {
    runtime_path: String,
}

impl CliRuntime {
    /// Create a new CliRuntime instance for Docker
    pub fn docker() -> Self {
        Self::with_runtime_path("docker".to_string())
    }

    /// Create a new CliRuntime instance for Podman
    pub fn podman() -> Self {
        Self::with_runtime_path("podman".to_string())
    }

    /// Create a new CliRuntime instance with custom runtime binary path
    pub fn with_runtime_path(runtime_path: String) -> Self {
        Self { runtime_path }
    }

    /// Path of the runtime binary
    pub fn runtime_path(&self) -> &str {
        &self.runtime_path
    }

    /// Run the runtime binary with `args` and capture its output
    async fn run(&self, args: &[String]) -> std::result::Result<Output, DockerError> {
        debug!(
            "Executing runtime command: {} {}",
            self.runtime_path,
            args.join(" ")
        );

        Command::new(&self.runtime_path)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DockerError::NotInstalled,
                _ => DockerError::CLIError(format!("Failed to execute runtime command: {}", e)),
            })
    }

    /// Run and require a zero exit status, returning stdout
    async fn run_checked(
        &self,
        args: &[String],
        what: &str,
    ) -> std::result::Result<String, DockerError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DockerError::CLIError(format!(
                "{} failed: {}",
                what,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|e| DockerError::CLIError(format!("Invalid UTF-8 in runtime output: {}", e)))
    }

    /// Build `docker create` arguments
    fn create_args(options: &CreateContainerOptions) -> Vec<String> {
        let mut args: Vec<String> = vec!["create".into(), "--name".into(), options.name.clone()];

        if let Some(entrypoint) = options.entrypoint.first() {
            args.push("--entrypoint".into());
            args.push(entrypoint.clone());
        }

        for port in &options.exposed_ports {
            args.push("--expose".into());
            args.push(port.clone());
        }

        for (container_port, bindings) in &options.port_bindings {
            for binding in bindings {
                args.push("--publish".into());
                args.push(Self::publish_spec(binding, container_port));
            }
        }

        for mount in &options.mounts {
            args.push("--mount".into());
            args.push(format!(
                "type={},source={},target={}",
                mount.mount_type.as_str(),
                mount.source,
                mount.target
            ));
        }

        args.push(options.image.clone());
        args.extend(options.entrypoint.iter().skip(1).cloned());
        args.extend(options.command.iter().cloned());
        args
    }

    /// `ip:hostPort:containerPort/proto`, leaving the host port empty for an ephemeral one
    fn publish_spec(binding: &PortBinding, container_port: &str) -> String {
        let host_port = match binding.host_port.as_str() {
            "0" => "",
            other => other,
        };
        format!("{}:{}:{}", binding.host_ip, host_port, container_port)
    }

    /// Parse port mappings from container NetworkSettings.Ports
    fn parse_port_mappings(container: &serde_json::Value) -> Vec<PortMapping> {
        let mut port_mappings = Vec::new();

        if let Some(ports_obj) = container
            .get("NetworkSettings")
            .and_then(|ns| ns.get("Ports"))
            .and_then(|p| p.as_object())
        {
            for (port_spec, bindings) in ports_obj.iter() {
                let Some((container_port, protocol)) = split_port_and_protocol(port_spec) else {
                    continue;
                };
                let Some(bindings_array) = bindings.as_array() else {
                    continue;
                };
                for binding in bindings_array {
                    let host_port = binding
                        .get("HostPort")
                        .and_then(|hp| hp.as_str())
                        .and_then(|hp| hp.parse::<u16>().ok());
                    if let Some(host_port) = host_port {
                        port_mappings.push(PortMapping {
                            host_port,
                            container_port,
                            protocol: protocol.to_string(),
                            host_ip: binding
                                .get("HostIp")
                                .and_then(|hi| hi.as_str())
                                .unwrap_or_default()
                                .to_string(),
                        });
                    }
                }
            }
        }

        port_mappings
    }

    /// Parse `ps --format {{json .}}` output, one JSON object per line
    fn parse_container_list(json_output: &str) -> std::result::Result<Vec<ContainerInfo>, DockerError> {
        let mut containers = Vec::new();
        for line in json_output.lines() {
            if line.trim().is_empty() {
                continue;
            }

            let container: serde_json::Value = serde_json::from_str(line).map_err(|e| {
                DockerError::CLIError(format!("Failed to parse container JSON: {}", e))
            })?;

            // Docker emits "ID" and a comma-separated "Names"; Podman emits "Id" and an array
            let field = |keys: &[&str]| {
                keys.iter()
                    .find_map(|key| container.get(*key).and_then(|v| v.as_str()))
                    .unwrap_or("unknown")
                    .to_string()
            };

            let names = match container.get("Names") {
                Some(serde_json::Value::String(s)) => {
                    s.split(',').map(|name| name.trim().to_string()).collect()
                }
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|name| name.trim_start_matches('/').to_string())
                    .collect(),
                _ => Vec::new(),
            };

            containers.push(ContainerInfo {
                id: field(&["ID", "Id"]),
                names,
                image: field(&["Image"]),
                status: field(&["Status"]),
                state: field(&["State"]),
                port_mappings: vec![], // Not available in list format
            });
        }
        Ok(containers)
    }

    /// Parse `inspect` output into ContainerInfo
    fn parse_container_inspect(
        json_output: &str,
    ) -> std::result::Result<Option<ContainerInfo>, DockerError> {
        let containers: Vec<serde_json::Value> = serde_json::from_str(json_output)
            .map_err(|e| DockerError::CLIError(format!("Failed to parse inspect JSON: {}", e)))?;

        let Some(container) = containers.first() else {
            return Ok(None);
        };

        let state = container
            .get("State")
            .and_then(|state| state.get("Status"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(Some(ContainerInfo {
            id: container
                .get("Id")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            names: container
                .get("Name")
                .and_then(|v| v.as_str())
                .map(|name| vec![name.trim_start_matches('/').to_string()])
                .unwrap_or_default(),
            image: container
                .get("Config")
                .and_then(|config| config.get("Image"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string(),
            status: state.clone(),
            state,
            port_mappings: Self::parse_port_mappings(container),
        }))
    }
}

impl Default for CliRuntime {
    fn default() -> Self {
        Self::docker()
    }
}

async fn read_lines<R: AsyncRead + Unpin>(reader: R) -> std::io::Result<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut collected = String::new();
    while let Some(line) = lines.next_line().await? {
        collected.push_str(&line);
        collected.push('\n');
    }
    Ok(collected)
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<String> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf).await?;
    Ok(buf)
}

#[async_trait]
impl Docker for CliRuntime {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        debug!("Pinging container runtime daemon");
        let args = vec!["version".to_string(), "--format".into(), "json".into()];
        self.run_checked(&args, "Runtime ping").await?;
        debug!("Container runtime daemon is available");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_containers(&self, name_filter: Option<&str>) -> Result<Vec<ContainerInfo>> {
        let mut args: Vec<String> = vec!["ps", "--all", "--no-trunc", "--format", "{{json .}}"]
            .into_iter()
            .map(String::from)
            .collect();
        if let Some(name) = name_filter {
            args.push("--filter".into());
            args.push(format!("name={}", name));
        }

        let stdout = self.run_checked(&args, "Container list").await?;
        let containers = Self::parse_container_list(&stdout)?;
        debug!("Runtime returned {} containers", containers.len());
        Ok(containers)
    }

    #[instrument(skip(self))]
    async fn inspect_container(&self, id: &str) -> Result<Option<ContainerInfo>> {
        let args = vec![
            "inspect".to_string(),
            "--type".into(),
            "container".into(),
            id.to_string(),
        ];
        let output = self.run(&args).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No such object") || stderr.contains("No such container") {
                return Ok(None);
            }
            return Err(
                DockerError::CLIError(format!("Inspect command failed: {}", stderr.trim())).into(),
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Self::parse_container_inspect(&stdout)?)
    }

    #[instrument(skip(self))]
    async fn pull_image(&self, image: &str) -> Result<String> {
        debug!("Pulling image: {}", image);

        let mut child = Command::new(&self.runtime_path)
            .args(["pull", image])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => DockerError::NotInstalled,
                _ => DockerError::CLIError(format!("Failed to execute runtime pull: {}", e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DockerError::CLIError("pull stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DockerError::CLIError("pull stderr not captured".to_string()))?;

        // Drain the whole progress stream; stopping early can leave a partial image.
        let (progress, errors) = tokio::join!(read_lines(stdout), read_all(stderr));
        let progress = progress
            .map_err(|e| DockerError::CLIError(format!("error while parsing pull image output {}: {}", image, e)))?;
        let errors = errors.unwrap_or_default();

        let status = child
            .wait()
            .await
            .map_err(|e| DockerError::CLIError(format!("Failed to wait for pull: {}", e)))?;
        if !status.success() {
            return Err(DockerError::CLIError(format!("Image pull failed: {}", errors.trim())).into());
        }

        Ok(progress)
    }

    #[instrument(skip(self, options), fields(name = %options.name, image = %options.image))]
    async fn create_container(&self, options: &CreateContainerOptions) -> Result<String> {
        let args = Self::create_args(options);
        let stdout = self.run_checked(&args, "Create command").await?;
        let id = stdout.trim().to_string();
        debug!("Created container {}", id);
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn start_container(&self, id: &str) -> Result<()> {
        let args = vec!["start".to_string(), id.to_string()];
        self.run_checked(&args, "Start command").await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop_container(&self, id: &str, timeout: Option<u32>) -> Result<()> {
        let mut args = vec!["stop".to_string()];
        if let Some(timeout) = timeout {
            args.push("-t".into());
            args.push(timeout.to_string());
        }
        args.push(id.to_string());
        self.run_checked(&args, "Runtime stop command").await?;
        debug!("Container {} stopped successfully", id);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("-f".into());
        }
        args.push(id.to_string());
        self.run_checked(&args, "Remove command").await?;
        Ok(())
    }

    #[instrument(skip(self, command, config))]
    async fn exec(&self, id: &str, command: &[String], config: ExecConfig) -> Result<ExecResult> {
        let mut args = vec!["exec".to_string()];
        if config.detach {
            args.push("-d".into());
        }
        if let Some(user) = config.user {
            args.push("-u".into());
            args.push(user);
        }
        if let Some(workdir) = config.working_dir {
            args.push("-w".into());
            args.push(workdir);
        }
        let mut env: Vec<_> = config.env.into_iter().collect();
        env.sort();
        for (k, v) in env {
            args.push("-e".into());
            args.push(format!("{}={}", k, v));
        }
        args.push(id.to_string());
        args.extend(command.iter().cloned());

        let output = self.run(&args).await?;
        Ok(ExecResult {
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub mod mock {
    //! Mock container runtime for testing orchestration flows
    //!
    //! Keeps containers in memory, records every call in order, hands out
    //! ephemeral host ports and supports failure injection per operation and
    //! per exec command. Clones share state, so a test can keep a handle while
    //! the orchestrator owns another.

    use super::{
        split_port_and_protocol, ContainerInfo, CreateContainerOptions, Docker, ExecConfig,
        ExecResult, PortMapping,
    };
    use crate::errors::{DockerError, Result};
    use crate::infra::Infrastructure;
    use crate::runtime::DockerClientFactory;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tracing::{debug, instrument};

    /// First host port handed out for ephemeral bindings
    pub const FIRST_EPHEMERAL_PORT: u16 = 32768;

    /// Runtime operations, for call history and failure injection
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum MockOperation {
        Ping,
        List,
        Inspect,
        Pull,
        Create,
        Start,
        Stop,
        Remove,
        Exec,
        Close,
    }

    impl MockOperation {
        /// Returns true for operations that change container state
        pub fn is_mutating(&self) -> bool {
            matches!(
                self,
                Self::Pull | Self::Create | Self::Start | Self::Stop | Self::Remove | Self::Exec
            )
        }
    }

    /// A recorded runtime call
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct MockCall {
        pub operation: MockOperation,
        /// Container id/name, image, or the exec command joined by spaces
        pub target: String,
    }

    /// Configuration for exec command responses
    #[derive(Debug, Clone)]
    pub struct MockExecResponse {
        /// Exit code to return
        pub exit_code: i32,
        /// Stdout content
        pub stdout: String,
        /// Stderr content
        pub stderr: String,
        /// Optional delay to simulate command execution time
        pub delay: Option<Duration>,
    }

    impl Default for MockExecResponse {
        fn default() -> Self {
            Self {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                delay: None,
            }
        }
    }

    impl MockExecResponse {
        /// Successful response with the given stdout
        pub fn ok(stdout: &str) -> Self {
            Self {
                stdout: stdout.to_string(),
                ..Default::default()
            }
        }

        /// Failing response with the given exit code and stderr
        pub fn failed(exit_code: i32, stderr: &str) -> Self {
            Self {
                exit_code,
                stderr: stderr.to_string(),
                ..Default::default()
            }
        }
    }

    /// Mock container state for simulation
    #[derive(Debug, Clone)]
    pub struct MockContainer {
        pub id: String,
        pub name: String,
        pub image: String,
        /// Machine state ("created", "running", "exited", "paused", ...)
        pub state: String,
        pub status: String,
        pub port_mappings: Vec<PortMapping>,
        /// Options the container was created with, if created through the mock
        pub create_options: Option<CreateContainerOptions>,
    }

    impl MockContainer {
        /// Create a new running mock container
        pub fn new(id: String, name: String, image: String) -> Self {
            Self {
                id,
                name,
                image,
                state: "running".to_string(),
                status: "Up 5 minutes".to_string(),
                port_mappings: Vec::new(),
                create_options: None,
            }
        }

        /// Set container state
        pub fn with_state(mut self, state: String, status: String) -> Self {
            self.state = state;
            self.status = status;
            self
        }

        /// Bind a `"port/proto"` container port to a host port
        pub fn with_port_mapping(mut self, port_and_protocol: &str, host_port: u16) -> Self {
            if let Some((container_port, protocol)) = split_port_and_protocol(port_and_protocol) {
                self.port_mappings.push(PortMapping {
                    host_port,
                    container_port,
                    protocol: protocol.to_string(),
                    host_ip: "0.0.0.0".to_string(),
                });
            }
            self
        }

        fn to_info(&self) -> ContainerInfo {
            ContainerInfo {
                id: self.id.clone(),
                names: vec![self.name.clone()],
                image: self.image.clone(),
                status: self.status.clone(),
                state: self.state.clone(),
                port_mappings: self.port_mappings.clone(),
            }
        }
    }

    /// Configuration for the MockDocker runtime
    #[derive(Debug, Clone)]
    pub struct MockDockerConfig {
        /// Simulate the daemon being unreachable
        pub daemon_unavailable: bool,
        /// Operations that fail with a CLI error
        pub failing_operations: HashSet<MockOperation>,
        /// Output returned by pull
        pub pull_output: String,
        /// Delay applied to every mutating operation
        pub operation_delay: Option<Duration>,
        /// Default exec response for commands
        pub default_exec_response: MockExecResponse,
        /// Exec responses matched by substring of the joined command, first match wins
        pub exec_responses: Vec<(String, MockExecResponse)>,
    }

    impl Default for MockDockerConfig {
        fn default() -> Self {
            Self {
                daemon_unavailable: false,
                failing_operations: HashSet::new(),
                pull_output: "Pulling from library/base\nDigest: sha256:0000\nStatus: Image is up to date\n"
                    .to_string(),
                operation_delay: None,
                default_exec_response: MockExecResponse::default(),
                exec_responses: Vec::new(),
            }
        }
    }

    /// Mock Docker runtime implementation
    #[derive(Debug, Clone)]
    pub struct MockDocker {
        config: Arc<Mutex<MockDockerConfig>>,
        containers: Arc<Mutex<Vec<MockContainer>>>,
        calls: Arc<Mutex<Vec<MockCall>>>,
        exec_history: Arc<Mutex<Vec<(String, Vec<String>, ExecConfig)>>>,
        next_id: Arc<AtomicU64>,
        next_port: Arc<AtomicU16>,
    }

    impl MockDocker {
        /// Create a new MockDocker instance with default configuration
        pub fn new() -> Self {
            Self::with_config(MockDockerConfig::default())
        }

        /// Create a new MockDocker instance with custom configuration
        pub fn with_config(config: MockDockerConfig) -> Self {
            Self {
                config: Arc::new(Mutex::new(config)),
                containers: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(Mutex::new(Vec::new())),
                exec_history: Arc::new(Mutex::new(Vec::new())),
                next_id: Arc::new(AtomicU64::new(1)),
                next_port: Arc::new(AtomicU16::new(FIRST_EPHEMERAL_PORT)),
            }
        }

        /// Add a mock container to the system
        pub fn add_container(&self, container: MockContainer) {
            self.containers.lock().unwrap().push(container);
        }

        /// Look up a container by exact name
        pub fn container(&self, name: &str) -> Option<MockContainer> {
            self.containers
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.name == name)
                .cloned()
        }

        /// All recorded calls, in order
        pub fn calls(&self) -> Vec<MockCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Recorded operations, in order
        pub fn operations(&self) -> Vec<MockOperation> {
            self.calls().into_iter().map(|c| c.operation).collect()
        }

        /// Recorded operations that change container state
        pub fn mutating_operations(&self) -> Vec<MockOperation> {
            self.operations()
                .into_iter()
                .filter(MockOperation::is_mutating)
                .collect()
        }

        /// Number of calls of one operation
        pub fn count(&self, operation: MockOperation) -> usize {
            self.operations()
                .into_iter()
                .filter(|op| *op == operation)
                .count()
        }

        /// History of exec calls: container, command and config
        pub fn get_exec_history(&self) -> Vec<(String, Vec<String>, ExecConfig)> {
            self.exec_history.lock().unwrap().clone()
        }

        /// Clear call and exec history
        pub fn clear_history(&self) {
            self.calls.lock().unwrap().clear();
            self.exec_history.lock().unwrap().clear();
        }

        /// Update mock configuration
        pub fn update_config<F>(&self, f: F)
        where
            F: FnOnce(&mut MockDockerConfig),
        {
            let mut config = self.config.lock().unwrap();
            f(&mut config);
        }

        /// Make an operation fail
        pub fn fail_on(&self, operation: MockOperation) {
            self.update_config(|c| {
                c.failing_operations.insert(operation);
            });
        }

        /// Respond to exec commands containing `pattern`
        pub fn set_exec_response(&self, pattern: &str, response: MockExecResponse) {
            self.update_config(|c| c.exec_responses.push((pattern.to_string(), response)));
        }

        /// Record a call and apply configured failures and delay
        async fn enter(&self, operation: MockOperation, target: &str) -> Result<()> {
            self.calls.lock().unwrap().push(MockCall {
                operation,
                target: target.to_string(),
            });

            let (unavailable, failing, delay) = {
                let config = self.config.lock().unwrap();
                (
                    config.daemon_unavailable,
                    config.failing_operations.contains(&operation),
                    config.operation_delay.filter(|_| operation.is_mutating()),
                )
            };

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if unavailable && operation != MockOperation::Close {
                return Err(DockerError::NotInstalled.into());
            }
            if failing {
                return Err(DockerError::CLIError(format!(
                    "mock {:?} failure for {}",
                    operation, target
                ))
                .into());
            }
            Ok(())
        }

        fn with_container<T>(
            &self,
            id: &str,
            f: impl FnOnce(&mut MockContainer) -> Result<T>,
        ) -> Result<T> {
            let mut containers = self.containers.lock().unwrap();
            match containers.iter_mut().find(|c| c.id == id || c.name == id) {
                Some(container) => f(container),
                None => Err(DockerError::ContainerNotFound { id: id.to_string() }.into()),
            }
        }
    }

    impl Default for MockDocker {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Docker for MockDocker {
        #[instrument(skip(self))]
        async fn ping(&self) -> Result<()> {
            debug!("MockDocker ping called");
            self.enter(MockOperation::Ping, "").await
        }

        #[instrument(skip(self))]
        async fn list_containers(&self, name_filter: Option<&str>) -> Result<Vec<ContainerInfo>> {
            self.enter(MockOperation::List, name_filter.unwrap_or_default())
                .await?;

            // The runtime name filter is a substring match
            let result: Vec<ContainerInfo> = self
                .containers
                .lock()
                .unwrap()
                .iter()
                .filter(|c| name_filter.map_or(true, |f| c.name.contains(f)))
                .map(MockContainer::to_info)
                .collect();

            debug!("MockDocker returning {} containers", result.len());
            Ok(result)
        }

        #[instrument(skip(self))]
        async fn inspect_container(&self, id: &str) -> Result<Option<ContainerInfo>> {
            self.enter(MockOperation::Inspect, id).await?;
            Ok(self
                .containers
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == id || c.name == id)
                .map(MockContainer::to_info))
        }

        #[instrument(skip(self))]
        async fn pull_image(&self, image: &str) -> Result<String> {
            self.enter(MockOperation::Pull, image).await?;
            Ok(self.config.lock().unwrap().pull_output.clone())
        }

        #[instrument(skip(self, options), fields(name = %options.name))]
        async fn create_container(&self, options: &CreateContainerOptions) -> Result<String> {
            self.enter(MockOperation::Create, &options.name).await?;

            let mut containers = self.containers.lock().unwrap();
            if containers.iter().any(|c| c.name == options.name) {
                return Err(DockerError::CLIError(format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    options.name
                ))
                .into());
            }

            let id = format!("mock-{:012}", self.next_id.fetch_add(1, Ordering::SeqCst));
            let mut container = MockContainer::new(
                id.clone(),
                options.name.clone(),
                options.image.clone(),
            )
            .with_state("created".to_string(), "Created".to_string());

            for (port_and_protocol, bindings) in &options.port_bindings {
                for binding in bindings {
                    let host_port = match binding.host_port.parse::<u16>() {
                        Ok(port) if port != 0 => port,
                        _ => self.next_port.fetch_add(1, Ordering::SeqCst),
                    };
                    container = container.with_port_mapping(port_and_protocol, host_port);
                }
            }
            container.create_options = Some(options.clone());

            containers.push(container);
            Ok(id)
        }

        #[instrument(skip(self))]
        async fn start_container(&self, id: &str) -> Result<()> {
            self.enter(MockOperation::Start, id).await?;
            self.with_container(id, |c| {
                c.state = "running".to_string();
                c.status = "Up 1 second".to_string();
                Ok(())
            })
        }

        #[instrument(skip(self))]
        async fn stop_container(&self, id: &str, _timeout: Option<u32>) -> Result<()> {
            self.enter(MockOperation::Stop, id).await?;
            self.with_container(id, |c| {
                c.state = "exited".to_string();
                c.status = "Exited (0) 1 second ago".to_string();
                Ok(())
            })
        }

        #[instrument(skip(self))]
        async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
            self.enter(MockOperation::Remove, id).await?;
            let mut containers = self.containers.lock().unwrap();
            let Some(index) = containers.iter().position(|c| c.id == id || c.name == id) else {
                return Err(DockerError::ContainerNotFound { id: id.to_string() }.into());
            };
            if containers[index].state == "running" && !force {
                return Err(DockerError::CLIError(format!(
                    "cannot remove container {}: container is running",
                    id
                ))
                .into());
            }
            containers.remove(index);
            Ok(())
        }

        #[instrument(skip(self, command, config))]
        async fn exec(
            &self,
            id: &str,
            command: &[String],
            config: ExecConfig,
        ) -> Result<ExecResult> {
            let joined = command.join(" ");
            self.enter(MockOperation::Exec, &joined).await?;

            self.with_container(id, |c| {
                if c.state != "running" {
                    return Err(DockerError::CLIError(format!(
                        "container {} is not running",
                        id
                    ))
                    .into());
                }
                Ok(())
            })?;

            self.exec_history
                .lock()
                .unwrap()
                .push((id.to_string(), command.to_vec(), config));

            let response = {
                let config = self.config.lock().unwrap();
                config
                    .exec_responses
                    .iter()
                    .find(|(pattern, _)| joined.contains(pattern.as_str()))
                    .map(|(_, r)| r.clone())
                    .unwrap_or_else(|| config.default_exec_response.clone())
            };

            if let Some(delay) = response.delay {
                tokio::time::sleep(delay).await;
            }

            Ok(ExecResult {
                exit_code: response.exit_code,
                success: response.exit_code == 0,
                stdout: response.stdout,
                stderr: response.stderr,
            })
        }

        async fn close(&self) -> Result<()> {
            self.enter(MockOperation::Close, "").await
        }
    }

    /// Client factory handing out clones of one shared MockDocker
    #[derive(Debug, Clone, Default)]
    pub struct MockDockerFactory {
        docker: MockDocker,
        unavailable: Arc<Mutex<bool>>,
    }

    impl MockDockerFactory {
        pub fn new(docker: MockDocker) -> Self {
            Self {
                docker,
                unavailable: Arc::new(Mutex::new(false)),
            }
        }

        /// Make `new_client` fail
        pub fn set_unavailable(&self, unavailable: bool) {
            *self.unavailable.lock().unwrap() = unavailable;
        }
    }

    #[async_trait]
    impl DockerClientFactory for MockDockerFactory {
        async fn new_client(&self, infra: &Infrastructure) -> Result<Arc<dyn Docker>> {
            if *self.unavailable.lock().unwrap() {
                return Err(DockerError::CLIError(format!(
                    "no runtime reachable for infrastructure {}",
                    infra.identifier
                ))
                .into());
            }
            Ok(Arc::new(self.docker.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockContainer, MockDocker, MockOperation};
    use super::*;

    #[test]
    fn test_split_port_and_protocol() {
        assert_eq!(split_port_and_protocol("8089/tcp"), Some((8089, "tcp")));
        assert_eq!(split_port_and_protocol("53/udp"), Some((53, "udp")));
        assert_eq!(split_port_and_protocol("22"), Some((22, "tcp")));
        assert_eq!(split_port_and_protocol(""), None);
        assert_eq!(split_port_and_protocol("abc/tcp"), None);
    }

    #[test]
    fn test_create_args_publish_ephemeral_port_and_volume() {
        let mut port_bindings = BTreeMap::new();
        port_bindings.insert(
            "8089/tcp".to_string(),
            vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: "0".to_string(),
            }],
        );
        let options = CreateContainerOptions {
            name: "gitspace-u1-proj".to_string(),
            image: "alpine:3.20".to_string(),
            entrypoint: vec!["/bin/sh".to_string(), "-c".to_string()],
            command: vec!["sleep infinity".to_string()],
            exposed_ports: vec!["8089/tcp".to_string()],
            port_bindings,
            mounts: vec![MountSpec {
                mount_type: MountType::Volume,
                source: "vol-1".to_string(),
                target: "/proj".to_string(),
            }],
        };

        let args = CliRuntime::create_args(&options);
        assert_eq!(
            args,
            vec![
                "create",
                "--name",
                "gitspace-u1-proj",
                "--entrypoint",
                "/bin/sh",
                "--expose",
                "8089/tcp",
                "--publish",
                "0.0.0.0::8089/tcp",
                "--mount",
                "type=volume,source=vol-1,target=/proj",
                "alpine:3.20",
                "-c",
                "sleep infinity",
            ]
        );
    }

    #[test]
    fn test_parse_container_list() {
        let output = r#"{"ID":"abc123","Names":"gitspace-u1-proj","Image":"alpine","Status":"Exited (0) 2 hours ago","State":"exited"}
{"ID":"def456","Names":"other","Image":"alpine","Status":"Up 2 hours","State":"running"}
"#;
        let containers = CliRuntime::parse_container_list(output).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].id, "abc123");
        assert_eq!(containers[0].state, "exited");
        assert!(containers[0].has_name("gitspace-u1-proj"));
        assert!(!containers[1].has_name("gitspace-u1-proj"));
    }

    #[test]
    fn test_parse_podman_container_list() {
        let output = r#"{"Id":"abc123","Names":["gitspace-u1-proj"],"Image":"docker.io/library/alpine:latest","Status":"Up 2 hours","State":"running"}
{"Id":"def456","Names":["gitspace-u1-proj-2","alias"],"Image":"alpine","State":"exited"}
"#;
        let containers = CliRuntime::parse_container_list(output).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].id, "abc123");
        assert_eq!(containers[0].state, "running");
        assert!(containers[0].has_name("gitspace-u1-proj"));
        assert_eq!(containers[1].names, vec!["gitspace-u1-proj-2", "alias"]);
        assert!(!containers[1].has_name("gitspace-u1-proj"));
    }

    #[test]
    fn test_parse_container_inspect_takes_first_host_binding() {
        let output = r#"[{
            "Id": "abc123",
            "Name": "/gitspace-u1-proj",
            "Config": {"Image": "alpine"},
            "State": {"Status": "running"},
            "NetworkSettings": {"Ports": {
                "8089/tcp": [
                    {"HostIp": "0.0.0.0", "HostPort": "49153"},
                    {"HostIp": "::", "HostPort": "49154"}
                ],
                "9000/tcp": null
            }}
        }]"#;
        let info = CliRuntime::parse_container_inspect(output)
            .unwrap()
            .unwrap();
        assert_eq!(info.id, "abc123");
        assert_eq!(info.names, vec!["gitspace-u1-proj"]);
        assert_eq!(info.state, "running");
        assert_eq!(info.host_port_for("8089/tcp"), Some(49153));
        assert_eq!(info.host_port_for("9000/tcp"), None);
    }

    #[test]
    fn test_parse_container_inspect_empty() {
        assert!(CliRuntime::parse_container_inspect("[]").unwrap().is_none());
    }

    #[test]
    fn test_exec_result_combined_output() {
        let result = ExecResult {
            exit_code: 1,
            success: false,
            stdout: "cloning".to_string(),
            stderr: "fatal: not found\n".to_string(),
        };
        assert_eq!(result.combined_output(), "cloning\nfatal: not found\n");
    }

    #[tokio::test]
    async fn test_mock_lifecycle_transitions() {
        let docker = MockDocker::new();
        let mut port_bindings = BTreeMap::new();
        port_bindings.insert(
            "8089/tcp".to_string(),
            vec![PortBinding {
                host_ip: "0.0.0.0".to_string(),
                host_port: "0".to_string(),
            }],
        );
        let options = CreateContainerOptions {
            name: "gitspace-u1-proj".to_string(),
            image: "alpine".to_string(),
            port_bindings,
            ..Default::default()
        };

        let id = docker.create_container(&options).await.unwrap();
        assert_eq!(docker.container("gitspace-u1-proj").unwrap().state, "created");

        docker.start_container(&id).await.unwrap();
        let info = docker.inspect_container("gitspace-u1-proj").await.unwrap().unwrap();
        assert_eq!(info.state, "running");
        assert_eq!(
            info.host_port_for("8089/tcp"),
            Some(mock::FIRST_EPHEMERAL_PORT)
        );

        docker.stop_container(&id, None).await.unwrap();
        assert_eq!(docker.container("gitspace-u1-proj").unwrap().state, "exited");

        docker.remove_container(&id, true).await.unwrap();
        assert!(docker.container("gitspace-u1-proj").is_none());
        assert_eq!(
            docker.operations(),
            vec![
                MockOperation::Create,
                MockOperation::Start,
                MockOperation::Inspect,
                MockOperation::Stop,
                MockOperation::Remove,
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_list_filter_is_substring() {
        let docker = MockDocker::new();
        docker.add_container(MockContainer::new(
            "1".into(),
            "gitspace-u1-proj".into(),
            "alpine".into(),
        ));
        docker.add_container(MockContainer::new(
            "2".into(),
            "gitspace-u1-proj-2".into(),
            "alpine".into(),
        ));

        let listed = docker
            .list_containers(Some("gitspace-u1-proj"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let docker = MockDocker::new();
        docker.fail_on(MockOperation::Pull);
        let err = docker.pull_image("alpine").await.unwrap_err();
        assert!(err.to_string().contains("mock Pull failure"));
    }
}
