//! Gitspace lifecycle and teardown drivers
//!
//! The [`Orchestrator`] provisions, resumes, stops and removes gitspace
//! containers. It keeps no record of what it did: every call probes the
//! runtime for the container's current state and dispatches on it.
//!
//! ## Create and start
//!
//! | Probed state | Action                                                        |
//! |--------------|---------------------------------------------------------------|
//! | running      | nothing                                                       |
//! | stopped      | start container, run IDE                                      |
//! | removed      | pull, create, start, setup IDE, run IDE, clone, post-create   |
//! | other        | bad state error, no runtime mutation                          |
//!
//! In every successful case the container is then inspected for its id and the
//! host port bound to the IDE.
//!
//! Each step that mutates a container narrates itself into the gitspace's log
//! stream ("Pulling image: ...", "Successfully pulled image", or
//! "Error while pulling image: ..."). A failed step aborts the pipeline and
//! leaves the container as it is; the next call re-probes and continues from
//! there.
//!
//! With an operation timeout configured, a step still running at the deadline
//! is abandoned and recorded as failed, and the log stream is flushed as on
//! any other exit.

use crate::config::{DevcontainerConfig, GitspaceConfig, IdeType, OrchestratorConfig};
use crate::container::{self, probe_state, ContainerIdentity, ContainerState};
use crate::devcontainer::Devcontainer;
use crate::docker::Docker;
use crate::errors::{DockerError, ErrorContext, GitspaceError, Result};
use crate::ide::{Ide, IdeRegistry};
use crate::infra::Infrastructure;
use crate::logstream::{LogStream, LogStreamFactory};
use crate::observability::{self, TimedSpan};
use crate::runtime::DockerClientFactory;
use crate::templates::{self, CloneGitPayload, ScriptTemplate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn, Instrument};

/// Connection details of a started gitspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub container_id: String,
    pub container_name: String,
    /// Host port bound to each IDE's container port
    pub ports_mapped: HashMap<IdeType, u16>,
}

/// In-process mutual exclusion per container name
///
/// Mutating operations on the same gitspace are serialized; operations on
/// different gitspaces never wait on each other. Other processes driving the
/// same runtime are not covered.
#[derive(Debug, Clone, Default)]
pub struct IdentityLocks {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl IdentityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `container_name`
    pub async fn acquire(&self, container_name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only the map still references are idle
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(container_name.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of names currently held or awaited
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

/// Point in time by which an operation must finish
#[derive(Debug, Clone, Copy)]
struct Deadline {
    operation: &'static str,
    after: Duration,
    at: Instant,
}

impl Deadline {
    fn start(operation: &'static str, timeout: Option<Duration>) -> Option<Self> {
        timeout.map(|after| Self {
            operation,
            after,
            at: Instant::now() + after,
        })
    }

    fn expired(&self) -> GitspaceError {
        warn!("{} timed out after {:?}", self.operation, self.after);
        GitspaceError::Timeout {
            operation: self.operation.to_string(),
            after: self.after,
        }
    }
}

/// Run `fut`, giving up once `deadline` has passed
async fn within<T, F>(deadline: Option<Deadline>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline.at, fut)
            .await
            .map_err(|_| deadline.expired())?,
        None => fut.await,
    }
}

/// Operator log for one operation
struct OperatorLog {
    gitspace_id: i64,
    stream: Box<dyn LogStream>,
    /// Failure line prefix of the step currently running
    in_flight: Option<&'static str>,
}

impl OperatorLog {
    async fn open(factory: &dyn LogStreamFactory, gitspace_id: i64) -> Result<Self> {
        let stream = factory
            .create_log_stream(gitspace_id)
            .await
            .with_context(|| format!("error getting log stream for gitspace ID {}", gitspace_id))?;
        Ok(Self {
            gitspace_id,
            stream,
            in_flight: None,
        })
    }

    async fn write(&mut self, line: impl AsRef<str>) -> Result<()> {
        self.stream
            .write(line.as_ref())
            .await
            .map_err(GitspaceError::Logging)
    }

    /// Record a failed step, keeping both errors if the record itself fails
    async fn fail(&mut self, line: String, err: GitspaceError) -> GitspaceError {
        match self.stream.write(&line).await {
            Ok(()) => err,
            Err(logging) => GitspaceError::with_logging_failure(Some(err), logging),
        }
    }

    /// Run one step: announce it, run `op`, record a failure with `context`
    async fn step<T, F>(
        &mut self,
        start: String,
        failure: &'static str,
        context: String,
        op: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.write(start).await?;
        self.in_flight = Some(failure);
        let outcome = op.await;
        self.in_flight = None;
        match outcome {
            Ok(value) => Ok(value),
            Err(err) => {
                let line = format!("{}: {}", failure, err);
                Err(self.fail(line, err.context(context)).await)
            }
        }
    }

    /// Flush and fold a flush failure into the operation's result
    ///
    /// A step cut off by the deadline never recorded its failure; that line is
    /// written here before flushing.
    async fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        let result = match (self.in_flight.take(), result) {
            (Some(failure), Err(err)) => {
                let line = format!("{}: {}", failure, err);
                Err(self.fail(line, err).await)
            }
            (_, result) => result,
        };

        match self.stream.flush().await {
            Ok(()) => result,
            Err(logging) => {
                warn!(
                    "Failed to flush log stream for gitspace ID {}: {}",
                    self.gitspace_id, logging
                );
                Err(GitspaceError::with_logging_failure(result.err(), logging))
            }
        }
    }
}

/// Drives gitspace containers through their lifecycle
pub struct Orchestrator {
    config: OrchestratorConfig,
    client_factory: Arc<dyn DockerClientFactory>,
    log_factory: Arc<dyn LogStreamFactory>,
    ides: IdeRegistry,
    locks: IdentityLocks,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("ides", &self.ides)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        client_factory: Arc<dyn DockerClientFactory>,
        log_factory: Arc<dyn LogStreamFactory>,
        ides: IdeRegistry,
    ) -> Self {
        Self {
            config,
            client_factory,
            log_factory,
            ides,
            locks: IdentityLocks::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Per-identity locks held by this orchestrator
    pub fn locks(&self) -> &IdentityLocks {
        &self.locks
    }

    /// Bring a gitspace to running and report how to reach its IDE
    ///
    /// Starts a stopped container, provisions a removed one from scratch and
    /// leaves a running one untouched. `repo_name` names the working
    /// directory `/{repo_name}` inside the container.
    pub async fn create_and_start_gitspace(
        &self,
        gitspace: &GitspaceConfig,
        devcontainer: &DevcontainerConfig,
        infra: &Infrastructure,
        repo_name: &str,
    ) -> Result<PipelineResult> {
        let name = ContainerIdentity::from_config(gitspace).container_name();
        let timed = TimedSpan::new(observability::gitspace_start_span(&name, gitspace.id));

        let result = async {
            let ide = self.ides.get(gitspace.ide)?;
            let _guard = self.locks.acquire(&name).await;
            let docker = self.new_client(infra).await?;
            let deadline =
                Deadline::start("create and start gitspace", self.config.operation_timeout);

            let result = self
                .create_and_start_with(
                    &docker,
                    &name,
                    gitspace,
                    devcontainer,
                    infra,
                    repo_name,
                    ide.as_ref(),
                    deadline,
                )
                .await;
            release_client(docker.as_ref()).await;
            result
        }
        .instrument(timed.span())
        .await;

        timed.complete();
        result
    }

    /// Stop a gitspace's container
    ///
    /// Fails if the container does not exist; succeeds without touching the
    /// runtime if it is already stopped.
    pub async fn stop_gitspace(
        &self,
        gitspace: &GitspaceConfig,
        infra: &Infrastructure,
    ) -> Result<()> {
        let name = ContainerIdentity::from_config(gitspace).container_name();
        let timed = TimedSpan::new(observability::gitspace_stop_span(&name, gitspace.id));

        let result = async {
            let _guard = self.locks.acquire(&name).await;
            let docker = self.new_client(infra).await?;
            let deadline = Deadline::start("stop gitspace", self.config.operation_timeout);
            let result = self
                .stop_with(docker.as_ref(), &name, gitspace.id, deadline)
                .await;
            release_client(docker.as_ref()).await;
            result
        }
        .instrument(timed.span())
        .await;

        timed.complete();
        result
    }

    /// Stop (if needed) and force-remove a gitspace's container
    ///
    /// Succeeds without touching the runtime if the container is already gone.
    pub async fn stop_and_remove_gitspace(
        &self,
        gitspace: &GitspaceConfig,
        infra: &Infrastructure,
    ) -> Result<()> {
        let name = ContainerIdentity::from_config(gitspace).container_name();
        let timed = TimedSpan::new(observability::gitspace_remove_span(&name, gitspace.id));

        let result = async {
            let _guard = self.locks.acquire(&name).await;
            let docker = self.new_client(infra).await?;
            let deadline =
                Deadline::start("stop and remove gitspace", self.config.operation_timeout);
            let result = self
                .stop_and_remove_with(docker.as_ref(), &name, gitspace.id, deadline)
                .await;
            release_client(docker.as_ref()).await;
            result
        }
        .instrument(timed.span())
        .await;

        timed.complete();
        result
    }

    /// Liveness of the infrastructure
    ///
    /// The container host is verified by the provisioning layer that hands
    /// out `infra`, so there is nothing left to check here.
    #[instrument(skip(self, infra), fields(infra = %infra.identifier))]
    pub async fn status(&self, infra: &Infrastructure) -> Result<()> {
        debug!("Status is verified by the infrastructure provider");
        Ok(())
    }

    async fn open_log(&self, gitspace_id: i64, deadline: Option<Deadline>) -> Result<OperatorLog> {
        within(
            deadline,
            OperatorLog::open(self.log_factory.as_ref(), gitspace_id),
        )
        .await
    }

    async fn new_client(&self, infra: &Infrastructure) -> Result<Arc<dyn Docker>> {
        self.client_factory
            .new_client(infra)
            .await
            .with_context(|| "error getting docker client from docker client factory")
    }

    #[allow(clippy::too_many_arguments)]
    async fn create_and_start_with(
        &self,
        docker: &Arc<dyn Docker>,
        name: &str,
        gitspace: &GitspaceConfig,
        devcontainer_config: &DevcontainerConfig,
        infra: &Infrastructure,
        repo_name: &str,
        ide: &dyn Ide,
        deadline: Option<Deadline>,
    ) -> Result<PipelineResult> {
        debug!("Checking current state of gitspace");
        let state = within(deadline, probe(docker.as_ref(), name)).await?;
        let working_dir = container::working_dir(repo_name);

        match state {
            ContainerState::Running => {
                info!("Gitspace {} is already running", name);
            }
            ContainerState::Stopped => {
                info!("Gitspace {} is stopped, starting it", name);
                let mut log = self.open_log(gitspace.id, deadline).await?;
                let result = within(deadline, async {
                    start_container(docker.as_ref(), name, &mut log).await?;
                    let devcontainer = Devcontainer::new(name, working_dir.as_str(), docker.clone());
                    run_ide(&devcontainer, ide, &mut log).await
                })
                .await;
                log.finish(result).await?;
                info!("Started gitspace {}", name);
            }
            ContainerState::Removed => {
                info!("Gitspace {} is removed, creating it", name);
                let mut log = self.open_log(gitspace.id, deadline).await?;
                let result = within(deadline, async {
                    self.provision(
                        docker,
                        name,
                        gitspace,
                        devcontainer_config,
                        &infra.storage,
                        &working_dir,
                        ide,
                        &mut log,
                    )
                    .await
                    .with_context(|| format!("failed to start gitspace {}", name))
                })
                .await;
                log.finish(result).await?;
                info!("Started gitspace {}", name);
            }
            ContainerState::Invalid(status) => {
                return Err(GitspaceError::BadState {
                    name: name.to_string(),
                    status,
                });
            }
        }

        within(deadline, container_info(docker.as_ref(), name, ide)).await
    }

    /// Full creation pipeline for a container that does not exist
    #[allow(clippy::too_many_arguments)]
    async fn provision(
        &self,
        docker: &Arc<dyn Docker>,
        name: &str,
        gitspace: &GitspaceConfig,
        devcontainer_config: &DevcontainerConfig,
        storage: &str,
        working_dir: &str,
        ide: &dyn Ide,
        log: &mut OperatorLog,
    ) -> Result<()> {
        let image = self.config.resolve_image(devcontainer_config);

        pull_image(docker.as_ref(), image, log).await?;
        create_container(docker.as_ref(), name, image, ide, storage, working_dir, log).await?;
        start_container(docker.as_ref(), name, log).await?;

        let devcontainer = Devcontainer::new(name, working_dir, docker.clone());
        setup_ide(&devcontainer, ide, gitspace, log).await?;
        run_ide(&devcontainer, ide, log).await?;
        clone_code(&devcontainer, gitspace, image, log).await?;
        execute_post_create_command(&devcontainer, devcontainer_config, log).await
    }

    async fn stop_with(
        &self,
        docker: &dyn Docker,
        name: &str,
        gitspace_id: i64,
        deadline: Option<Deadline>,
    ) -> Result<()> {
        debug!("Checking current state of gitspace");
        match within(deadline, probe(docker, name)).await? {
            ContainerState::Removed => {
                return Err(GitspaceError::Removed {
                    name: name.to_string(),
                })
            }
            ContainerState::Stopped => {
                info!("Gitspace {} is already stopped", name);
                return Ok(());
            }
            ContainerState::Running | ContainerState::Invalid(_) => {}
        }

        let mut log = self.open_log(gitspace_id, deadline).await?;
        let result = within(deadline, async {
            stop_container(docker, name, &mut log)
                .await
                .with_context(|| format!("failed to stop gitspace {}", name))
        })
        .await;
        log.finish(result).await?;
        info!("Stopped gitspace {}", name);
        Ok(())
    }

    async fn stop_and_remove_with(
        &self,
        docker: &dyn Docker,
        name: &str,
        gitspace_id: i64,
        deadline: Option<Deadline>,
    ) -> Result<()> {
        debug!("Checking current state of gitspace");
        let state = within(deadline, probe(docker, name)).await?;
        if state == ContainerState::Removed {
            info!("Gitspace {} is already removed", name);
            return Ok(());
        }

        let mut log = self.open_log(gitspace_id, deadline).await?;
        let result = within(deadline, async {
            if state != ContainerState::Stopped {
                stop_container(docker, name, &mut log)
                    .await
                    .with_context(|| format!("failed to stop gitspace {}", name))?;
                info!("Stopped gitspace {}", name);
            }
            remove_container(docker, name, &mut log)
                .await
                .with_context(|| format!("failed to remove gitspace {}", name))
        })
        .await;
        log.finish(result).await?;
        info!("Removed gitspace {}", name);
        Ok(())
    }
}

/// Release the runtime client; failures are logged and otherwise ignored
async fn release_client(docker: &dyn Docker) {
    if let Err(e) = docker.close().await {
        warn!("Failed to close docker client: {}", e);
    }
}

async fn probe(docker: &dyn Docker, name: &str) -> Result<ContainerState> {
    probe_state(docker, name)
        .instrument(observability::container_probe_span(name))
        .await
}

async fn container_info(docker: &dyn Docker, name: &str, ide: &dyn Ide) -> Result<PipelineResult> {
    let info = docker
        .inspect_container(name)
        .await
        .with_context(|| format!("could not inspect container {}", name))?
        .ok_or_else(|| {
            GitspaceError::from(DockerError::ContainerNotFound {
                id: name.to_string(),
            })
            .context(format!("could not inspect container {}", name))
        })?;

    let mut ports_mapped = HashMap::new();
    if let Some(port) = ide
        .port_and_protocol()
        .and_then(|port_and_protocol| info.host_port_for(&port_and_protocol))
    {
        ports_mapped.insert(ide.ide_type(), port);
    }

    Ok(PipelineResult {
        container_id: info.id,
        container_name: name.to_string(),
        ports_mapped,
    })
}

async fn pull_image(docker: &dyn Docker, image: &str, log: &mut OperatorLog) -> Result<()> {
    let timed = TimedSpan::new(observability::container_pull_span(image));
    let output = log
        .step(
            format!("Pulling image: {}", image),
            "Error while pulling image",
            format!("could not pull image {}", image),
            docker.pull_image(image),
        )
        .instrument(timed.span())
        .await?;
    timed.complete();

    log.write(format!("Pulling image output...\n{}", output)).await?;
    log.write("Successfully pulled image").await
}

async fn create_container(
    docker: &dyn Docker,
    name: &str,
    image: &str,
    ide: &dyn Ide,
    storage: &str,
    working_dir: &str,
    log: &mut OperatorLog,
) -> Result<()> {
    let port_and_protocol = ide.port_and_protocol();
    let options = container::create_options(
        name,
        image,
        port_and_protocol.as_deref(),
        storage,
        working_dir,
    );

    let timed = TimedSpan::new(observability::container_create_span(name, image));
    let id = log
        .step(
            format!("Creating container: {}", name),
            "Error while creating container",
            format!("could not create container {}", name),
            docker.create_container(&options),
        )
        .instrument(timed.span())
        .await?;
    timed.complete();

    debug!("Created container {} ({})", name, id);
    log.write("Successfully created container").await
}

async fn start_container(docker: &dyn Docker, name: &str, log: &mut OperatorLog) -> Result<()> {
    log.step(
        format!("Starting container: {}", name),
        "Error while starting container",
        format!("could not start container {}", name),
        docker.start_container(name),
    )
    .await?;
    log.write("Successfully started container").await
}

async fn setup_ide(
    devcontainer: &Devcontainer,
    ide: &dyn Ide,
    gitspace: &GitspaceConfig,
    log: &mut OperatorLog,
) -> Result<()> {
    let timed = TimedSpan::new(observability::ide_setup_span(ide.ide_type().as_str()));
    let output = log
        .step(
            format!("Setting up IDE inside container: {}", ide.ide_type()),
            "Error while setting up IDE inside container",
            format!(
                "failed to setup IDE for gitspace {}",
                devcontainer.container_name()
            ),
            ide.setup(devcontainer, &gitspace.instance),
        )
        .instrument(timed.span())
        .await?;
    timed.complete();

    log.write(format!("IDE setup output...\n{}", output)).await?;
    log.write("Successfully set up IDE inside container").await
}

async fn run_ide(devcontainer: &Devcontainer, ide: &dyn Ide, log: &mut OperatorLog) -> Result<()> {
    let timed = TimedSpan::new(observability::ide_run_span(ide.ide_type().as_str()));
    let output = log
        .step(
            format!("Running the IDE inside container: {}", ide.ide_type()),
            "Error while running IDE inside container",
            format!(
                "failed to run the IDE for gitspace {}",
                devcontainer.container_name()
            ),
            ide.run(devcontainer),
        )
        .instrument(timed.span())
        .await?;
    timed.complete();

    log.write(format!("IDE run output...\n{}", output)).await?;
    log.write("Successfully run the IDE inside container").await
}

async fn clone_code(
    devcontainer: &Devcontainer,
    gitspace: &GitspaceConfig,
    image: &str,
    log: &mut OperatorLog,
) -> Result<()> {
    let payload = CloneGitPayload {
        repo_url: gitspace.code_repo_url.clone(),
        image: image.to_string(),
        branch: gitspace.branch.clone(),
    };
    let script = templates::render(ScriptTemplate::CloneGit, &payload).with_context(|| {
        format!(
            "failed to generate script to clone git from template {}",
            ScriptTemplate::CloneGit.name()
        )
    })?;

    let timed = TimedSpan::new(observability::code_clone_span(
        &gitspace.code_repo_url,
        &gitspace.branch,
    ));
    let output = log
        .step(
            format!(
                "Cloning git repo inside container: {} branch: {}",
                gitspace.code_repo_url, gitspace.branch
            ),
            "Error while cloning git repo inside container",
            "failed to clone code".to_string(),
            devcontainer.exec_command(&script, false),
        )
        .instrument(timed.span())
        .await?;
    timed.complete();

    log.write(format!("Cloning git repo output...\n{}", output)).await?;
    log.write("Successfully cloned git repo inside container").await
}

async fn execute_post_create_command(
    devcontainer: &Devcontainer,
    devcontainer_config: &DevcontainerConfig,
    log: &mut OperatorLog,
) -> Result<()> {
    let Some(command) = devcontainer_config.post_create_command() else {
        return log
            .write("No post-create command provided, skipping execution")
            .await;
    };

    let timed = TimedSpan::new(observability::post_create_span());
    let output = log
        .step(
            format!("Executing postCreate command: {}", command),
            "Error while executing postCreate command",
            format!("failed to execute postCreate command {:?}", command),
            devcontainer.exec_command(command, false),
        )
        .instrument(timed.span())
        .await?;
    timed.complete();

    log.write(format!("Post create command execution output...\n{}", output))
        .await?;
    log.write("Successfully executed postCreate command").await
}

async fn stop_container(docker: &dyn Docker, name: &str, log: &mut OperatorLog) -> Result<()> {
    log.step(
        format!("Stopping container: {}", name),
        "Error while stopping container",
        format!("could not stop container {}", name),
        docker.stop_container(name, None),
    )
    .await?;
    log.write("Successfully stopped container").await
}

async fn remove_container(docker: &dyn Docker, name: &str, log: &mut OperatorLog) -> Result<()> {
    log.step(
        format!("Removing container: {}", name),
        "Error while removing container",
        format!("could not remove container {}", name),
        docker.remove_container(name, true),
    )
    .await?;
    log.write("Successfully removed container").await
}
