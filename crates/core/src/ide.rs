//! IDE services installed and launched inside gitspace containers
//!
//! Each IDE declares the container port it listens on and knows how to set
//! itself up and start itself through a [`Devcontainer`] handle. The
//! [`IdeRegistry`] maps IDE types to implementations and is resolved once per
//! orchestrator operation.

use crate::config::{AccessType, GitspaceInstance, IdeType};
use crate::devcontainer::Devcontainer;
use crate::errors::{GitspaceError, Result};
use crate::templates::{self, RunIdePayload, ScriptTemplate, SetupSshServerPayload};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// SSH port used by desktop VS Code
pub const VS_CODE_PORT: u16 = 8088;
/// code-server port used by VS Code Web
pub const VS_CODE_WEB_PORT: u16 = 8089;

/// An in-container development environment front end
#[async_trait]
pub trait Ide: Send + Sync {
    /// IDE type served by this implementation
    fn ide_type(&self) -> IdeType;

    /// Container port and protocol the IDE listens on (e.g. `"8089/tcp"`), if any
    fn port_and_protocol(&self) -> Option<String>;

    /// Install and configure the IDE, returning the command output
    async fn setup(&self, devcontainer: &Devcontainer, instance: &GitspaceInstance)
        -> Result<String>;

    /// Start the IDE, returning the command output
    async fn run(&self, devcontainer: &Devcontainer) -> Result<String>;
}

/// Desktop VS Code, attached over SSH
#[derive(Debug, Clone)]
pub struct VsCode {
    port: u16,
}

impl VsCode {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for VsCode {
    fn default() -> Self {
        Self::new(VS_CODE_PORT)
    }
}

#[async_trait]
impl Ide for VsCode {
    fn ide_type(&self) -> IdeType {
        IdeType::VsCode
    }

    fn port_and_protocol(&self) -> Option<String> {
        Some(format!("{}/tcp", self.port))
    }

    #[instrument(skip(self, devcontainer, instance), fields(container = %devcontainer.container_name()))]
    async fn setup(
        &self,
        devcontainer: &Devcontainer,
        instance: &GitspaceInstance,
    ) -> Result<String> {
        let access_key = instance.access_key.clone().unwrap_or_default();
        let (password, access_key) = match instance.access_type {
            AccessType::UserCredentials => (access_key, String::new()),
            AccessType::SshKey => (String::new(), access_key),
        };
        let payload = SetupSshServerPayload {
            username: instance.username.clone(),
            password,
            access_key,
            working_dir: devcontainer.working_dir().to_string(),
        };
        let script = templates::render(ScriptTemplate::SetupSshServer, &payload)?;
        debug!("Setting up SSH server for {}", instance.username);
        devcontainer.exec_command(&script, false).await
    }

    #[instrument(skip(self, devcontainer), fields(container = %devcontainer.container_name()))]
    async fn run(&self, devcontainer: &Devcontainer) -> Result<String> {
        let payload = RunIdePayload {
            port: self.port.to_string(),
            working_dir: devcontainer.working_dir().to_string(),
        };
        let script = templates::render(ScriptTemplate::RunSshServer, &payload)?;
        devcontainer.exec_command(&script, false).await
    }
}

/// Browser VS Code served by code-server
#[derive(Debug, Clone)]
pub struct VsCodeWeb {
    port: u16,
}

impl VsCodeWeb {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

impl Default for VsCodeWeb {
    fn default() -> Self {
        Self::new(VS_CODE_WEB_PORT)
    }
}

#[async_trait]
impl Ide for VsCodeWeb {
    fn ide_type(&self) -> IdeType {
        IdeType::VsCodeWeb
    }

    fn port_and_protocol(&self) -> Option<String> {
        Some(format!("{}/tcp", self.port))
    }

    #[instrument(skip(self, devcontainer, _instance), fields(container = %devcontainer.container_name()))]
    async fn setup(
        &self,
        devcontainer: &Devcontainer,
        _instance: &GitspaceInstance,
    ) -> Result<String> {
        let script = templates::render(ScriptTemplate::SetupVsCodeWeb, &())?;
        devcontainer.exec_command(&script, false).await
    }

    #[instrument(skip(self, devcontainer), fields(container = %devcontainer.container_name()))]
    async fn run(&self, devcontainer: &Devcontainer) -> Result<String> {
        let payload = RunIdePayload {
            port: self.port.to_string(),
            working_dir: devcontainer.working_dir().to_string(),
        };
        let script = templates::render(ScriptTemplate::RunVsCodeWeb, &payload)?;
        // code-server stays in the foreground, so it runs detached
        devcontainer.exec_command(&script, true).await
    }
}

/// IDE implementations by type
#[derive(Clone, Default)]
pub struct IdeRegistry {
    ides: HashMap<IdeType, Arc<dyn Ide>>,
}

impl std::fmt::Debug for IdeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdeRegistry")
            .field("ides", &self.ides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IdeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with VS Code and VS Code Web on their default ports
    pub fn with_defaults() -> Self {
        Self::new()
            .with_ide(Arc::new(VsCode::default()))
            .with_ide(Arc::new(VsCodeWeb::default()))
    }

    /// Bind an implementation to its IDE type, replacing any previous one
    pub fn with_ide(mut self, ide: Arc<dyn Ide>) -> Self {
        self.ides.insert(ide.ide_type(), ide);
        self
    }

    /// Implementation for `ide_type`
    pub fn get(&self, ide_type: IdeType) -> Result<Arc<dyn Ide>> {
        self.ides
            .get(&ide_type)
            .cloned()
            .ok_or_else(|| GitspaceError::UnsupportedIde {
                ide: ide_type.to_string(),
            })
    }
}
