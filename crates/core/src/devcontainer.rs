//! In-container command execution handle
//!
//! A [`Devcontainer`] binds a container name, the repository working directory
//! and a runtime client for the duration of one pipeline invocation.

use crate::docker::{Docker, ExecConfig};
use crate::errors::{DockerError, Result};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Working-session handle onto a gitspace container
#[derive(Clone)]
pub struct Devcontainer {
    container_name: String,
    working_dir: String,
    docker: Arc<dyn Docker>,
}

impl std::fmt::Debug for Devcontainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Devcontainer")
            .field("container_name", &self.container_name)
            .field("working_dir", &self.working_dir)
            .finish_non_exhaustive()
    }
}

impl Devcontainer {
    pub fn new(
        container_name: impl Into<String>,
        working_dir: impl Into<String>,
        docker: Arc<dyn Docker>,
    ) -> Self {
        Self {
            container_name: container_name.into(),
            working_dir: working_dir.into(),
            docker,
        }
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub fn working_dir(&self) -> &str {
        &self.working_dir
    }

    /// Run `script` with `/bin/sh -c` in the working directory
    ///
    /// Returns stdout followed by stderr. A non-zero exit status is an
    /// [`DockerError::ExecFailed`] carrying the output produced so far. With
    /// `detach` the command keeps running in the background and no output is
    /// captured.
    #[instrument(skip(self, script), fields(container = %self.container_name))]
    pub async fn exec_command(&self, script: &str, detach: bool) -> Result<String> {
        let command = vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()];
        let config = ExecConfig {
            working_dir: Some(self.working_dir.clone()),
            detach,
            ..Default::default()
        };

        let result = self
            .docker
            .exec(&self.container_name, &command, config)
            .await?;
        let output = result.combined_output();
        debug!("Command exited with code {}", result.exit_code);

        if !result.success {
            return Err(DockerError::ExecFailed {
                code: result.exit_code,
                output,
            }
            .into());
        }
        Ok(output)
    }
}
