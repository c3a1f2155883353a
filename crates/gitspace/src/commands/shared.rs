//! Helpers shared by the gitspace subcommands

use anyhow::{Context, Result};
use gitspace_core::config::{load_json5_file, DevcontainerConfig, GitspaceConfig};
use std::path::Path;
use tracing::debug;

/// Load a gitspace record from a JSON5 file
pub fn load_gitspace(path: &Path) -> Result<GitspaceConfig> {
    let gitspace: GitspaceConfig = load_json5_file(path)
        .with_context(|| format!("Failed to load gitspace from {}", path.display()))?;
    debug!(
        "Loaded gitspace {} for user {} (id {})",
        gitspace.identifier, gitspace.user_id, gitspace.id
    );
    Ok(gitspace)
}

/// Load the devcontainer subset, or an empty one when no file is given
pub fn load_devcontainer(path: Option<&Path>) -> Result<DevcontainerConfig> {
    match path {
        Some(path) => load_json5_file(path)
            .with_context(|| format!("Failed to load devcontainer from {}", path.display())),
        None => Ok(DevcontainerConfig::default()),
    }
}
