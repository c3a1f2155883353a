//! Gitspace and orchestrator configuration
//!
//! Input records handed to every orchestrator operation plus the orchestrator's
//! own settings. Gitspace records are owned by the caller; this crate never
//! persists them.

use crate::errors::{ConfigError, GitspaceError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Base image used when the devcontainer does not declare one
pub const DEFAULT_BASE_IMAGE: &str = "mcr.microsoft.com/devcontainers/base:dev-ubuntu-24.04";

/// In-container development environment front ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdeType {
    /// Desktop VS Code attached over SSH
    VsCode,
    /// Browser-based VS Code (code-server)
    VsCodeWeb,
}

impl IdeType {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VsCode => "vs_code",
            Self::VsCodeWeb => "vs_code_web",
        }
    }
}

impl std::fmt::Display for IdeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IdeType {
    type Err = GitspaceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vs_code" | "vscode" => Ok(Self::VsCode),
            "vs_code_web" | "vscode-web" | "vscodeweb" => Ok(Self::VsCodeWeb),
            _ => Err(GitspaceError::UnsupportedIde { ide: s.to_string() }),
        }
    }
}

/// How the user authenticates against the IDE inside the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Username and password
    #[default]
    UserCredentials,
    /// Public key authentication
    SshKey,
}

/// Per-instance access information consumed by IDE setup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitspaceInstance {
    /// Instance identifier
    pub identifier: String,
    /// Authentication mode
    #[serde(default)]
    pub access_type: AccessType,
    /// Password or public key, depending on `access_type`
    #[serde(default)]
    pub access_key: Option<String>,
    /// Login user inside the container
    #[serde(default = "default_username")]
    pub username: String,
}

fn default_username() -> String {
    "harness".to_string()
}

/// Identifies one gitspace and what should run inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitspaceConfig {
    /// Numeric gitspace id, used to address the log stream
    pub id: i64,
    /// User-chosen identifier, unique per user
    pub identifier: String,
    /// Owning user
    pub user_id: String,
    /// Repository to check out
    pub code_repo_url: String,
    /// Branch to check out
    pub branch: String,
    /// IDE to install and launch
    pub ide: IdeType,
    /// Access information for the IDE
    #[serde(default)]
    pub instance: GitspaceInstance,
}

/// The subset of `devcontainer.json` the orchestrator acts on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevcontainerConfig {
    /// Base image override
    #[serde(default)]
    pub image: Option<String>,
    /// Shell command executed once after the code is checked out
    #[serde(default)]
    pub post_create_command: Option<String>,
}

impl DevcontainerConfig {
    /// Declared image, treating an empty string as absent
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Declared post-create command, treating an empty string as absent
    pub fn post_create_command(&self) -> Option<&str> {
        self.post_create_command
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Image pulled when the devcontainer declares none
    pub default_base_image: String,
    /// Deadline applied to each public operation
    pub operation_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_base_image: DEFAULT_BASE_IMAGE.to_string(),
            operation_timeout: None,
        }
    }
}

impl OrchestratorConfig {
    /// Build settings from defaults overridden by environment variables
    ///
    /// * `GITSPACE_DEFAULT_BASE_IMAGE` - image used when the devcontainer declares none
    /// * `GITSPACE_OPERATION_TIMEOUT_SECS` - per-operation deadline in seconds
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(image) = std::env::var("GITSPACE_DEFAULT_BASE_IMAGE") {
            if !image.trim().is_empty() {
                config.default_base_image = image;
            }
        }

        if let Ok(raw) = std::env::var("GITSPACE_OPERATION_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| ConfigError::Validation {
                message: format!(
                    "GITSPACE_OPERATION_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    raw
                ),
            })?;
            config.operation_timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Resolve the image for a devcontainer
    pub fn resolve_image<'a>(&'a self, devcontainer: &'a DevcontainerConfig) -> &'a str {
        devcontainer.image().unwrap_or(&self.default_base_image)
    }
}

/// Load a JSON5 document (JSON with comments and trailing commas) into `T`
pub fn load_json5_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    debug!("Loading configuration from {}", path.display());

    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.display().to_string(),
        }
        .into());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        debug!("Failed to read configuration file: {}", e);
        ConfigError::Io(e)
    })?;

    let raw_value: serde_json::Value = json5::from_str(&content).map_err(|e| {
        debug!("Failed to parse configuration file: {}", e);
        ConfigError::Parsing {
            message: format!("JSON parsing error: {}", e),
        }
    })?;

    if !raw_value.is_object() {
        return Err(ConfigError::Validation {
            message: format!(
                "Configuration ({}) must contain a JSON object literal.",
                path.display()
            ),
        }
        .into());
    }

    let config = serde_json::from_value(raw_value).map_err(|e| {
        debug!("Failed to deserialize configuration: {}", e);
        ConfigError::Validation {
            message: format!("Deserialization error: {}", e),
        }
    })?;

    Ok(config)
}
