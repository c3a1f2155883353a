//! Script templates executed inside gitspace containers
//!
//! Scripts are embedded at compile time and rendered against a payload.
//! Placeholders use the form `{{name}}`; every substituted value is shell-quoted,
//! so payload values (URLs, branch names, keys) are always single words.
//!
//! ## Templates
//!
//! - `clone_git.sh` - check out the repository into the working directory
//! - `setup_ssh_server.sh` - install sshd and configure the login user
//! - `run_ssh_server.sh` - start sshd on the IDE port
//! - `setup_vscode_web.sh` - install code-server
//! - `run_vscode_web.sh` - start code-server on the IDE port

use crate::errors::{Result, TemplateError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Placeholder pattern: `{{ name }}`
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Embedded script templates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptTemplate {
    CloneGit,
    SetupSshServer,
    RunSshServer,
    SetupVsCodeWeb,
    RunVsCodeWeb,
}

impl ScriptTemplate {
    const ALL: [ScriptTemplate; 5] = [
        Self::CloneGit,
        Self::SetupSshServer,
        Self::RunSshServer,
        Self::SetupVsCodeWeb,
        Self::RunVsCodeWeb,
    ];

    /// File name of the template
    pub fn name(&self) -> &'static str {
        match self {
            Self::CloneGit => "clone_git.sh",
            Self::SetupSshServer => "setup_ssh_server.sh",
            Self::RunSshServer => "run_ssh_server.sh",
            Self::SetupVsCodeWeb => "setup_vscode_web.sh",
            Self::RunVsCodeWeb => "run_vscode_web.sh",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::CloneGit => include_str!("../templates/clone_git.sh"),
            Self::SetupSshServer => include_str!("../templates/setup_ssh_server.sh"),
            Self::RunSshServer => include_str!("../templates/run_ssh_server.sh"),
            Self::SetupVsCodeWeb => include_str!("../templates/setup_vscode_web.sh"),
            Self::RunVsCodeWeb => include_str!("../templates/run_vscode_web.sh"),
        }
    }

    /// Look a template up by file name
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| {
                TemplateError::NotFound {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

/// Values substituted into a template
pub trait TemplatePayload {
    fn variables(&self) -> HashMap<&'static str, String>;
}

impl TemplatePayload for () {
    fn variables(&self) -> HashMap<&'static str, String> {
        HashMap::new()
    }
}

/// Payload for `clone_git.sh`
#[derive(Debug, Clone)]
pub struct CloneGitPayload {
    pub repo_url: String,
    pub image: String,
    pub branch: String,
}

impl TemplatePayload for CloneGitPayload {
    fn variables(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("repo_url", self.repo_url.clone()),
            ("image", self.image.clone()),
            ("branch", self.branch.clone()),
        ])
    }
}

/// Payload for `setup_ssh_server.sh`
#[derive(Debug, Clone)]
pub struct SetupSshServerPayload {
    pub username: String,
    pub password: String,
    pub access_key: String,
    pub working_dir: String,
}

impl TemplatePayload for SetupSshServerPayload {
    fn variables(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("username", self.username.clone()),
            ("password", self.password.clone()),
            ("access_key", self.access_key.clone()),
            ("working_dir", self.working_dir.clone()),
        ])
    }
}

/// Payload for the IDE run scripts
#[derive(Debug, Clone)]
pub struct RunIdePayload {
    pub port: String,
    pub working_dir: String,
}

impl TemplatePayload for RunIdePayload {
    fn variables(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("port", self.port.clone()),
            ("working_dir", self.working_dir.clone()),
        ])
    }
}

/// Render a template against a payload
#[instrument(skip(payload))]
pub fn render(template: ScriptTemplate, payload: &dyn TemplatePayload) -> Result<String> {
    let variables = payload.variables();
    let source = template.source();

    if let Some(missing) = PLACEHOLDER
        .captures_iter(source)
        .filter_map(|c| c.get(1))
        .find(|name| !variables.contains_key(name.as_str()))
    {
        return Err(TemplateError::MissingVariable {
            template: template.name().to_string(),
            variable: missing.as_str().to_string(),
        }
        .into());
    }

    let rendered = PLACEHOLDER.replace_all(source, |caps: &regex::Captures<'_>| {
        let value = variables
            .get(&caps[1])
            .map(String::as_str)
            .unwrap_or_default();
        shell_words::quote(value).into_owned()
    });

    debug!("Rendered {} ({} bytes)", template.name(), rendered.len());
    Ok(rendered.into_owned())
}

/// Render a template looked up by file name
pub fn render_named(name: &str, payload: &dyn TemplatePayload) -> Result<String> {
    render(ScriptTemplate::from_name(name)?, payload)
}
