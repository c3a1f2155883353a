//! Up command implementation
//!
//! Implements the `gitspace up` subcommand: brings a gitspace to running and
//! prints its connection details as JSON on stdout.

use crate::commands::shared::{load_devcontainer, load_gitspace};
use anyhow::{Context, Result};
use gitspace_core::infra::Infrastructure;
use gitspace_core::{Orchestrator, PipelineResult};
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Up command arguments
#[derive(Debug, Clone)]
pub struct UpArgs {
    /// Gitspace record file
    pub gitspace_file: PathBuf,
    /// Devcontainer file, if any
    pub devcontainer_file: Option<PathBuf>,
    /// Working directory name inside the container
    pub repo_name: Option<String>,
    /// Target container host
    pub infra: Infrastructure,
}

/// Execute the up command
#[instrument(skip(orchestrator, args))]
pub async fn execute_up(orchestrator: &Orchestrator, args: UpArgs) -> Result<PipelineResult> {
    debug!("Up args: {:?}", args);

    let gitspace = load_gitspace(&args.gitspace_file)?;
    let devcontainer = load_devcontainer(args.devcontainer_file.as_deref())?;
    let repo_name = resolve_repo_name(args.repo_name.as_deref(), &gitspace.code_repo_url)
        .with_context(|| format!("Invalid gitspace {}", gitspace.identifier))?;

    let result = orchestrator
        .create_and_start_gitspace(&gitspace, &devcontainer, &args.infra, &repo_name)
        .await
        .with_context(|| format!("Failed to bring up gitspace {}", gitspace.identifier))?;

    info!(
        "Gitspace {} is running in container {}",
        gitspace.identifier, result.container_name
    );
    Ok(result)
}

/// Print the up result on stdout, keeping stdout JSON-only
pub fn print_result(result: &PipelineResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}

/// Working directory name: the explicit one, else derived from the URL
///
/// An empty name would put the working directory, and the storage volume
/// mounted there, at the container root.
pub fn resolve_repo_name(explicit: Option<&str>, url: &str) -> Result<String> {
    let name = match explicit {
        Some(name) => name.trim().trim_matches('/').to_string(),
        None => repo_name_from_url(url),
    };
    if name.is_empty() {
        anyhow::bail!(
            "cannot determine a repository name from '{}'; pass --repo-name",
            url
        );
    }
    Ok(name)
}

/// Repository name from its clone URL
///
/// Takes the last path segment and strips a `.git` suffix, so
/// `git@host:org/proj.git` and `https://host/org/proj/` both yield `proj`.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(trimmed);
    last.strip_suffix(".git").unwrap_or(last).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_name_from_https_url() {
        assert_eq!(repo_name_from_url("https://example.com/org/proj.git"), "proj");
        assert_eq!(repo_name_from_url("https://example.com/org/proj/"), "proj");
        assert_eq!(repo_name_from_url("https://example.com/org/proj"), "proj");
    }

    #[test]
    fn test_resolve_repo_name_prefers_explicit() {
        let name = resolve_repo_name(Some("work"), "https://example.com/org/proj.git").unwrap();
        assert_eq!(name, "work");
        let name = resolve_repo_name(None, "https://example.com/org/proj.git").unwrap();
        assert_eq!(name, "proj");
    }

    #[test]
    fn test_resolve_repo_name_rejects_empty() {
        let err = resolve_repo_name(None, "").unwrap_err();
        assert!(err.to_string().contains("pass --repo-name"));
        assert!(resolve_repo_name(Some(""), "https://example.com/org/proj.git").is_err());
        assert!(resolve_repo_name(Some("/"), "https://example.com/org/proj.git").is_err());
    }

    #[test]
    fn test_repo_name_from_scp_url() {
        assert_eq!(repo_name_from_url("git@example.com:proj.git"), "proj");
        assert_eq!(repo_name_from_url("git@example.com:org/my.repo.git"), "my.repo");
    }
}
