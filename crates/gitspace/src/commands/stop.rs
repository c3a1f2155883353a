//! Stop command implementation
//!
//! Implements the `gitspace stop` subcommand. The container is kept so a later
//! `up` resumes it.

use crate::commands::shared::load_gitspace;
use anyhow::{Context, Result};
use gitspace_core::infra::Infrastructure;
use gitspace_core::Orchestrator;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Stop command arguments
#[derive(Debug, Clone)]
pub struct StopArgs {
    /// Gitspace record file
    pub gitspace_file: PathBuf,
    /// Target container host
    pub infra: Infrastructure,
}

/// Execute the stop command
#[instrument(skip(orchestrator, args))]
pub async fn execute_stop(orchestrator: &Orchestrator, args: StopArgs) -> Result<()> {
    debug!("Stop args: {:?}", args);

    let gitspace = load_gitspace(&args.gitspace_file)?;
    orchestrator
        .stop_gitspace(&gitspace, &args.infra)
        .await
        .with_context(|| format!("Failed to stop gitspace {}", gitspace.identifier))?;

    info!("Gitspace {} stopped", gitspace.identifier);
    Ok(())
}
