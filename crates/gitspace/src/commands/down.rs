//! Down command implementation
//!
//! Implements the `gitspace down` subcommand: stops the gitspace's container if
//! needed and removes it. Running it on an already removed gitspace succeeds.

use crate::commands::shared::load_gitspace;
use anyhow::{Context, Result};
use gitspace_core::infra::Infrastructure;
use gitspace_core::Orchestrator;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

/// Down command arguments
#[derive(Debug, Clone)]
pub struct DownArgs {
    /// Gitspace record file
    pub gitspace_file: PathBuf,
    /// Target container host
    pub infra: Infrastructure,
}

/// Execute the down command
#[instrument(skip(orchestrator, args))]
pub async fn execute_down(orchestrator: &Orchestrator, args: DownArgs) -> Result<()> {
    debug!("Down args: {:?}", args);

    let gitspace = load_gitspace(&args.gitspace_file)?;
    orchestrator
        .stop_and_remove_gitspace(&gitspace, &args.infra)
        .await
        .with_context(|| format!("Failed to remove gitspace {}", gitspace.identifier))?;

    info!("Gitspace {} removed", gitspace.identifier);
    Ok(())
}
