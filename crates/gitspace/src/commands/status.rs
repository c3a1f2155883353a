//! Status command implementation

use anyhow::Result;
use gitspace_core::infra::Infrastructure;
use gitspace_core::Orchestrator;
use tracing::instrument;

/// Execute the status command
#[instrument(skip(orchestrator, infra))]
pub async fn execute_status(orchestrator: &Orchestrator, infra: &Infrastructure) -> Result<()> {
    orchestrator.status(infra).await?;
    println!("ok");
    Ok(())
}
