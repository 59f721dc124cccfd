use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use runway_core::registry::{platform, status};
use runway_core::{DeploymentRecord, DeploymentRegistry};
use runway_deploy::{DeployError, DeployManager, DetachedDeployManager};
use tracing::{debug, warn};

use super::{confirm, require_record};
use crate::config::ConfigLoader;

#[derive(Debug, Args)]
pub struct StopArgs {
    /// Deployment ID
    pub deploy_id: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

pub async fn run(args: StopArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let registry = ConfigLoader::open_registry(&config)?;
    let record = require_record(&registry, &args.deploy_id)?;

    if record.status == status::STOPPED {
        println!("Deployment {} is already stopped", record.id);
        return Ok(());
    }

    if !confirm(&format!("Stop deployment {}?", record.id), args.yes)? {
        println!("Cancelled");
        return Ok(());
    }

    stop_record(&registry, &record, config.shutdown_timeout()).await?;
    println!("Deployment {} marked as stopped", record.id);
    Ok(())
}

/// Terminate what can be reached from here, then mark the record stopped.
///
/// Detached services are re-attached through their bundle and terminated.
/// Local services belong to the process that serves them and remote ones
/// are not ours to stop, so only their records change.
pub(crate) async fn stop_record(
    registry: &DeploymentRegistry,
    record: &DeploymentRecord,
    shutdown_timeout: Duration,
) -> Result<()> {
    if record.platform == platform::DETACHED
        && let Some(bundle_dir) = record.config_value("bundle_dir").and_then(|v| v.as_str())
    {
        match DetachedDeployManager::resume(Path::new(bundle_dir), registry.clone(), shutdown_timeout)
        {
            Ok(mut manager) => {
                manager.stop().await?;
                return Ok(());
            }
            Err(DeployError::NotRunning) => {
                debug!(deploy_id = %record.id, "Detached service already gone");
            }
            Err(e) => {
                warn!(deploy_id = %record.id, error = %e, "Could not re-attach to detached service");
            }
        }
    }

    registry.update_status(&record.id, status::STOPPED)?;
    Ok(())
}
