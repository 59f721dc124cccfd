pub mod config;
pub mod deploy;
pub mod list;
pub mod remove;
pub mod serve;
pub mod status;
pub mod stop;
pub mod task;

use anyhow::{Result, bail};
use dialoguer::Confirm;
use runway_core::{DeploymentRecord, DeploymentRegistry};

/// Fetch a record or fail with the standard not-found message
pub(crate) fn require_record(registry: &DeploymentRegistry, id: &str) -> Result<DeploymentRecord> {
    match registry.get(id)? {
        Some(record) => Ok(record),
        None => bail!("Deployment not found: {}", id),
    }
}

/// Ask for confirmation unless `--yes` was given
pub(crate) fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
