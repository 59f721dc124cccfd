use anyhow::Result;
use clap::Args;

use super::{confirm, require_record};
use crate::config::ConfigLoader;

#[derive(Debug, Args)]
pub struct RemoveArgs {
    /// Deployment ID
    pub deploy_id: String,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

pub fn run(args: RemoveArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let registry = ConfigLoader::open_registry(&config)?;
    let record = require_record(&registry, &args.deploy_id)?;

    if record.is_running() {
        println!(
            "Deployment {} is still running; only its record will be removed",
            record.id
        );
    }

    if !confirm(&format!("Remove deployment {}?", record.id), args.yes)? {
        println!("Cancelled");
        return Ok(());
    }

    registry.delete(&record.id)?;
    println!("Deployment {} removed", record.id);
    Ok(())
}
