use anyhow::Result;
use clap::{Args, ValueEnum};

use super::list::masked_record;
use super::require_record;
use crate::config::ConfigLoader;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StatusFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Deployment ID
    pub deploy_id: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = StatusFormat::Text)]
    pub format: StatusFormat,
}

pub fn run(args: StatusArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let registry = ConfigLoader::open_registry(&config)?;
    let record = require_record(&registry, &args.deploy_id)?;

    match args.format {
        StatusFormat::Text => println!("{}", record.format_details()),
        StatusFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&masked_record(&record))?)
        }
    }
    Ok(())
}
