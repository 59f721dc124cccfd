use anyhow::Result;
use clap::{Args, ValueEnum};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use runway_core::{DeploymentRecord, ListFilter};

use crate::config::ConfigLoader;

const ID_WIDTH: usize = 30;
const URL_WIDTH: usize = 40;
const CREATED_WIDTH: usize = 19;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Only show deployments with this status
    #[arg(short, long)]
    pub status: Option<String>,

    /// Only show deployments on this platform
    #[arg(short, long)]
    pub platform: Option<String>,

    /// Show every stored record, including ones superseded at the same URL
    #[arg(short, long)]
    pub all: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = ListFormat::Table)]
    pub format: ListFormat,
}

pub fn run(args: ListArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let registry = ConfigLoader::open_registry(&config)?;

    let filter = ListFilter {
        status: args.status,
        platform: args.platform,
    };
    let records = if args.all {
        registry.list_all(&filter)?
    } else {
        registry.list(&filter)?
    };

    match args.format {
        ListFormat::Json => {
            let masked: Vec<DeploymentRecord> = records.iter().map(masked_record).collect();
            println!("{}", serde_json::to_string_pretty(&masked)?);
        }
        ListFormat::Table if records.is_empty() => println!("No deployments found"),
        ListFormat::Table => {
            println!("{}", render_table(&records));
            println!("\nTotal: {} deployment(s)", records.len());
        }
    }
    Ok(())
}

/// Copy of `record` with its token shortened for display
pub(crate) fn masked_record(record: &DeploymentRecord) -> DeploymentRecord {
    DeploymentRecord {
        token: record.display_token(),
        ..record.clone()
    }
}

fn render_table(records: &[DeploymentRecord]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["ID", "Platform", "Status", "Created", "URL"]
                .into_iter()
                .map(|h| Cell::new(h).fg(Color::Cyan)),
        );

    for record in records {
        table.add_row(vec![
            Cell::new(truncate(&record.id, ID_WIDTH)),
            Cell::new(&record.platform),
            Cell::new(&record.status).fg(status_color(&record.status)),
            Cell::new(record.created_at.chars().take(CREATED_WIDTH).collect::<String>()),
            Cell::new(truncate(&record.url, URL_WIDTH)),
        ]);
    }
    table
}

fn status_color(status: &str) -> Color {
    match status {
        runway_core::registry::status::RUNNING => Color::Green,
        runway_core::registry::status::FAILED => Color::Red,
        _ => Color::Reset,
    }
}

/// Shorten `value` to `max` characters, ending in `...` when cut
fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let kept: String = value.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
