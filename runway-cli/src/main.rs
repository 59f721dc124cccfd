use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "runway", about = "Task control and deployment bookkeeping")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Deploy the runway frontend
    Deploy(commands::deploy::DeployArgs),
    /// List registered deployments
    List(commands::list::ListArgs),
    /// Remove a deployment record
    Remove(commands::remove::RemoveArgs),
    /// Run the task frontend in the foreground
    Serve(commands::serve::ServeArgs),
    /// Show one deployment
    Status(commands::status::StatusArgs),
    /// Stop a deployment
    Stop(commands::stop::StopArgs),
    /// Control tasks on a running frontend
    Task(commands::task::TaskArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Deploy(args) => commands::deploy::run(args).await,
        Commands::List(args) => commands::list::run(args),
        Commands::Remove(args) => commands::remove::run(args),
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Status(args) => commands::status::run(args),
        Commands::Stop(args) => commands::stop::run(args).await,
        Commands::Task(args) => commands::task::run(args).await,
    }
}
