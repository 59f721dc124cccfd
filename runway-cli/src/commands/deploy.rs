//! `runway deploy`: start the frontend and register it

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use runway_deploy::{
    DeployManager, DeploymentInfo, DetachedConfig, DetachedDeployManager, LocalConfig,
    LocalDeployManager, RemoteDeployManager,
};
use runway_server::{AppState, RunwayServer, ServerConfig};
use tracing::{info, warn};

use crate::config::{ConfigLoader, RunwayConfig};

/// Default agent source recorded for deployments of the bundled frontend
const DEFAULT_AGENT_SOURCE: &str = "runway serve";

#[derive(Debug, Args)]
pub struct DeployArgs {
    #[command(subcommand)]
    pub command: DeployCommand,
}

#[derive(Debug, Subcommand)]
pub enum DeployCommand {
    /// Serve in this process until Ctrl+C
    Local(LocalArgs),
    /// Launch a background process that outlives this command
    Detached(DetachedArgs),
    /// Register an externally hosted endpoint
    Remote(RemoteArgs),
}

#[derive(Debug, Args)]
pub struct LocalArgs {
    /// Host to bind to [default: server.host from config]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on, 0 for any free port [default: server.port from config]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Agent source recorded in the registry
    #[arg(long, default_value = DEFAULT_AGENT_SOURCE)]
    pub agent_source: String,
}

#[derive(Debug, Args)]
pub struct DetachedArgs {
    /// Host to bind to [default: server.host from config]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on, 0 for any free port [default: server.port from config]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Agent source recorded in the registry
    #[arg(long, default_value = DEFAULT_AGENT_SOURCE)]
    pub agent_source: String,
}

#[derive(Debug, Args)]
pub struct RemoteArgs {
    /// Base URL of the hosted endpoint
    pub url: String,

    /// Access token stored with the record
    #[arg(long)]
    pub token: Option<String>,

    /// Agent source recorded in the registry
    #[arg(long, default_value = "remote")]
    pub agent_source: String,
}

pub async fn run(args: DeployArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    match args.command {
        DeployCommand::Local(args) => deploy_local(args, &config).await,
        DeployCommand::Detached(args) => deploy_detached(args, &config).await,
        DeployCommand::Remote(args) => deploy_remote(args, &config).await,
    }
}

async fn deploy_local(args: LocalArgs, config: &RunwayConfig) -> Result<()> {
    let registry = ConfigLoader::open_registry(config)?;
    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    let state = Arc::new(AppState::new(config.controller_config(None)));
    let server = RunwayServer::with_state(ServerConfig::new(host.clone(), port), state.clone());

    let local = LocalConfig {
        host,
        port,
        agent_source: args.agent_source,
        startup_timeout: config.startup_timeout(),
        shutdown_timeout: config.shutdown_timeout(),
    };
    let mut manager = LocalDeployManager::new(local, server.router(), registry)?;
    let info = manager.deploy().await?;
    print_deployed(&info);
    println!("Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!(deploy_id = %info.deploy_id, "Stopping local deployment");

    manager.stop().await?;
    if let Err(e) = state.controller.close().await {
        warn!("Failed to close task controller: {}", e);
    }
    println!("Deployment {} stopped", info.deploy_id);
    Ok(())
}

/// Launch arguments handed to `runway serve` inside a detached bundle
pub(crate) fn serve_args_template() -> Vec<String> {
    [
        "serve",
        "--host",
        "{host}",
        "--port",
        "{port}",
        "--namespace",
        "{deploy_id}",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub(crate) fn detached_config(
    args: &DetachedArgs,
    config: &RunwayConfig,
    program: std::path::PathBuf,
) -> DetachedConfig {
    let mut detached = DetachedConfig::new(program, serve_args_template());
    detached.host = args
        .host
        .clone()
        .unwrap_or_else(|| config.server.host.clone());
    detached.port = args.port.unwrap_or(config.server.port);
    detached.agent_source = args.agent_source.clone();
    detached.bundles_dir = config.bundles_dir();
    detached.startup_timeout = config.startup_timeout();
    detached.shutdown_timeout = config.shutdown_timeout();
    detached
}

async fn deploy_detached(args: DetachedArgs, config: &RunwayConfig) -> Result<()> {
    let registry = ConfigLoader::open_registry(config)?;
    let program = std::env::current_exe().context("Failed to locate the runway executable")?;

    let mut manager = DetachedDeployManager::new(detached_config(&args, config, program), registry)?;
    let info = manager.deploy().await?;
    print_deployed(&info);
    if let Some(pid) = manager.pid() {
        println!("PID:           {}", pid);
    }
    if let Some(dir) = manager.bundle_dir() {
        println!("Bundle:        {}", dir.display());
    }
    println!("Stop with: runway stop {}", info.deploy_id);
    Ok(())
}

async fn deploy_remote(args: RemoteArgs, config: &RunwayConfig) -> Result<()> {
    let registry = ConfigLoader::open_registry(config)?;
    let mut manager =
        RemoteDeployManager::new(args.url, registry)?.with_agent_source(args.agent_source);
    if let Some(token) = args.token {
        manager = manager.with_token(token);
    }

    let info = manager.deploy().await?;
    print_deployed(&info);
    Ok(())
}

fn print_deployed(info: &DeploymentInfo) {
    println!("Deployment ID: {}", info.deploy_id);
    println!("URL:           {}", info.url);
}
