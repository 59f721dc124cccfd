//! `runway serve`: the task frontend in the foreground
//!
//! This is also what a detached bundle launches, with the deployment id as
//! the task namespace.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use runway_server::{AppState, RunwayServer, ServerConfig};
use tracing::info;

use crate::config::{ConfigLoader, RunwayConfig};

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Host to bind to [default: server.host from config]
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on [default: server.port from config]
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Prefix scoping task ids, usually a deployment id
    #[arg(long)]
    pub namespace: Option<String>,
}

/// Run the serve command
pub async fn run(args: ServeArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let server = build_server(&args, &config);

    info!(
        namespace = ?args.namespace,
        "Starting runway frontend on {}",
        server.config().addr()
    );
    server.run().await?;
    info!("Runway frontend stopped");
    Ok(())
}

fn build_server(args: &ServeArgs, config: &RunwayConfig) -> RunwayServer {
    let host = args
        .host
        .clone()
        .unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    let mut server_config = ServerConfig::new(host, port);
    if let Some(namespace) = &args.namespace {
        server_config = server_config.with_namespace(namespace.clone());
    }

    let state = AppState::new(config.controller_config(args.namespace.clone()));
    RunwayServer::with_state(server_config, Arc::new(state))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    // ==================== Argument Tests ====================

    #[test]
    fn parse_without_flags_defers_to_config() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();
        assert!(cli.serve.host.is_none());
        assert!(cli.serve.port.is_none());
        assert!(cli.serve.namespace.is_none());
    }

    #[test]
    fn parse_bundle_launch_arguments() {
        let cli = TestCli::try_parse_from([
            "test",
            "--host",
            "0.0.0.0",
            "--port",
            "9001",
            "--namespace",
            "detached_20250101_120000_abc123",
        ])
        .unwrap();
        assert_eq!(cli.serve.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.serve.port, Some(9001));
        assert_eq!(
            cli.serve.namespace.as_deref(),
            Some("detached_20250101_120000_abc123")
        );
    }

    // ==================== Server Construction Tests ====================

    #[test]
    fn build_server_prefers_flags_over_config() {
        let mut config = RunwayConfig::default();
        config.server.port = 9100;
        config.tasks.terminal_ttl_secs = 5;

        let args = ServeArgs {
            host: None,
            port: Some(9200),
            namespace: Some("deploy-1".to_string()),
        };
        let server = build_server(&args, &config);

        assert_eq!(server.config().addr(), "127.0.0.1:9200");
        let state = server.state();
        assert_eq!(state.namespace(), Some("deploy-1"));
        assert_eq!(
            state.controller.config().terminal_ttl,
            Duration::from_secs(5)
        );
    }
}
