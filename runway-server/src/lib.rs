//! runway-server - task-bearing HTTP frontend
//!
//! Accepts task submissions, runs their bodies under a
//! [`runway_core::TaskController`], and exposes signal and status routes so
//! callers in other processes can pause, resume, stop, and poll them.

mod error;
pub mod http;
mod state;
pub mod work;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::{ErrorResponse, ServerError};
pub use http::create_router;
pub use state::AppState;

/// The runway frontend server
pub struct RunwayServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl RunwayServer {
    /// Create a server whose controller is scoped to `config.namespace`
    pub fn new(config: ServerConfig) -> Self {
        let controller_config = runway_core::ControllerConfig {
            namespace: config.namespace.clone(),
            ..runway_core::ControllerConfig::default()
        };
        Self {
            state: Arc::new(AppState::new(controller_config)),
            config,
        }
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Router serving this server's state, for embedding in another listener
    pub fn router(&self) -> axum::Router {
        create_router(self.state())
    }

    /// Run the server until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            trigger.cancel();
        });
        self.serve_with_shutdown(shutdown).await
    }

    /// Run the server until `shutdown` is cancelled, draining open requests
    pub async fn serve_with_shutdown(self, shutdown: CancellationToken) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!("runway server listening on {}", addr);

        let controller = Arc::clone(&self.state.controller);
        let router = create_router(self.state);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))?;

        controller.close().await?;
        tracing::info!("runway server on {} stopped", addr);
        Ok(())
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Scope for task ids, usually the deployment id
    pub namespace: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            namespace: None,
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            namespace: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Returns the socket address string (e.g., "127.0.0.1:8090")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
