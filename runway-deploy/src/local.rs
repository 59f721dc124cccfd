//! In-process deployment: serve a router on a task of this process

use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use runway_core::registry::{platform, status};
use runway_core::{DeploymentRecord, DeploymentRegistry};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::DeployError;
use crate::health::HealthProbe;
use crate::manager::{DeployManager, DeploymentInfo};

/// Settings for an in-process deployment
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub host: String,
    /// 0 picks an ephemeral port
    pub port: u16,
    pub agent_source: String,
    pub startup_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            agent_source: "runway".to_string(),
            startup_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

struct Serving {
    info: DeploymentInfo,
    cancel: CancellationToken,
    handle: JoinHandle<std::io::Result<()>>,
}

/// Runs a service inside the caller's runtime; `stop` cancels the serving task
pub struct LocalDeployManager {
    config: LocalConfig,
    router: Router,
    registry: DeploymentRegistry,
    probe: HealthProbe,
    serving: Option<Serving>,
}

impl LocalDeployManager {
    /// `router` must answer `GET /health`
    pub fn new(
        config: LocalConfig,
        router: Router,
        registry: DeploymentRegistry,
    ) -> Result<Self, DeployError> {
        Ok(Self {
            config,
            router,
            registry,
            probe: HealthProbe::new()?,
            serving: None,
        })
    }

    /// Token cancelled when the service shuts down
    pub fn shutdown_token(&self) -> Option<CancellationToken> {
        self.serving.as_ref().map(|s| s.cancel.clone())
    }

    async fn shutdown(&self, serving: Serving) {
        serving.cancel.cancel();
        let mut handle = serving.handle;
        match tokio::time::timeout(self.config.shutdown_timeout, &mut handle).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!("Local server exited with error: {}", e),
            Ok(Err(e)) => warn!("Local server task failed: {}", e),
            Err(_) => {
                warn!(
                    "Local server did not drain within {:?}, aborting",
                    self.config.shutdown_timeout
                );
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl DeployManager for LocalDeployManager {
    fn platform(&self) -> &'static str {
        platform::LOCAL
    }

    async fn deploy(&mut self) -> Result<DeploymentInfo, DeployError> {
        if let Some(serving) = &self.serving {
            return Err(DeployError::AlreadyRunning(serving.info.deploy_id.clone()));
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| DeployError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let port = listener.local_addr()?.port();
        let url = format!("http://{}:{}", self.config.host, port);

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        let router = self.router.clone();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        });

        let record = DeploymentRecord::new(platform::LOCAL, &url, &self.config.agent_source)
            .with_config(serde_json::json!({
                "host": self.config.host,
                "port": port,
            }));
        let info = DeploymentInfo {
            deploy_id: record.id.clone(),
            url: url.clone(),
        };
        let serving = Serving {
            info: info.clone(),
            cancel,
            handle,
        };

        if let Err(e) = self.registry.put(&record) {
            self.shutdown(serving).await;
            return Err(e.into());
        }

        if let Err(e) = self
            .probe
            .wait_until_healthy(&url, self.config.startup_timeout)
            .await
        {
            self.shutdown(serving).await;
            self.registry.update_status(&info.deploy_id, status::FAILED)?;
            return Err(e);
        }

        info!(deploy_id = %info.deploy_id, "Serving in-process at {}", url);
        self.serving = Some(serving);
        Ok(info)
    }

    async fn stop(&mut self) -> Result<(), DeployError> {
        let serving = self.serving.take().ok_or(DeployError::NotRunning)?;
        let deploy_id = serving.info.deploy_id.clone();

        self.shutdown(serving).await;
        self.registry.update_status(&deploy_id, status::STOPPED)?;
        info!(deploy_id = %deploy_id, "In-process deployment stopped");
        Ok(())
    }

    async fn is_running(&self) -> bool {
        match &self.serving {
            Some(serving) if !serving.handle.is_finished() => {
                self.probe.check(&serving.info.url).await
            }
            _ => false,
        }
    }

    async fn health_check(&self) -> bool {
        match &self.serving {
            Some(serving) => self.probe.check(&serving.info.url).await,
            None => false,
        }
    }

    fn info(&self) -> Option<&DeploymentInfo> {
        self.serving.as_ref().map(|s| &s.info)
    }
}
