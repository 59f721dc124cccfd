//! Remote deployment: register a service hosted elsewhere

use async_trait::async_trait;
use runway_core::registry::{platform, status};
use runway_core::{DeploymentRecord, DeploymentRegistry};
use tracing::{info, warn};

use crate::error::DeployError;
use crate::health::HealthProbe;
use crate::manager::{DeployManager, DeploymentInfo};

/// Tracks an externally hosted endpoint.
///
/// Nothing is started or killed locally; liveness comes from the endpoint's
/// health route and `stop` only updates the registry.
pub struct RemoteDeployManager {
    url: String,
    token: Option<String>,
    agent_source: String,
    registry: DeploymentRegistry,
    probe: HealthProbe,
    info: Option<DeploymentInfo>,
}

impl RemoteDeployManager {
    pub fn new(url: impl Into<String>, registry: DeploymentRegistry) -> Result<Self, DeployError> {
        let url = url.into();
        Ok(Self {
            agent_source: url.clone(),
            url: url.trim_end_matches('/').to_string(),
            token: None,
            registry,
            probe: HealthProbe::new()?,
            info: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_agent_source(mut self, agent_source: impl Into<String>) -> Self {
        self.agent_source = agent_source.into();
        self
    }
}

#[async_trait]
impl DeployManager for RemoteDeployManager {
    fn platform(&self) -> &'static str {
        platform::REMOTE
    }

    async fn deploy(&mut self) -> Result<DeploymentInfo, DeployError> {
        if let Some(info) = &self.info {
            return Err(DeployError::AlreadyRunning(info.deploy_id.clone()));
        }

        if !self.probe.check(&self.url).await {
            warn!("Remote endpoint {} is not healthy yet, registering anyway", self.url);
        }

        let mut record = DeploymentRecord::new(platform::REMOTE, &self.url, &self.agent_source);
        record.token = self.token.clone();
        self.registry.put(&record)?;

        let info = DeploymentInfo {
            deploy_id: record.id,
            url: record.url,
        };
        info!(deploy_id = %info.deploy_id, "Registered remote endpoint {}", info.url);
        self.info = Some(info.clone());
        Ok(info)
    }

    async fn stop(&mut self) -> Result<(), DeployError> {
        let info = self.info.take().ok_or(DeployError::NotRunning)?;
        self.registry.update_status(&info.deploy_id, status::STOPPED)?;
        info!(deploy_id = %info.deploy_id, "Remote deployment marked stopped");
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.info.is_some() && self.probe.check(&self.url).await
    }

    async fn health_check(&self) -> bool {
        self.probe.check(&self.url).await
    }

    fn info(&self) -> Option<&DeploymentInfo> {
        self.info.as_ref()
    }
}
