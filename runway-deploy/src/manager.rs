//! DeployManager trait definition

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DeployError;

/// Connection details of a deployed service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentInfo {
    pub deploy_id: String,
    pub url: String,
}

/// Lifecycle of one deployment, polymorphic over where it runs
///
/// A manager owns at most one deployment at a time. It is the only
/// component allowed to start or signal what it deployed.
#[async_trait]
pub trait DeployManager: Send + Sync {
    /// Platform name recorded in the registry
    fn platform(&self) -> &'static str;

    /// Start serving and register the deployment as running
    async fn deploy(&mut self) -> Result<DeploymentInfo, DeployError>;

    /// Shut the service down and mark its record stopped
    async fn stop(&mut self) -> Result<(), DeployError>;

    /// Whether the service is alive right now, judged by its health endpoint
    async fn is_running(&self) -> bool;

    /// Probe the health endpoint once
    async fn health_check(&self) -> bool;

    /// Connection info of the current deployment, if any
    fn info(&self) -> Option<&DeploymentInfo>;
}
