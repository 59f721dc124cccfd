//! runway-deploy: start, supervise and stop runway services
//!
//! Three deployment modes share the [`DeployManager`] contract:
//!
//! - [`LocalDeployManager`] serves a router inside the calling process
//! - [`DetachedDeployManager`] launches an independent OS process from a
//!   [`Bundle`] and supervises it by PID and health endpoint
//! - [`RemoteDeployManager`] records an externally hosted endpoint
//!
//! Every manager registers its deployment in a
//! [`runway_core::DeploymentRegistry`] and keeps the record's status current.

pub mod bundle;
pub mod detached;
pub mod error;
pub mod health;
pub mod local;
pub mod manager;
pub mod process;
pub mod remote;

pub use bundle::Bundle;
pub use detached::{DetachedConfig, DetachedDeployManager};
pub use error::DeployError;
pub use health::HealthProbe;
pub use local::{LocalConfig, LocalDeployManager};
pub use manager::{DeployManager, DeploymentInfo};
pub use remote::RemoteDeployManager;
