//! Deployment registry: durable records of every deployment

mod deployments;
mod record;
mod store;

pub use deployments::{DeploymentRegistry, ListFilter};
pub use record::{DeploymentRecord, format_timestamp, generate_deployment_id, platform, status};
pub use store::{JsonFileStore, MemoryStore, RegistrySnapshot, RegistryStore, STATE_FILE, STATE_VERSION};
