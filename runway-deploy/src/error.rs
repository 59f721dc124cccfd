//! Error types for runway-deploy

use std::time::Duration;

use runway_core::RegistryError;
use thiserror::Error;

/// Errors raised while deploying, supervising or stopping a service
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("Deployment already running: {0}")]
    AlreadyRunning(String),

    #[error("No deployment is running")]
    NotRunning,

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The supervised process failed to start or died; `output` holds the
    /// tail of its combined stdout/stderr
    #[error("Process supervision failed: {message}")]
    ProcessSupervision { message: String, output: String },

    #[error("Service at {url} did not become healthy within {timeout:?}")]
    HealthTimeout { url: String, timeout: Duration },

    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_pass_through_unchanged() {
        let error: DeployError = RegistryError::DeploymentNotFound("d1".to_string()).into();
        assert_eq!(error.to_string(), "Deployment not found: d1");
    }

    #[test]
    fn supervision_error_keeps_output_out_of_message() {
        let error = DeployError::ProcessSupervision {
            message: "exited with status 3".to_string(),
            output: "traceback...".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Process supervision failed: exited with status 3"
        );
    }
}
