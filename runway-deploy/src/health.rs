//! Health probing over HTTP

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::DeployError;

/// Per-request timeout for a single probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Interval between probes while waiting for readiness
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Client for `GET <base>/health`
#[derive(Debug, Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
}

impl HealthProbe {
    pub fn new() -> Result<Self, DeployError> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// Health endpoint for a service base URL
    pub fn health_url(base_url: &str) -> String {
        format!("{}/health", base_url.trim_end_matches('/'))
    }

    /// One probe: true on any 2xx response
    pub async fn check(&self, base_url: &str) -> bool {
        match self.client.get(Self::health_url(base_url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check of {} failed: {}", base_url, e);
                false
            }
        }
    }

    /// Poll until the service answers healthy or `timeout` elapses
    pub async fn wait_until_healthy(
        &self,
        base_url: &str,
        timeout: Duration,
    ) -> Result<(), DeployError> {
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            if self.check(base_url).await {
                debug!(
                    "{} healthy after {} attempts ({:?})",
                    base_url,
                    attempts,
                    start.elapsed()
                );
                return Ok(());
            }

            if start.elapsed() >= timeout {
                return Err(DeployError::HealthTimeout {
                    url: base_url.to_string(),
                    timeout,
                });
            }

            tokio::time::sleep(HEALTH_CHECK_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_url_strips_trailing_slash() {
        assert_eq!(
            HealthProbe::health_url("http://127.0.0.1:8090/"),
            "http://127.0.0.1:8090/health"
        );
        assert_eq!(
            HealthProbe::health_url("http://h:1"),
            "http://h:1/health"
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_unhealthy() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let probe = HealthProbe::new().unwrap();
        let url = format!("http://127.0.0.1:{port}");

        assert!(!probe.check(&url).await);
        let err = probe
            .wait_until_healthy(&url, Duration::from_millis(250))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::HealthTimeout { .. }));
    }
}
