//! Deployment records and identifier helpers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Well-known deployment status values
pub mod status {
    pub const RUNNING: &str = "running";
    pub const STOPPED: &str = "stopped";
    pub const FAILED: &str = "failed";
}

/// Well-known deployment platforms
pub mod platform {
    pub const LOCAL: &str = "local";
    pub const DETACHED: &str = "detached";
    pub const REMOTE: &str = "remote";
}

/// Number of token characters shown before the ellipsis
const TOKEN_PREFIX_LEN: usize = 20;

/// One registered deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: String,
    pub platform: String,
    pub status: String,
    pub url: String,
    /// Fixed-width UTC ISO-8601, so lexical order is chronological
    pub created_at: String,
    pub agent_source: String,
    /// Opaque credential; display through [`DeploymentRecord::display_token`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Platform-specific settings such as host, port, pid or bundle dir
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

impl DeploymentRecord {
    /// New running record with a generated id and the current timestamp
    pub fn new(
        platform: impl Into<String>,
        url: impl Into<String>,
        agent_source: impl Into<String>,
    ) -> Self {
        let platform = platform.into();
        Self {
            id: generate_deployment_id(&platform),
            platform,
            status: status::RUNNING.to_string(),
            url: url.into(),
            created_at: format_timestamp(Utc::now()),
            agent_source: agent_source.into(),
            token: None,
            config: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    pub fn is_running(&self) -> bool {
        self.status == status::RUNNING
    }

    /// Look up a single key in the platform config
    pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.as_ref()?.get(key)
    }

    /// Token safe for display: at most 20 characters, then `...`
    pub fn display_token(&self) -> Option<String> {
        self.token.as_deref().map(|token| {
            if token.chars().count() > TOKEN_PREFIX_LEN {
                let prefix: String = token.chars().take(TOKEN_PREFIX_LEN).collect();
                format!("{prefix}...")
            } else {
                token.to_string()
            }
        })
    }

    /// Multi-line text view used by `runway status`
    pub fn format_details(&self) -> String {
        let mut lines = vec![
            format!("Deployment ID: {}", self.id),
            format!("Platform: {}", self.platform),
            format!("Status: {}", self.status),
            format!("URL: {}", self.url),
            format!("Created: {}", self.created_at),
            format!("Agent Source: {}", self.agent_source),
        ];
        if let Some(token) = self.display_token().filter(|t| !t.is_empty()) {
            lines.push(format!("Token: {token}"));
        }
        lines.join("\n")
    }
}

/// `<platform>_<YYYYMMDD>_<HHMMSS>_<6 hex>`
pub fn generate_deployment_id(platform: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        platform,
        Utc::now().format("%Y%m%d_%H%M%S"),
        &suffix[..6]
    )
}

/// Fixed-width UTC timestamp with microsecond precision
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}
