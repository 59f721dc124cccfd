use std::path::PathBuf;
use std::time::Duration;

use runway_core::ControllerConfig;
use serde::{Deserialize, Serialize};

/// Default host for the runway frontend
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port for the runway frontend
pub const DEFAULT_PORT: u16 = 8090;

pub const DEFAULT_STATE_TTL_SECS: u64 = 3600;
pub const DEFAULT_TERMINAL_TTL_SECS: u64 = 600;
pub const DEFAULT_STARTUP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRunwayConfig {
    #[serde(default)]
    pub server: RawServerSection,

    #[serde(default)]
    pub tasks: RawTasksSection,

    #[serde(default)]
    pub deploy: RawDeploySection,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawTasksSection {
    pub state_ttl_secs: Option<u64>,
    pub terminal_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawDeploySection {
    pub startup_timeout_secs: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
    pub state_dir: Option<PathBuf>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunwayConfig {
    pub server: ServerSection,
    pub tasks: TasksSection,
    pub deploy: DeploySection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksSection {
    /// TTL of non-terminal task state
    pub state_ttl_secs: u64,
    /// TTL of FINISHED, STOPPED and ERROR state
    pub terminal_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySection {
    pub startup_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
    /// Directory holding `deployments.json` and detached bundles
    pub state_dir: PathBuf,
}

impl Default for RunwayConfig {
    fn default() -> Self {
        Self {
            server: ServerSection {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
            tasks: TasksSection {
                state_ttl_secs: DEFAULT_STATE_TTL_SECS,
                terminal_ttl_secs: DEFAULT_TERMINAL_TTL_SECS,
            },
            deploy: DeploySection {
                startup_timeout_secs: DEFAULT_STARTUP_TIMEOUT_SECS,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                state_dir: runway_paths::state_dir(),
            },
        }
    }
}

impl RunwayConfig {
    /// Controller settings for a frontend serving `namespace`
    pub fn controller_config(&self, namespace: Option<String>) -> ControllerConfig {
        ControllerConfig {
            namespace,
            state_ttl: Duration::from_secs(self.tasks.state_ttl_secs),
            terminal_ttl: Duration::from_secs(self.tasks.terminal_ttl_secs),
        }
    }

    pub fn bundles_dir(&self) -> PathBuf {
        self.deploy.state_dir.join("bundles")
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy.startup_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy.shutdown_timeout_secs)
    }
}
