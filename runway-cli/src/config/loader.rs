use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use runway_core::DeploymentRegistry;

use super::types::{
    DEFAULT_HOST, DEFAULT_PORT, DEFAULT_SHUTDOWN_TIMEOUT_SECS, DEFAULT_STARTUP_TIMEOUT_SECS,
    DEFAULT_STATE_TTL_SECS, DEFAULT_TERMINAL_TTL_SECS, DeploySection, RawDeploySection,
    RawRunwayConfig, RawServerSection, RawTasksSection, RunwayConfig, ServerSection, TasksSection,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<RunwayConfig> {
        Self::load_layers(&[Self::user_config_path(), Self::project_config_path()])
    }

    /// Merge the given files in order, later files overriding earlier ones
    pub fn load_layers(paths: &[PathBuf]) -> Result<RunwayConfig> {
        let mut raw = RawRunwayConfig::default();
        for path in paths {
            if let Some(layer) = Self::read_raw(path)? {
                raw = Self::merge_raw(raw, layer);
            }
        }
        Ok(Self::finalize(raw))
    }

    /// Get user config path (`$XDG_CONFIG_HOME/runway/config.toml`)
    pub fn user_config_path() -> PathBuf {
        runway_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with RUNWAY_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("RUNWAY_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".runway/config.toml")
        }
    }

    /// Open the deployment registry under the configured state directory
    pub fn open_registry(config: &RunwayConfig) -> Result<DeploymentRegistry> {
        DeploymentRegistry::open(&config.deploy.state_dir).with_context(|| {
            format!(
                "Failed to open deployment registry in {}",
                config.deploy.state_dir.display()
            )
        })
    }

    fn read_raw(path: &Path) -> Result<Option<RawRunwayConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(Some(raw))
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawRunwayConfig, overlay: RawRunwayConfig) -> RawRunwayConfig {
        RawRunwayConfig {
            server: RawServerSection {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
            },
            tasks: RawTasksSection {
                state_ttl_secs: overlay.tasks.state_ttl_secs.or(base.tasks.state_ttl_secs),
                terminal_ttl_secs: overlay
                    .tasks
                    .terminal_ttl_secs
                    .or(base.tasks.terminal_ttl_secs),
            },
            deploy: RawDeploySection {
                startup_timeout_secs: overlay
                    .deploy
                    .startup_timeout_secs
                    .or(base.deploy.startup_timeout_secs),
                shutdown_timeout_secs: overlay
                    .deploy
                    .shutdown_timeout_secs
                    .or(base.deploy.shutdown_timeout_secs),
                state_dir: overlay.deploy.state_dir.or(base.deploy.state_dir),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawRunwayConfig) -> RunwayConfig {
        RunwayConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
            },
            tasks: TasksSection {
                state_ttl_secs: raw.tasks.state_ttl_secs.unwrap_or(DEFAULT_STATE_TTL_SECS),
                terminal_ttl_secs: raw
                    .tasks
                    .terminal_ttl_secs
                    .unwrap_or(DEFAULT_TERMINAL_TTL_SECS),
            },
            deploy: DeploySection {
                startup_timeout_secs: raw
                    .deploy
                    .startup_timeout_secs
                    .unwrap_or(DEFAULT_STARTUP_TIMEOUT_SECS),
                shutdown_timeout_secs: raw
                    .deploy
                    .shutdown_timeout_secs
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
                state_dir: raw.deploy.state_dir.unwrap_or_else(runway_paths::state_dir),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    // ==================== Layering Tests ====================

    #[test]
    fn test_missing_files_yield_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_layers(&[
            dir.path().join("user.toml"),
            dir.path().join("project.toml"),
        ])
        .unwrap();

        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.tasks.terminal_ttl_secs, DEFAULT_TERMINAL_TTL_SECS);
    }

    #[test]
    fn test_project_overrides_user_only_where_set() {
        let dir = TempDir::new().unwrap();
        let user = write(
            &dir,
            "user.toml",
            r#"
[server]
host = "0.0.0.0"
port = 9000

[tasks]
state_ttl_secs = 120
"#,
        );
        let project = write(
            &dir,
            "project.toml",
            r#"
[server]
port = 9100

[deploy]
state_dir = "/tmp/runway-project-state"
"#,
        );

        let config = ConfigLoader::load_layers(&[user, project]).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.tasks.state_ttl_secs, 120);
        assert_eq!(config.tasks.terminal_ttl_secs, DEFAULT_TERMINAL_TTL_SECS);
        assert_eq!(
            config.deploy.state_dir,
            PathBuf::from("/tmp/runway-project-state")
        );
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let dir = TempDir::new().unwrap();
        let bad = write(&dir, "bad.toml", "[server\nport = ");
        let err = ConfigLoader::load_layers(&[bad]).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }

    // ==================== Path Tests ====================

    #[test]
    #[serial]
    fn test_project_config_path_respects_env() {
        unsafe {
            std::env::set_var("RUNWAY_PROJECT_CONFIG_DIR", "/tmp/runway-project");
        }
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from("/tmp/runway-project/config.toml")
        );
        unsafe {
            std::env::remove_var("RUNWAY_PROJECT_CONFIG_DIR");
        }
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from(".runway/config.toml")
        );
    }

    #[test]
    #[serial]
    fn test_user_config_path_follows_xdg() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/runway-xdg");
        }
        assert_eq!(
            ConfigLoader::user_config_path(),
            PathBuf::from("/tmp/runway-xdg/runway/config.toml")
        );
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }

    #[test]
    #[serial]
    fn test_load_reads_project_dir_from_env() {
        let dir = TempDir::new().unwrap();
        write(&dir, "config.toml", "[tasks]\nterminal_ttl_secs = 42\n");
        let xdg = TempDir::new().unwrap();
        unsafe {
            std::env::set_var("RUNWAY_PROJECT_CONFIG_DIR", dir.path());
            std::env::set_var("XDG_CONFIG_HOME", xdg.path());
        }

        let config = ConfigLoader::load().unwrap();
        assert_eq!(config.tasks.terminal_ttl_secs, 42);

        unsafe {
            std::env::remove_var("RUNWAY_PROJECT_CONFIG_DIR");
            std::env::remove_var("XDG_CONFIG_HOME");
        }
    }

    #[test]
    fn test_open_registry_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = RunwayConfig::default();
        config.deploy.state_dir = dir.path().join("state");

        let registry = ConfigLoader::open_registry(&config).unwrap();
        assert!(
            registry
                .list_all(&runway_core::ListFilter::default())
                .unwrap()
                .is_empty()
        );
    }
}
