//! Detached-process deployment
//!
//! The service runs as the leader of its own session and process group so it
//! outlives the launcher. Supervision goes through the bundle directory:
//! the PID file identifies the group, the health endpoint decides liveness.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use runway_core::registry::{platform, status};
use runway_core::{DeploymentRecord, DeploymentRegistry};
use tracing::{debug, info, warn};

use crate::bundle::{self, Bundle};
use crate::error::DeployError;
use crate::health::{HEALTH_CHECK_INTERVAL, HealthProbe};
use crate::manager::{DeployManager, DeploymentInfo};
use crate::process::{self, Termination};

/// Bytes of service output attached to supervision errors
const LOG_TAIL_BYTES: u64 = 4096;

/// Settings for a detached deployment
#[derive(Debug, Clone)]
pub struct DetachedConfig {
    pub host: String,
    /// 0 picks a free port before launch
    pub port: u16,
    pub program: PathBuf,
    /// Launch arguments; `{host}`, `{port}` and `{deploy_id}` are expanded
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    /// Parent directory of per-deployment bundle directories
    pub bundles_dir: PathBuf,
    pub agent_source: String,
    pub startup_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl DetachedConfig {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let program = program.into();
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
            agent_source: program.display().to_string(),
            program,
            args,
            env: BTreeMap::new(),
            bundles_dir: runway_paths::bundles_dir(),
            startup_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

struct Supervised {
    info: DeploymentInfo,
    bundle_dir: PathBuf,
    pid: u32,
    /// Present when this manager spawned the process and must reap it
    child: Option<Child>,
}

impl Supervised {
    fn is_alive(&mut self) -> bool {
        match &mut self.child {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => process::is_process_alive(self.pid),
        }
    }
}

/// Launches and supervises a service in an independent OS process
pub struct DetachedDeployManager {
    config: DetachedConfig,
    registry: DeploymentRegistry,
    probe: HealthProbe,
    supervised: Option<Supervised>,
}

impl DetachedDeployManager {
    pub fn new(config: DetachedConfig, registry: DeploymentRegistry) -> Result<Self, DeployError> {
        Ok(Self {
            config,
            registry,
            probe: HealthProbe::new()?,
            supervised: None,
        })
    }

    /// Re-attach to a service launched earlier, possibly by another process
    pub fn resume(
        bundle_dir: &Path,
        registry: DeploymentRegistry,
        shutdown_timeout: Duration,
    ) -> Result<Self, DeployError> {
        let bundle = Bundle::load(bundle_dir)?;
        let pid = process::read_pid_file(&bundle::pid_file(bundle_dir))
            .filter(|pid| process::is_process_alive(*pid))
            .ok_or(DeployError::NotRunning)?;

        let mut config = DetachedConfig::new(bundle.program.clone(), bundle.args.clone());
        config.host = bundle.host.clone();
        config.port = bundle.port;
        config.env = bundle.env.clone();
        config.agent_source = bundle.agent_source.clone();
        config.shutdown_timeout = shutdown_timeout;
        if let Some(parent) = bundle_dir.parent() {
            config.bundles_dir = parent.to_path_buf();
        }

        debug!(deploy_id = %bundle.deploy_id, pid, "Resumed supervision");
        Ok(Self {
            config,
            registry,
            probe: HealthProbe::new()?,
            supervised: Some(Supervised {
                info: DeploymentInfo {
                    deploy_id: bundle.deploy_id.clone(),
                    url: bundle.url(),
                },
                bundle_dir: bundle_dir.to_path_buf(),
                pid,
                child: None,
            }),
        })
    }

    /// PID of the supervised process group leader
    pub fn pid(&self) -> Option<u32> {
        self.supervised.as_ref().map(|s| s.pid)
    }

    /// Bundle directory of the current deployment
    pub fn bundle_dir(&self) -> Option<&Path> {
        self.supervised.as_ref().map(|s| s.bundle_dir.as_path())
    }

    fn resolve_port(&self) -> Result<u16, DeployError> {
        if self.config.port != 0 {
            return Ok(self.config.port);
        }
        let addr = format!("{}:0", self.config.host);
        let listener =
            std::net::TcpListener::bind(&addr).map_err(|source| DeployError::Bind { addr, source })?;
        Ok(listener.local_addr()?.port())
    }

    async fn wait_ready(&self, supervised: &mut Supervised) -> Result<(), DeployError> {
        let start = Instant::now();
        loop {
            if let Some(child) = &mut supervised.child
                && let Some(exit) = child.try_wait()?
            {
                return Err(self.supervision_error(
                    supervised,
                    format!("service exited during startup with {}", exit),
                ));
            }

            if self.probe.check(&supervised.info.url).await {
                debug!(
                    deploy_id = %supervised.info.deploy_id,
                    "Detached service ready after {:?}",
                    start.elapsed()
                );
                return Ok(());
            }

            if start.elapsed() >= self.config.startup_timeout {
                return Err(self.supervision_error(
                    supervised,
                    format!(
                        "service did not become healthy within {:?}",
                        self.config.startup_timeout
                    ),
                ));
            }

            tokio::time::sleep(HEALTH_CHECK_INTERVAL).await;
        }
    }

    fn supervision_error(&self, supervised: &Supervised, message: String) -> DeployError {
        DeployError::ProcessSupervision {
            message,
            output: bundle::read_log_tail(&bundle::log_file(&supervised.bundle_dir), LOG_TAIL_BYTES),
        }
    }

    /// Take over a freshly spawned child by recording its PID file.
    ///
    /// If the PID file cannot be written the child is terminated, since
    /// nothing could find it again.
    async fn adopt(
        &self,
        child: Child,
        info: DeploymentInfo,
        bundle_dir: PathBuf,
    ) -> Result<Supervised, DeployError> {
        let pid = child.id();
        let mut supervised = Supervised {
            info,
            bundle_dir,
            pid,
            child: Some(child),
        };

        if let Err(e) = process::write_pid_file(&bundle::pid_file(&supervised.bundle_dir), pid) {
            warn!(pid, error = %e, "Cannot record PID, terminating detached service");
            if let Err(term) = self.terminate(&mut supervised).await {
                warn!(pid, error = %term, "Cleanup after failed PID write failed");
            }
            return Err(e.into());
        }
        Ok(supervised)
    }

    /// Terminate the group and clean up its PID file
    async fn terminate(&self, supervised: &mut Supervised) -> Result<Termination, DeployError> {
        let pid = supervised.pid;
        let termination =
            process::terminate_group(pid, self.config.shutdown_timeout, || supervised.is_alive())
                .await?;
        process::remove_pid_file(&bundle::pid_file(&supervised.bundle_dir))?;
        Ok(termination)
    }
}

/// Spawn the bundle's program as a session leader with output sent to the log
#[cfg(unix)]
fn spawn_detached(bundle: &Bundle, bundle_dir: &Path) -> Result<Child, DeployError> {
    use std::os::unix::process::CommandExt;

    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(bundle::log_file(bundle_dir))?;

    let mut cmd = Command::new(&bundle.program);
    cmd.args(&bundle.args)
        .envs(&bundle.env)
        .current_dir(bundle_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log.try_clone()?))
        .stderr(Stdio::from(log));

    // SAFETY: pre_exec is called after fork, before exec. setsid creates
    // a new session, making this process the session and group leader.
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    cmd.spawn().map_err(|e| DeployError::ProcessSupervision {
        message: format!("failed to spawn {}: {}", bundle.program.display(), e),
        output: String::new(),
    })
}

#[cfg(not(unix))]
fn spawn_detached(bundle: &Bundle, _bundle_dir: &Path) -> Result<Child, DeployError> {
    Err(DeployError::ProcessSupervision {
        message: format!(
            "detached deployment of {} requires a Unix host",
            bundle.program.display()
        ),
        output: String::new(),
    })
}

#[async_trait]
impl DeployManager for DetachedDeployManager {
    fn platform(&self) -> &'static str {
        platform::DETACHED
    }

    async fn deploy(&mut self) -> Result<DeploymentInfo, DeployError> {
        if let Some(supervised) = &self.supervised {
            return Err(DeployError::AlreadyRunning(supervised.info.deploy_id.clone()));
        }

        let port = self.resolve_port()?;
        let url = format!("http://{}:{}", self.config.host, port);
        let mut record = DeploymentRecord::new(platform::DETACHED, &url, &self.config.agent_source);
        let bundle_dir = self.config.bundles_dir.join(&record.id);

        let bundle = Bundle {
            deploy_id: record.id.clone(),
            program: self.config.program.clone(),
            args: bundle::expand_args(&self.config.args, &self.config.host, port, &record.id),
            env: self.config.env.clone(),
            host: self.config.host.clone(),
            port,
            agent_source: self.config.agent_source.clone(),
        };
        bundle.write(&bundle_dir)?;

        let child = spawn_detached(&bundle, &bundle_dir)?;
        let info = DeploymentInfo {
            deploy_id: record.id.clone(),
            url,
        };
        let mut supervised = self.adopt(child, info, bundle_dir).await?;
        let pid = supervised.pid;
        info!(deploy_id = %record.id, pid, "Launched detached service");

        record.config = Some(serde_json::json!({
            "host": self.config.host,
            "port": port,
            "pid": pid,
            "bundle_dir": supervised.bundle_dir.display().to_string(),
        }));

        if let Err(e) = self.registry.put(&record) {
            if let Err(term) = self.terminate(&mut supervised).await {
                warn!(deploy_id = %record.id, error = %term, "Cleanup after failed registration failed");
            }
            return Err(e.into());
        }

        if let Err(e) = self.wait_ready(&mut supervised).await {
            warn!(deploy_id = %record.id, error = %e, "Detached service failed to start");
            if let Err(term) = self.terminate(&mut supervised).await {
                warn!(deploy_id = %record.id, error = %term, "Cleanup after failed start failed");
            }
            self.registry.update_status(&record.id, status::FAILED)?;
            return Err(e);
        }

        let info = supervised.info.clone();
        self.supervised = Some(supervised);
        Ok(info)
    }

    async fn stop(&mut self) -> Result<(), DeployError> {
        let mut supervised = self.supervised.take().ok_or(DeployError::NotRunning)?;
        let deploy_id = supervised.info.deploy_id.clone();

        // No health gate: an unresponsive service is terminated all the same
        let termination = match self.terminate(&mut supervised).await {
            Ok(termination) => termination,
            Err(e) => {
                warn!(deploy_id = %deploy_id, error = %e, "Failed to stop detached service");
                self.supervised = Some(supervised);
                return Err(e);
            }
        };
        self.registry.update_status(&deploy_id, status::STOPPED)?;
        info!(deploy_id = %deploy_id, ?termination, "Detached deployment stopped");
        Ok(())
    }

    async fn is_running(&self) -> bool {
        match &self.supervised {
            Some(supervised) => {
                process::is_process_alive(supervised.pid)
                    && self.probe.check(&supervised.info.url).await
            }
            None => false,
        }
    }

    async fn health_check(&self) -> bool {
        match &self.supervised {
            Some(supervised) => self.probe.check(&supervised.info.url).await,
            None => false,
        }
    }

    fn info(&self) -> Option<&DeploymentInfo> {
        self.supervised.as_ref().map(|s| &s.info)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use tempfile::{TempDir, tempdir};

    use super::*;

    fn manager(dir: &TempDir, registry: DeploymentRegistry) -> DetachedDeployManager {
        let mut config = DetachedConfig::new("/bin/sh", Vec::new());
        config.bundles_dir = dir.path().join("bundles");
        config.shutdown_timeout = Duration::from_secs(2);
        DetachedDeployManager::new(config, registry).unwrap()
    }

    /// Session leader running `sleep 30`, logging into `dir`
    fn spawn_sleeper(dir: &Path) -> Child {
        let bundle = Bundle {
            deploy_id: "detached_test".to_string(),
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "exec sleep 30".to_string()],
            env: BTreeMap::new(),
            host: "127.0.0.1".to_string(),
            port: 1,
            agent_source: "sleeper".to_string(),
        };
        spawn_detached(&bundle, dir).unwrap()
    }

    /// A path whose parent is a regular file, so nothing can be created in it
    fn unwritable_bundle_dir(dir: &TempDir) -> PathBuf {
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, "").unwrap();
        file.join("bundle")
    }

    // ==================== PID File Tests ====================

    #[tokio::test]
    async fn child_is_terminated_when_pid_file_cannot_be_written() {
        let dir = tempdir().unwrap();
        let manager = manager(&dir, DeploymentRegistry::in_memory());
        let child = spawn_sleeper(dir.path());
        let pid = child.id();

        let info = DeploymentInfo {
            deploy_id: "detached_test".to_string(),
            url: "http://127.0.0.1:1".to_string(),
        };
        let result = manager
            .adopt(child, info, unwritable_bundle_dir(&dir))
            .await;

        assert!(matches!(result, Err(DeployError::Io(_))));
        assert!(!process::is_process_alive(pid));
    }

    // ==================== Stop Tests ====================

    #[tokio::test]
    async fn failed_stop_keeps_supervision() {
        let dir = tempdir().unwrap();
        let registry = DeploymentRegistry::in_memory();
        let record = DeploymentRecord::new(platform::DETACHED, "http://127.0.0.1:1", "sleeper");
        registry.put(&record).unwrap();

        let mut manager = manager(&dir, registry.clone());
        let child = spawn_sleeper(dir.path());
        manager.supervised = Some(Supervised {
            info: DeploymentInfo {
                deploy_id: record.id.clone(),
                url: record.url.clone(),
            },
            bundle_dir: unwritable_bundle_dir(&dir),
            pid: child.id(),
            child: Some(child),
        });

        let err = manager.stop().await.unwrap_err();
        assert!(matches!(err, DeployError::Io(_)));
        assert_eq!(
            manager.info().map(|info| info.deploy_id.as_str()),
            Some(record.id.as_str())
        );
        assert_eq!(
            registry.require(&record.id).unwrap().status,
            status::RUNNING
        );
    }

    #[tokio::test]
    async fn stop_without_deploy_is_not_running() {
        let dir = tempdir().unwrap();
        let mut manager = manager(&dir, DeploymentRegistry::in_memory());
        assert!(matches!(manager.stop().await, Err(DeployError::NotRunning)));
    }
}
