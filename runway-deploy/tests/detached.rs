//! Detached deployment supervision tests
//!
//! These use `/bin/sh` as the service so failures are deterministic:
//! - A service that exits during startup is reported with its output
//! - A service that never becomes healthy is killed and marked failed

#![cfg(unix)]

use std::time::Duration;

use runway_core::registry::status;
use runway_core::{DeploymentRegistry, ListFilter};
use runway_deploy::bundle::{self, Bundle};
use runway_deploy::process::{is_process_alive, read_pid_file};
use runway_deploy::{DeployError, DeployManager, DetachedConfig, DetachedDeployManager};
use tempfile::TempDir;

fn shell_config(bundles: &TempDir, script: &str) -> DetachedConfig {
    let mut config = DetachedConfig::new("/bin/sh", vec!["-c".to_string(), script.to_string()]);
    config.port = 0;
    config.bundles_dir = bundles.path().to_path_buf();
    config.startup_timeout = Duration::from_secs(5);
    config.shutdown_timeout = Duration::from_secs(2);
    config
}

#[tokio::test]
async fn early_exit_is_reported_with_output_and_marked_failed() {
    let bundles = TempDir::new().unwrap();
    let registry = DeploymentRegistry::in_memory();
    let config = shell_config(&bundles, "echo boom-on-port-{port} >&2; exit 3");
    let mut manager = DetachedDeployManager::new(config, registry.clone()).unwrap();

    let (message, output) = match manager.deploy().await {
        Err(DeployError::ProcessSupervision { message, output }) => (message, output),
        other => panic!("expected supervision error, got {other:?}"),
    };
    assert!(message.contains("exited during startup"), "{message}");
    assert!(output.contains("boom-on-port-"), "{output}");

    let records = registry.list_all(&ListFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, status::FAILED);

    // The bundle stays behind for inspection, without a PID file
    let bundle_dir = bundles.path().join(&records[0].id);
    let bundle = Bundle::load(&bundle_dir).unwrap();
    assert_eq!(bundle.deploy_id, records[0].id);
    assert_eq!(read_pid_file(&bundle::pid_file(&bundle_dir)), None);
    assert!(!manager.is_running().await);
}

#[tokio::test]
async fn unhealthy_service_is_killed_after_startup_timeout() {
    let bundles = TempDir::new().unwrap();
    let registry = DeploymentRegistry::in_memory();
    let mut config = shell_config(&bundles, "exec sleep 30");
    config.startup_timeout = Duration::from_millis(300);
    let mut manager = DetachedDeployManager::new(config, registry.clone()).unwrap();

    let err = manager.deploy().await.unwrap_err();
    assert!(
        matches!(&err, DeployError::ProcessSupervision { message, .. } if message.contains("did not become healthy")),
        "{err:?}"
    );

    let record = registry.list_all(&ListFilter::default()).unwrap().remove(0);
    assert_eq!(record.status, status::FAILED);
    let pid = record
        .config_value("pid")
        .and_then(|v| v.as_u64())
        .unwrap() as u32;
    assert!(!is_process_alive(pid));
}

#[tokio::test]
async fn resume_without_live_process_is_not_running() {
    let bundles = TempDir::new().unwrap();
    let bundle_dir = bundles.path().join("detached_x");
    Bundle {
        deploy_id: "detached_x".to_string(),
        program: "/bin/true".into(),
        args: vec![],
        env: Default::default(),
        host: "127.0.0.1".to_string(),
        port: 1,
        agent_source: "test".to_string(),
    }
    .write(&bundle_dir)
    .unwrap();

    let result = DetachedDeployManager::resume(
        &bundle_dir,
        DeploymentRegistry::in_memory(),
        Duration::from_secs(1),
    );
    assert!(matches!(result, Err(DeployError::NotRunning)));
}
