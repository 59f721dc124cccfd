//! End-to-end tests of the `runway` binary against an isolated state dir

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

struct Sandbox {
    root: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let sandbox = Self {
            root: TempDir::new().unwrap(),
        };
        std::fs::create_dir_all(sandbox.project_dir()).unwrap();
        std::fs::write(
            sandbox.project_dir().join("config.toml"),
            format!(
                "[deploy]\nstate_dir = {:?}\nshutdown_timeout_secs = 3\n",
                sandbox.state_dir().display().to_string()
            ),
        )
        .unwrap();
        sandbox
    }

    fn project_dir(&self) -> std::path::PathBuf {
        self.root.path().join("project")
    }

    fn state_dir(&self) -> std::path::PathBuf {
        self.root.path().join("state")
    }

    fn runway(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_runway"))
            .args(args)
            .env("XDG_CONFIG_HOME", self.root.path().join("xdg-config"))
            .env("XDG_STATE_HOME", self.root.path().join("xdg-state"))
            .env("RUNWAY_PROJECT_CONFIG_DIR", self.project_dir())
            .env_remove("RUST_LOG")
            .current_dir(self.root.path())
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn deployment_id(output: &Output) -> String {
    stdout(output)
        .lines()
        .find_map(|line| line.strip_prefix("Deployment ID:"))
        .map(|id| id.trim().to_string())
        .unwrap_or_else(|| panic!("no deployment id in output: {}", stdout(output)))
}

fn record_json(sandbox: &Sandbox, id: &str) -> serde_json::Value {
    let output = sandbox.runway(&["status", id, "--format", "json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    serde_json::from_slice(&output.stdout).unwrap()
}

// ==================== Config Tests ====================

#[test]
fn config_show_reflects_project_file() {
    let sandbox = Sandbox::new();
    let output = sandbox.runway(&["config", "show"]);

    assert!(output.status.success(), "{}", stderr(&output));
    let shown: toml::Value = toml::from_str(&stdout(&output)).unwrap();
    assert_eq!(shown["server"]["port"].as_integer(), Some(8090));
    assert_eq!(
        shown["deploy"]["shutdown_timeout_secs"].as_integer(),
        Some(3)
    );
    assert_eq!(
        shown["deploy"]["state_dir"].as_str(),
        Some(sandbox.state_dir().display().to_string().as_str())
    );
}

// ==================== Registry Command Tests ====================

#[test]
fn list_on_empty_registry() {
    let sandbox = Sandbox::new();
    let output = sandbox.runway(&["list"]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("No deployments found"));
}

#[test]
fn status_of_unknown_deployment_fails() {
    let sandbox = Sandbox::new();
    let output = sandbox.runway(&["status", "local_19700101_000000_000000"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Deployment not found: local_19700101_000000_000000"));
}

#[test]
fn remote_deployment_lifecycle() {
    let sandbox = Sandbox::new();
    let token = "tok-0123456789abcdefghij-secret";

    let deployed = sandbox.runway(&[
        "deploy",
        "remote",
        "http://127.0.0.1:9/",
        "--token",
        token,
    ]);
    assert!(deployed.status.success(), "{}", stderr(&deployed));
    let id = deployment_id(&deployed);
    assert!(id.starts_with("remote_"));

    let listed = sandbox.runway(&["list"]);
    assert!(stdout(&listed).contains(&id));
    assert!(stdout(&listed).contains("Total: 1 deployment(s)"));

    let details = sandbox.runway(&["status", &id]);
    let text = stdout(&details);
    assert!(text.contains(&format!("Deployment ID: {}", id)));
    assert!(text.contains("Platform: remote"));
    assert!(text.contains("URL: http://127.0.0.1:9"));
    assert!(text.contains("Token: tok-0123456789abcdef..."));
    assert!(!text.contains(token));

    let stopped = sandbox.runway(&["stop", &id, "--yes"]);
    assert!(stopped.status.success(), "{}", stderr(&stopped));
    assert!(stdout(&stopped).contains(&format!("Deployment {} marked as stopped", id)));
    assert_eq!(record_json(&sandbox, &id)["status"], "stopped");

    let again = sandbox.runway(&["stop", &id, "--yes"]);
    assert!(stdout(&again).contains("is already stopped"));

    let filtered = sandbox.runway(&["list", "--status", "running", "--format", "json"]);
    let running: Vec<serde_json::Value> = serde_json::from_slice(&filtered.stdout).unwrap();
    assert!(running.is_empty());

    let removed = sandbox.runway(&["remove", &id, "--yes"]);
    assert!(removed.status.success(), "{}", stderr(&removed));
    assert_eq!(sandbox.runway(&["status", &id]).status.code(), Some(1));
}

#[test]
fn list_hides_superseded_records_unless_all() {
    let sandbox = Sandbox::new();
    for _ in 0..2 {
        let output = sandbox.runway(&["deploy", "remote", "http://127.0.0.1:9"]);
        assert!(output.status.success(), "{}", stderr(&output));
    }

    let deduped = sandbox.runway(&["list", "--format", "json"]);
    let records: Vec<serde_json::Value> = serde_json::from_slice(&deduped.stdout).unwrap();
    assert_eq!(records.len(), 1);

    let all = sandbox.runway(&["list", "--all", "--format", "json"]);
    let records: Vec<serde_json::Value> = serde_json::from_slice(&all.stdout).unwrap();
    assert_eq!(records.len(), 2);
}

// ==================== Detached Deploy Tests ====================

#[cfg(unix)]
#[test]
fn detached_deploy_then_stop() {
    let sandbox = Sandbox::new();

    let deployed = sandbox.runway(&["deploy", "detached", "--port", "0"]);
    assert!(deployed.status.success(), "{}", stderr(&deployed));
    let id = deployment_id(&deployed);

    let record = record_json(&sandbox, &id);
    assert_eq!(record["status"], "running");
    let bundle_dir = record["config"]["bundle_dir"].as_str().unwrap().to_string();
    assert!(Path::new(&bundle_dir).join("bundle_meta.json").exists());
    let port = record["config"]["port"].as_u64().unwrap();
    assert!(std::net::TcpStream::connect(("127.0.0.1", port as u16)).is_ok());

    let stopped = sandbox.runway(&["stop", &id, "--yes"]);
    assert!(stopped.status.success(), "{}", stderr(&stopped));

    assert_eq!(record_json(&sandbox, &id)["status"], "stopped");
    assert!(!Path::new(&bundle_dir).join("service.pid").exists());
    assert!(std::net::TcpStream::connect(("127.0.0.1", port as u16)).is_err());
}
