//! Bundle manifests for detached deployments
//!
//! A bundle directory holds everything needed to supervise a detached
//! service without the process that launched it:
//!
//! ```text
//! <bundles_dir>/<deploy_id>/
//!   bundle_meta.json   launch manifest
//!   service.pid        PID of the process group leader
//!   service.log        combined stdout/stderr
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DeployError;

pub const BUNDLE_META: &str = "bundle_meta.json";
pub const PID_FILE: &str = "service.pid";
pub const LOG_FILE: &str = "service.log";

/// Launch manifest for a detached service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub deploy_id: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub host: String,
    pub port: u16,
    pub agent_source: String,
}

impl Bundle {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Write `bundle_meta.json` into `dir`, creating it if needed
    pub fn write(&self, dir: &Path) -> Result<PathBuf, DeployError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(BUNDLE_META);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }

    /// Load the manifest from a bundle directory
    pub fn load(dir: &Path) -> Result<Self, DeployError> {
        let path = dir.join(BUNDLE_META);
        let text = fs::read_to_string(&path).map_err(|e| {
            DeployError::InvalidBundle(format!("cannot read {}: {}", path.display(), e))
        })?;
        let bundle: Bundle = serde_json::from_str(&text)?;
        if bundle.deploy_id.is_empty() {
            return Err(DeployError::InvalidBundle(format!(
                "{} has no deploy_id",
                path.display()
            )));
        }
        Ok(bundle)
    }
}

/// Replace `{host}`, `{port}` and `{deploy_id}` in launch arguments
pub fn expand_args(args: &[String], host: &str, port: u16, deploy_id: &str) -> Vec<String> {
    args.iter()
        .map(|arg| {
            arg.replace("{host}", host)
                .replace("{port}", &port.to_string())
                .replace("{deploy_id}", deploy_id)
        })
        .collect()
}

pub fn pid_file(dir: &Path) -> PathBuf {
    dir.join(PID_FILE)
}

pub fn log_file(dir: &Path) -> PathBuf {
    dir.join(LOG_FILE)
}

/// Last `max_bytes` of a log file, lossily decoded; empty if unreadable
pub fn read_log_tail(path: &Path, max_bytes: u64) -> String {
    let Ok(mut file) = fs::File::open(path) else {
        return String::new();
    };
    let len = file.metadata().map(|m| m.len()).unwrap_or(0);
    if len > max_bytes && file.seek(SeekFrom::Start(len - max_bytes)).is_err() {
        return String::new();
    }
    let mut bytes = Vec::new();
    if file.read_to_end(&mut bytes).is_err() {
        return String::new();
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
