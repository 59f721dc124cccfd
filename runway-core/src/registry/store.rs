//! Registry storage trait with file-backed and in-memory implementations

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::record::DeploymentRecord;
use crate::error::RegistryError;

/// Name of the persisted registry file
pub const STATE_FILE: &str = "deployments.json";
/// Current state file format version
pub const STATE_VERSION: u32 = 1;

const LOCK_FILE: &str = "deployments.lock";
const BACKUP_PREFIX: &str = "deployments.backup.";
const BACKUP_SUFFIX: &str = ".json";
const MAX_BACKUPS: usize = 5;

/// The full persisted collection, keyed by deployment id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub deployments: BTreeMap<String, DeploymentRecord>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            deployments: BTreeMap::new(),
        }
    }
}

impl RegistrySnapshot {
    /// Check the structural invariants of a loaded or imported snapshot
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.version > STATE_VERSION {
            return Err(RegistryError::InvalidData(format!(
                "unsupported state version {}",
                self.version
            )));
        }
        if let Some((key, record)) = self.deployments.iter().find(|(k, r)| **k != r.id) {
            return Err(RegistryError::InvalidData(format!(
                "record {} stored under key {}",
                record.id, key
            )));
        }
        Ok(())
    }

    /// Parse and validate a serialized snapshot
    pub fn from_json(text: &str) -> Result<Self, RegistryError> {
        let snapshot: RegistrySnapshot = serde_json::from_str(text)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}

/// Persistence medium for the deployment registry.
///
/// `update` is an atomic read-modify-write: the closure sees the latest
/// snapshot and its changes are committed only when it returns `Ok`.
pub trait RegistryStore: Send + Sync {
    fn load(&self) -> Result<RegistrySnapshot, RegistryError>;

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut RegistrySnapshot) -> Result<(), RegistryError>,
    ) -> Result<(), RegistryError>;
}

/// In-memory store (for testing)
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<RegistrySnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistrySnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RegistryStore for MemoryStore {
    fn load(&self) -> Result<RegistrySnapshot, RegistryError> {
        Ok(self.lock().clone())
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut RegistrySnapshot) -> Result<(), RegistryError>,
    ) -> Result<(), RegistryError> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        apply(&mut next)?;
        next.validate()?;
        *guard = next;
        Ok(())
    }
}

/// JSON file store shared safely between processes.
///
/// Writers serialise on an advisory lock over `deployments.lock`, write the
/// new snapshot to a temporary file and rename it over `deployments.json`,
/// so readers never observe a partial file. The previous file is copied to
/// a timestamped backup first; the newest five backups are kept.
pub struct JsonFileStore {
    dir: PathBuf,
    state_file: PathBuf,
    lock_file: PathBuf,
}

impl JsonFileStore {
    /// Open the store rooted at `dir`, creating the directory if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            state_file: dir.join(STATE_FILE),
            lock_file: dir.join(LOCK_FILE),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_file(&self) -> &Path {
        &self.state_file
    }

    /// Backup files currently on disk, oldest first
    pub fn backups(&self) -> Result<Vec<PathBuf>, RegistryError> {
        let mut backups: Vec<(i64, PathBuf)> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let stamp = name
                    .strip_prefix(BACKUP_PREFIX)?
                    .strip_suffix(BACKUP_SUFFIX)?
                    .parse::<i64>()
                    .ok()?;
                Some((stamp, entry.path()))
            })
            .collect();
        backups.sort();
        Ok(backups.into_iter().map(|(_, path)| path).collect())
    }

    fn read_snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        let text = match fs::read_to_string(&self.state_file) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(RegistrySnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        match RegistrySnapshot::from_json(&text) {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                // The file stays on disk for manual recovery and is backed up
                // before the next write replaces it
                warn!(
                    path = %self.state_file.display(),
                    error = %e,
                    "Registry state file is corrupted, starting with empty state"
                );
                Ok(RegistrySnapshot::default())
            }
        }
    }

    fn write_snapshot(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        self.backup()?;

        let json = serde_json::to_string_pretty(snapshot)?;
        let temp_file = self.state_file.with_extension("tmp");
        {
            let mut file = File::create(&temp_file)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_file, &self.state_file)?;
        debug!(
            path = %self.state_file.display(),
            deployments = snapshot.deployments.len(),
            "Registry written"
        );
        Ok(())
    }

    fn backup(&self) -> Result<(), RegistryError> {
        if !self.state_file.exists() {
            return Ok(());
        }

        let name = format!(
            "{}{}{}",
            BACKUP_PREFIX,
            Utc::now().timestamp_micros(),
            BACKUP_SUFFIX
        );
        fs::copy(&self.state_file, self.dir.join(name))?;

        let backups = self.backups()?;
        if backups.len() > MAX_BACKUPS {
            for old in &backups[..backups.len() - MAX_BACKUPS] {
                fs::remove_file(old)?;
            }
        }
        Ok(())
    }
}

impl RegistryStore for JsonFileStore {
    fn load(&self) -> Result<RegistrySnapshot, RegistryError> {
        self.read_snapshot()
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut RegistrySnapshot) -> Result<(), RegistryError>,
    ) -> Result<(), RegistryError> {
        let _lock = FileLock::acquire(&self.lock_file)?;

        let mut snapshot = self.read_snapshot()?;
        apply(&mut snapshot)?;
        snapshot.validate()?;
        self.write_snapshot(&snapshot)
    }
}

/// Exclusive advisory lock held until drop
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        lock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        unlock(&self.file);
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    loop {
        // SAFETY: the descriptor is owned by `file` and valid for the call
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;

    // SAFETY: see lock_exclusive; closing the file would also release it
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
