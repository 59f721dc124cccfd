//! DeploymentRegistry: queries and bookkeeping over a RegistryStore

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::record::DeploymentRecord;
use super::store::{JsonFileStore, MemoryStore, RegistrySnapshot, RegistryStore};
use crate::error::RegistryError;

/// Optional filters for [`DeploymentRegistry::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<String>,
    pub platform: Option<String>,
}

impl ListFilter {
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            status: Some(status.into()),
            platform: None,
        }
    }

    pub fn platform(platform: impl Into<String>) -> Self {
        Self {
            status: None,
            platform: Some(platform.into()),
        }
    }

    fn matches(&self, record: &DeploymentRecord) -> bool {
        self.status.as_deref().is_none_or(|s| record.status == s)
            && self.platform.as_deref().is_none_or(|p| record.platform == p)
    }
}

/// Durable collection of deployment records.
///
/// Writes keep every record; the default `list` view collapses records
/// sharing a `(url, platform)` pair to the most recently created one.
#[derive(Clone)]
pub struct DeploymentRegistry {
    store: Arc<dyn RegistryStore>,
}

impl DeploymentRegistry {
    /// Open the file-backed registry rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let store = JsonFileStore::open(dir)?;
        debug!(path = %store.state_file().display(), "Opened deployment registry");
        Ok(Self::with_store(Arc::new(store)))
    }

    /// Registry over an in-memory store (for testing)
    pub fn in_memory() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn RegistryStore>) -> Self {
        Self { store }
    }

    /// Release this handle; other clones keep the store alive
    pub fn close(self) {
        debug!("Closed deployment registry handle");
    }

    /// Create or replace the record with `record.id`
    pub fn put(&self, record: &DeploymentRecord) -> Result<(), RegistryError> {
        self.mutate(|snapshot| {
            snapshot
                .deployments
                .insert(record.id.clone(), record.clone());
            Ok(())
        })?;
        info!(deploy_id = %record.id, platform = %record.platform, status = %record.status, "Registered deployment");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<DeploymentRecord>, RegistryError> {
        Ok(self.store.load()?.deployments.remove(id))
    }

    /// Like [`get`](Self::get) but a miss is `DeploymentNotFound`
    pub fn require(&self, id: &str) -> Result<DeploymentRecord, RegistryError> {
        self.get(id)?
            .ok_or_else(|| RegistryError::DeploymentNotFound(id.to_string()))
    }

    pub fn exists(&self, id: &str) -> Result<bool, RegistryError> {
        Ok(self.store.load()?.deployments.contains_key(id))
    }

    /// Canonical records matching `filter`, newest first.
    ///
    /// Records are first collapsed per `(url, platform)` to the one with the
    /// greatest `(created_at, id)`; the filter applies to the survivors, so a
    /// stopped redeploy hides the older running record behind it.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<DeploymentRecord>, RegistryError> {
        let snapshot = self.store.load()?;
        let mut canonical: HashMap<(&str, &str), &DeploymentRecord> = HashMap::new();
        for record in snapshot.deployments.values() {
            canonical
                .entry((record.url.as_str(), record.platform.as_str()))
                .and_modify(|current| {
                    if recency(record) > recency(current) {
                        *current = record;
                    }
                })
                .or_insert(record);
        }

        let mut records: Vec<DeploymentRecord> = canonical
            .into_values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Every stored record matching `filter`, newest first, without collapsing
    pub fn list_all(&self, filter: &ListFilter) -> Result<Vec<DeploymentRecord>, RegistryError> {
        let mut records: Vec<DeploymentRecord> = self
            .store
            .load()?
            .deployments
            .into_values()
            .filter(|record| filter.matches(record))
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    /// Set the status of an existing record and return the updated record
    pub fn update_status(&self, id: &str, status: &str) -> Result<DeploymentRecord, RegistryError> {
        let record = self.modify(id, |record| record.status = status.to_string())?;
        info!(deploy_id = %id, status, "Deployment status updated");
        Ok(record)
    }

    /// Apply `change` to an existing record inside one atomic update
    pub fn modify(
        &self,
        id: &str,
        change: impl FnOnce(&mut DeploymentRecord),
    ) -> Result<DeploymentRecord, RegistryError> {
        self.mutate(|snapshot| {
            let record = snapshot
                .deployments
                .get_mut(id)
                .ok_or_else(|| RegistryError::DeploymentNotFound(id.to_string()))?;
            change(record);
            Ok(record.clone())
        })
    }

    /// Remove a record permanently
    pub fn delete(&self, id: &str) -> Result<DeploymentRecord, RegistryError> {
        let removed = self.mutate(|snapshot| {
            snapshot
                .deployments
                .remove(id)
                .ok_or_else(|| RegistryError::DeploymentNotFound(id.to_string()))
        })?;
        info!(deploy_id = %id, "Deployment removed");
        Ok(removed)
    }

    /// Remove every record
    pub fn clear(&self) -> Result<(), RegistryError> {
        self.mutate(|snapshot| {
            snapshot.deployments.clear();
            Ok(())
        })
    }

    /// Write the full stored collection to `path` as JSON
    pub fn export_to(&self, path: &Path) -> Result<usize, RegistryError> {
        let snapshot = self.store.load()?;
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(snapshot.deployments.len())
    }

    /// Load records from an exported file.
    ///
    /// With `merge` the imported records are added over the existing ones,
    /// otherwise they replace the collection. Returns the imported count.
    pub fn import_from(&self, path: &Path, merge: bool) -> Result<usize, RegistryError> {
        let imported = RegistrySnapshot::from_json(&fs::read_to_string(path)?)?;
        let count = imported.deployments.len();
        self.mutate(move |snapshot| {
            if merge {
                snapshot.deployments.extend(imported.deployments);
            } else {
                *snapshot = imported;
            }
            Ok(())
        })?;
        info!(path = %path.display(), count, merge, "Imported deployments");
        Ok(count)
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut RegistrySnapshot) -> Result<T, RegistryError>,
    ) -> Result<T, RegistryError> {
        let mut apply = Some(apply);
        let mut output = None;
        self.store.update(&mut |snapshot| {
            let apply = apply
                .take()
                .ok_or_else(|| RegistryError::InvalidData("update applied twice".to_string()))?;
            output = Some(apply(snapshot)?);
            Ok(())
        })?;
        output.ok_or_else(|| RegistryError::InvalidData("update produced no result".to_string()))
    }
}

fn recency(record: &DeploymentRecord) -> (&str, &str) {
    (record.created_at.as_str(), record.id.as_str())
}

fn sort_newest_first(records: &mut [DeploymentRecord]) {
    records.sort_by(|a, b| recency(b).cmp(&recency(a)));
}
