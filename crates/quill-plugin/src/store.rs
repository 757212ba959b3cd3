//! Persisted extension store: durable status and settings.
//!
//! The registry treats the store as an external resource it does not own
//! exclusively: every lifecycle decision re-reads it instead of caching.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::{PluginError, PluginResult};
use crate::status::ExtensionStatus;

/// A persisted extension record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredExtension {
    /// Extension name.
    pub name: String,
    /// Last persisted lifecycle status. `None` for a record that only
    /// holds settings.
    #[serde(default)]
    pub status: Option<ExtensionStatus>,
    /// Extension-owned settings.
    #[serde(default)]
    pub settings: Value,
    /// When the install callback last completed.
    #[serde(default)]
    pub installed_at: Option<DateTime<Utc>>,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl StoredExtension {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: None,
            settings: Value::Null,
            installed_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether the install callback has completed for this extension.
    pub fn is_installed(&self) -> bool {
        self.installed_at.is_some()
    }
}

/// Durable source of extension status and settings.
#[async_trait]
pub trait ExtensionStore: Send + Sync + Debug {
    /// Fetches one record.
    async fn get_extension(&self, name: &str) -> PluginResult<Option<StoredExtension>>;

    /// Lists every record, sorted by name.
    async fn list_extensions(&self) -> PluginResult<Vec<StoredExtension>>;

    /// Upserts the status of a record.
    async fn set_status(&self, name: &str, status: ExtensionStatus) -> PluginResult<()>;

    /// Upserts the settings of a record.
    async fn set_settings(&self, name: &str, settings: Value) -> PluginResult<()>;
}

type Records = BTreeMap<String, StoredExtension>;

fn apply_status(records: &mut Records, name: &str, status: ExtensionStatus) {
    let now = Utc::now();
    let record = records
        .entry(name.to_string())
        .or_insert_with(|| StoredExtension::new(name));

    record.status = Some(status);
    record.updated_at = now;
    match status {
        ExtensionStatus::Installed | ExtensionStatus::Active => {
            record.installed_at.get_or_insert(now);
        }
        ExtensionStatus::Uninstalled => record.installed_at = None,
        _ => {}
    }
}

fn apply_settings(records: &mut Records, name: &str, settings: Value) {
    let record = records
        .entry(name.to_string())
        .or_insert_with(|| StoredExtension::new(name));
    record.settings = settings;
    record.updated_at = Utc::now();
}

/// Store kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryExtensionStore {
    records: RwLock<Records>,
}

impl MemoryExtensionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = StoredExtension>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|r| (r.name.clone(), r)).collect()),
        }
    }
}

#[async_trait]
impl ExtensionStore for MemoryExtensionStore {
    async fn get_extension(&self, name: &str) -> PluginResult<Option<StoredExtension>> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn list_extensions(&self) -> PluginResult<Vec<StoredExtension>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn set_status(&self, name: &str, status: ExtensionStatus) -> PluginResult<()> {
        apply_status(&mut *self.records.write().await, name, status);
        Ok(())
    }

    async fn set_settings(&self, name: &str, settings: Value) -> PluginResult<()> {
        apply_settings(&mut *self.records.write().await, name, settings);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    extensions: Vec<StoredExtension>,
}

/// Store persisted as one JSON document.
///
/// Every mutation rewrites the whole document to a sibling temp file and
/// renames it over the original, so readers never see a partial file.
#[derive(Debug)]
pub struct JsonFileExtensionStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonFileExtensionStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> PluginResult<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let doc: StateDocument = serde_json::from_slice(&bytes).map_err(|e| {
                    PluginError::storage(format!("{} is not a valid state file: {e}", path.display()))
                })?;
                doc.extensions
                    .into_iter()
                    .map(|r| (r.name.clone(), r))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::new(),
            Err(e) => {
                return Err(PluginError::storage(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        debug!(path = %path.display(), records = records.len(), "Extension state loaded");

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, records: &Records) -> PluginResult<()> {
        let doc = StateDocument {
            extensions: records.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| PluginError::storage(format!("failed to encode state: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PluginError::storage(format!("failed to create {}: {e}", parent.display())))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| PluginError::storage(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| {
                PluginError::storage(format!("failed to replace {}: {e}", self.path.display()))
            })?;

        Ok(())
    }
}

#[async_trait]
impl ExtensionStore for JsonFileExtensionStore {
    async fn get_extension(&self, name: &str) -> PluginResult<Option<StoredExtension>> {
        Ok(self.records.lock().await.get(name).cloned())
    }

    async fn list_extensions(&self) -> PluginResult<Vec<StoredExtension>> {
        Ok(self.records.lock().await.values().cloned().collect())
    }

    async fn set_status(&self, name: &str, status: ExtensionStatus) -> PluginResult<()> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        apply_status(&mut next, name, status);
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn set_settings(&self, name: &str, settings: Value) -> PluginResult<()> {
        let mut records = self.records.lock().await;
        let mut next = records.clone();
        apply_settings(&mut next, name, settings);
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }
}
