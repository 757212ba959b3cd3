//! Plugin registry: source of truth for extension metadata, status and settings.
//!
//! All mutations go through one exclusive lock; a status transition is
//! checked against the record as it is inside that lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::api::events::HookSubscription;
use crate::error::{PluginError, PluginResult};
use crate::extension::{Extension, ExtensionManifest, HookBinding};
use crate::graph::DependencyGraph;
use crate::status::ExtensionStatus;
use crate::store::{ExtensionStore, MemoryExtensionStore, StoredExtension};
use crate::validator::{self, RegistrySnapshot, SnapshotEntry};

/// Registry view of one extension.
#[derive(Debug, Clone)]
pub struct ExtensionRecord {
    /// Declared manifest.
    pub manifest: ExtensionManifest,
    /// Hooks attached while the extension is active.
    pub hooks: Vec<HookSubscription>,
    /// Current lifecycle status.
    pub status: ExtensionStatus,
    /// Extension-owned settings.
    pub settings: Value,
    /// Failure that put the extension in `Error`, if any.
    pub last_error: Option<PluginError>,
    /// When the manifest was accepted.
    pub registered_at: DateTime<Utc>,
    /// Last status or settings change.
    pub updated_at: DateTime<Utc>,
    /// Registration sequence, used for stable ordering.
    pub sequence: u64,
}

impl ExtensionRecord {
    /// Extension name.
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Names of the declared dependencies.
    pub fn dependency_names(&self) -> Vec<String> {
        self.manifest
            .dependencies
            .iter()
            .map(|d| d.name.clone())
            .collect()
    }

    fn snapshot_entry(&self) -> SnapshotEntry {
        SnapshotEntry {
            version: self.manifest.version.clone(),
            status: self.status,
            routes: self.manifest.routes.iter().map(|r| r.claim_key()).collect(),
        }
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    records: HashMap<String, ExtensionRecord>,
    instances: HashMap<String, Arc<dyn Extension>>,
    next_sequence: u64,
}

impl RegistryState {
    fn snapshot(&self) -> RegistrySnapshot {
        let mut snapshot = RegistrySnapshot::new();
        for (name, record) in &self.records {
            snapshot.insert(name.clone(), record.snapshot_entry());
        }
        snapshot
    }

    fn record_mut(&mut self, name: &str) -> PluginResult<&mut ExtensionRecord> {
        self.records
            .get_mut(name)
            .ok_or_else(|| PluginError::not_found(name))
    }

    fn sorted(&self) -> Vec<&ExtensionRecord> {
        let mut records: Vec<&ExtensionRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.sequence);
        records
    }
}

/// Registry of all known extensions.
#[derive(Debug)]
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
    store: Arc<dyn ExtensionStore>,
}

impl PluginRegistry {
    /// Creates a registry backed by the given store.
    pub fn new(store: Arc<dyn ExtensionStore>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            store,
        }
    }

    /// Creates a registry backed by an in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryExtensionStore::new()))
    }

    /// The persisted store behind this registry.
    pub fn store(&self) -> &Arc<dyn ExtensionStore> {
        &self.store
    }

    /// Validates and registers an extension against the current registry.
    ///
    /// A failing manifest is recorded with status `Error` unless the name
    /// is blank or already held.
    pub async fn register(&self, extension: Arc<dyn Extension>) -> PluginResult<ExtensionRecord> {
        let mut state = self.state.write().await;
        let snapshot = state.snapshot();
        self.register_locked(&mut state, extension, snapshot).await
    }

    /// Registers a static list of extensions as one batch.
    ///
    /// Each manifest is validated against the registry plus the manifests
    /// later in the batch, so the list may be declared in any order.
    /// Later manifests stand in as `Registered` before their own checks
    /// run, so a dependent of a manifest that is itself rejected is still
    /// accepted here; `validate` catches it before activation.
    /// Results are returned per extension, in input order.
    pub async fn register_all(
        &self,
        extensions: Vec<Arc<dyn Extension>>,
    ) -> Vec<(String, PluginResult<ExtensionRecord>)> {
        let manifests: Vec<ExtensionManifest> = extensions.iter().map(|e| e.manifest()).collect();
        let mut results = Vec::with_capacity(extensions.len());
        let mut state = self.state.write().await;

        for (i, extension) in extensions.into_iter().enumerate() {
            let name = manifests[i].name.clone();
            let mut snapshot = state.snapshot();
            for later in &manifests[i + 1..] {
                if later.name != name {
                    snapshot.insert_missing(
                        later.name.clone(),
                        SnapshotEntry {
                            version: later.version.clone(),
                            status: ExtensionStatus::Registered,
                            routes: Vec::new(),
                        },
                    );
                }
            }

            let result = self.register_locked(&mut state, extension, snapshot).await;
            results.push((name, result));
        }

        results
    }

    async fn register_locked(
        &self,
        state: &mut RegistryState,
        extension: Arc<dyn Extension>,
        snapshot: RegistrySnapshot,
    ) -> PluginResult<ExtensionRecord> {
        let manifest = extension.manifest();
        let name = manifest.name.clone();
        let hooks: Vec<HookSubscription> =
            extension.hooks().iter().map(HookBinding::subscription).collect();

        let verdict = validator::validate(&manifest, &snapshot);
        let now = Utc::now();
        let sequence = state.next_sequence;

        let (status, settings, last_error) = match verdict {
            Ok(()) => {
                let settings = match self.store.get_extension(&name).await? {
                    Some(StoredExtension { settings, .. }) if !settings.is_null() => settings,
                    _ => manifest.default_settings.clone(),
                };
                (ExtensionStatus::Registered, settings, None)
            }
            Err(err @ PluginError::AlreadyRegistered { .. }) => {
                warn!(extension = %name, "Extension already registered");
                return Err(err);
            }
            Err(err) if name.trim().is_empty() => {
                warn!(error = %err, "Rejected extension without a name");
                return Err(err);
            }
            Err(err) => {
                warn!(extension = %name, error = %err, "Extension failed validation");
                (
                    ExtensionStatus::Error,
                    manifest.default_settings.clone(),
                    Some(err),
                )
            }
        };

        state.next_sequence += 1;
        let record = ExtensionRecord {
            manifest,
            hooks,
            status,
            settings,
            last_error: last_error.clone(),
            registered_at: now,
            updated_at: now,
            sequence,
        };
        state.records.insert(name.clone(), record.clone());
        state.instances.insert(name.clone(), extension);

        match last_error {
            Some(err) => Err(err),
            None => {
                info!(
                    extension = %name,
                    version = %record.manifest.version,
                    dependencies = record.manifest.dependencies.len(),
                    hooks = record.hooks.len(),
                    "Extension registered"
                );
                Ok(record)
            }
        }
    }

    /// Moves a `Registered` extension to `Validated` after re-checking its
    /// dependencies against the live registry. Failure marks it `Error`.
    pub async fn validate(&self, name: &str) -> PluginResult<()> {
        let mut state = self.state.write().await;
        let mut snapshot = state.snapshot();
        snapshot.remove(name);

        let record = state.record_mut(name)?;
        check_transition(record, ExtensionStatus::Validated)?;

        match validator::check_dependencies(&record.manifest, &snapshot) {
            Ok(()) => {
                record.status = ExtensionStatus::Validated;
                record.updated_at = Utc::now();
                Ok(())
            }
            Err(err) => {
                warn!(extension = %name, error = %err, "Extension failed dependency re-check");
                set_error(record, err.clone());
                Err(err)
            }
        }
    }

    /// Returns a dependency-respecting order over every `Registered` or
    /// `Validated` extension.
    pub async fn resolve_activation_order(&self) -> PluginResult<Vec<String>> {
        let state = self.state.read().await;
        let mut graph = DependencyGraph::new();
        for record in state.records.values() {
            if record.status.is_pending_activation() {
                graph.add(record.name(), record.sequence, record.dependency_names());
            }
        }
        graph.activation_order()
    }

    /// Gets an extension record by name.
    pub async fn get(&self, name: &str) -> Option<ExtensionRecord> {
        self.state.read().await.records.get(name).cloned()
    }

    /// Gets the extension instance by name.
    pub async fn instance(&self, name: &str) -> Option<Arc<dyn Extension>> {
        self.state.read().await.instances.get(name).cloned()
    }

    /// Current status of an extension.
    pub async fn status(&self, name: &str) -> Option<ExtensionStatus> {
        self.state.read().await.records.get(name).map(|r| r.status)
    }

    /// Lists records in registration order, optionally filtered by status.
    pub async fn list(&self, filter: Option<ExtensionStatus>) -> Vec<ExtensionRecord> {
        let state = self.state.read().await;
        state
            .sorted()
            .into_iter()
            .filter(|r| filter.is_none_or(|status| r.status == status))
            .cloned()
            .collect()
    }

    /// Names of extensions that declare a dependency on `name`, in registration order.
    pub async fn dependents_of(&self, name: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .sorted()
            .into_iter()
            .filter(|r| r.manifest.dependencies.iter().any(|d| d.name == name))
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Returns the number of registered extensions.
    pub async fn count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Checks whether an extension is registered.
    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.records.contains_key(name)
    }

    /// Reads the persisted record of an extension.
    pub async fn persisted(&self, name: &str) -> PluginResult<Option<StoredExtension>> {
        self.store.get_extension(name).await
    }

    /// Applies a checked status transition and persists durable statuses.
    pub async fn update_status(
        &self,
        name: &str,
        status: ExtensionStatus,
    ) -> PluginResult<ExtensionRecord> {
        self.transition(name, status, true).await
    }

    /// Applies a checked status transition in memory only.
    ///
    /// Used when stopping extensions at shutdown, so the persisted status
    /// still names what was running.
    pub async fn restore_status(
        &self,
        name: &str,
        status: ExtensionStatus,
    ) -> PluginResult<ExtensionRecord> {
        self.transition(name, status, false).await
    }

    /// Aligns a `Validated` extension with the durable status it reached in
    /// an earlier run. Only `Installed` and `Inactive` are accepted; the
    /// store is not written, since it already holds that status.
    pub async fn reconcile_status(
        &self,
        name: &str,
        status: ExtensionStatus,
    ) -> PluginResult<ExtensionRecord> {
        let mut state = self.state.write().await;
        let record = state.record_mut(name)?;
        let reachable = matches!(
            status,
            ExtensionStatus::Installed | ExtensionStatus::Inactive
        );
        if record.status != ExtensionStatus::Validated || !reachable {
            return Err(PluginError::InvalidState {
                name: name.to_string(),
                current: record.status,
                requested: status,
            });
        }

        record.status = status;
        record.updated_at = Utc::now();
        info!(extension = %name, to = %status, "Extension status reconciled with store");
        Ok(record.clone())
    }

    async fn transition(
        &self,
        name: &str,
        status: ExtensionStatus,
        persist: bool,
    ) -> PluginResult<ExtensionRecord> {
        let mut state = self.state.write().await;
        let record = state.record_mut(name)?;
        let previous = record.status;
        check_transition(record, status)?;

        if persist && status.is_persisted() {
            self.store.set_status(name, status).await?;
        }

        record.status = status;
        record.updated_at = Utc::now();
        if status != ExtensionStatus::Error {
            record.last_error = None;
        }

        info!(extension = %name, from = %previous, to = %status, "Extension status changed");
        Ok(record.clone())
    }

    /// Forces an extension into `Error`, recording why.
    pub async fn mark_error(&self, name: &str, error: PluginError) -> PluginResult<()> {
        let mut state = self.state.write().await;
        let record = state.record_mut(name)?;
        warn!(
            extension = %name,
            from = %record.status,
            error = %error,
            "Extension moved to error state"
        );
        set_error(record, error);
        Ok(())
    }

    /// Merges `settings` into the extension's settings and persists the result.
    ///
    /// Objects are merged key by key at the top level; any other value
    /// replaces the settings wholesale.
    pub async fn update_settings(&self, name: &str, settings: Value) -> PluginResult<Value> {
        let mut state = self.state.write().await;
        let record = state.record_mut(name)?;

        let merged = merge_settings(&record.settings, settings);
        self.store.set_settings(name, merged.clone()).await?;

        record.settings = merged.clone();
        record.updated_at = Utc::now();
        info!(extension = %name, "Extension settings updated");
        Ok(merged)
    }

    /// Removes an `Uninstalled` extension from the registry.
    pub async fn remove(&self, name: &str) -> PluginResult<ExtensionRecord> {
        let mut state = self.state.write().await;
        let record = state.record_mut(name)?;
        if record.status != ExtensionStatus::Uninstalled {
            return Err(PluginError::InvalidState {
                name: name.to_string(),
                current: record.status,
                requested: ExtensionStatus::Uninstalled,
            });
        }

        state.instances.remove(name);
        let removed = state
            .records
            .remove(name)
            .ok_or_else(|| PluginError::not_found(name))?;
        info!(extension = %name, "Extension removed from registry");
        Ok(removed)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn check_transition(record: &ExtensionRecord, requested: ExtensionStatus) -> PluginResult<()> {
    if record.status.can_transition_to(requested) {
        Ok(())
    } else {
        Err(PluginError::InvalidState {
            name: record.manifest.name.clone(),
            current: record.status,
            requested,
        })
    }
}

fn set_error(record: &mut ExtensionRecord, error: PluginError) {
    record.status = ExtensionStatus::Error;
    record.last_error = Some(error);
    record.updated_at = Utc::now();
}

fn merge_settings(current: &Value, update: Value) -> Value {
    match (current, update) {
        (Value::Object(current), Value::Object(update)) => {
            let mut merged = current.clone();
            merged.extend(update);
            Value::Object(merged)
        }
        (_, update) => update,
    }
}
