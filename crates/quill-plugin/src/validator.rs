//! Manifest validation against a snapshot of the registry.
//!
//! Pure functions: nothing here touches the registry or the store.

use std::collections::{HashMap, HashSet};

use semver::{Version, VersionReq};

use crate::error::{PluginError, PluginResult};
use crate::extension::ExtensionManifest;
use crate::status::ExtensionStatus;

/// What the validator needs to know about one known extension.
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    /// Declared version string.
    pub version: String,
    /// Current status.
    pub status: ExtensionStatus,
    /// Route claim keys (`METHOD path`).
    pub routes: Vec<String>,
}

impl SnapshotEntry {
    fn is_usable(&self) -> bool {
        self.status != ExtensionStatus::Error
    }
}

/// Point-in-time view of the extensions a manifest is validated against.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: HashMap<String, SnapshotEntry>,
}

impl RegistrySnapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    pub fn insert(&mut self, name: impl Into<String>, entry: SnapshotEntry) {
        self.entries.insert(name.into(), entry);
    }

    /// Adds an entry unless the name is already known.
    pub fn insert_missing(&mut self, name: impl Into<String>, entry: SnapshotEntry) {
        self.entries.entry(name.into()).or_insert(entry);
    }

    /// Removes an entry.
    pub fn remove(&mut self, name: &str) -> Option<SnapshotEntry> {
        self.entries.remove(name)
    }

    /// Looks up an entry.
    pub fn get(&self, name: &str) -> Option<&SnapshotEntry> {
        self.entries.get(name)
    }

    fn route_owner(&self, claim: &str, except: &str) -> Option<&str> {
        self.entries
            .iter()
            .filter(|(name, entry)| name.as_str() != except && entry.is_usable())
            .find(|(_, entry)| entry.routes.iter().any(|r| r == claim))
            .map(|(name, _)| name.as_str())
    }
}

/// Validates a manifest for registration.
///
/// Checks run in order and the first failure wins:
/// name, version, dependencies, route claims.
pub fn validate(manifest: &ExtensionManifest, snapshot: &RegistrySnapshot) -> PluginResult<()> {
    check_name(manifest, snapshot)?;
    check_version(manifest)?;
    check_dependencies(manifest, snapshot)?;
    check_routes(manifest, snapshot)
}

/// Name must be non-blank and not held by a usable extension.
///
/// A record in `Error` may be replaced.
pub fn check_name(manifest: &ExtensionManifest, snapshot: &RegistrySnapshot) -> PluginResult<()> {
    if manifest.name.trim().is_empty() {
        return Err(PluginError::validation(
            &manifest.name,
            "name must not be empty",
        ));
    }

    match snapshot.get(&manifest.name) {
        Some(existing) if existing.is_usable() => Err(PluginError::AlreadyRegistered {
            name: manifest.name.clone(),
        }),
        _ => Ok(()),
    }
}

/// Version must be a strict semantic version.
pub fn check_version(manifest: &ExtensionManifest) -> PluginResult<()> {
    Version::parse(&manifest.version).map(|_| ()).map_err(|e| {
        PluginError::validation(
            &manifest.name,
            format!("version '{}' is not a semantic version: {e}", manifest.version),
        )
    })
}

/// Every dependency must be known, usable and satisfy its version range.
pub fn check_dependencies(
    manifest: &ExtensionManifest,
    snapshot: &RegistrySnapshot,
) -> PluginResult<()> {
    let name = &manifest.name;
    let mut seen = HashSet::new();

    for dep in &manifest.dependencies {
        if !seen.insert(dep.name.as_str()) {
            return Err(PluginError::validation(
                name,
                format!("dependency '{}' is declared more than once", dep.name),
            ));
        }
        if dep.name == *name {
            return Err(PluginError::validation(name, "an extension cannot depend on itself"));
        }

        let target = snapshot
            .get(&dep.name)
            .filter(|entry| entry.is_usable())
            .ok_or_else(|| PluginError::dependency(name, &dep.name, "not registered"))?;

        let range = VersionReq::parse(&dep.version_range).map_err(|e| {
            PluginError::dependency(
                name,
                &dep.name,
                format!("invalid version range '{}': {e}", dep.version_range),
            )
        })?;

        let found = Version::parse(&target.version).map_err(|_| {
            PluginError::dependency(
                name,
                &dep.name,
                format!("declares an invalid version '{}'", target.version),
            )
        })?;

        if !range.matches(&found) {
            return Err(PluginError::dependency(
                name,
                &dep.name,
                format!("requires {}, found {}", dep.version_range, target.version),
            ));
        }
    }

    Ok(())
}

/// No route may already be claimed by another usable extension.
pub fn check_routes(manifest: &ExtensionManifest, snapshot: &RegistrySnapshot) -> PluginResult<()> {
    for route in &manifest.routes {
        let claim = route.claim_key();
        if let Some(other) = snapshot.route_owner(&claim, &manifest.name) {
            return Err(PluginError::Conflict {
                name: manifest.name.clone(),
                other: other.to_string(),
                resource: format!("route {claim}"),
            });
        }
    }
    Ok(())
}
