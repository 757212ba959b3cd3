//! Start-up report produced by `PluginManager::initialize`.

use crate::error::PluginError;
use crate::status::ExtensionStatus;

/// Outcome for one extension.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    /// Extension name.
    pub name: String,
    /// Status reached.
    pub status: ExtensionStatus,
    /// Failure encountered, if any.
    pub error: Option<PluginError>,
}

/// Per-extension outcome of a start-up run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitializationReport {
    /// Entries in processing order.
    pub entries: Vec<ReportEntry>,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl InitializationReport {
    /// Looks up the entry for an extension.
    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Names of extensions that reached `Active`.
    pub fn active(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.status == ExtensionStatus::Active)
            .map(|e| e.name.as_str())
            .collect()
    }

    /// Entries that ended in `Error`.
    pub fn failed(&self) -> Vec<&ReportEntry> {
        self.entries
            .iter()
            .filter(|e| e.status == ExtensionStatus::Error)
            .collect()
    }

    /// Whether no extension failed.
    pub fn is_clean(&self) -> bool {
        self.failed().is_empty()
    }
}
