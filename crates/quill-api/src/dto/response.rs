//! Response DTOs.
//!
//! Runtime types carry typed errors that are not serializable; these
//! views flatten them into `{code, message}` pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use quill_plugin::api::events::HookSubscription;
use quill_plugin::extension::{DependencySpec, RouteDeclaration};
use quill_plugin::{
    BackgroundOutcome, DispatchOutcome, ExtensionRecord, ExtensionStatus, InitializationReport,
    PluginError, ReportEntry,
};

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Liveness check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" when the process answers.
    pub status: String,
    /// Server version.
    pub version: String,
    /// Extensions currently active.
    pub active_extensions: usize,
}

/// A runtime error as exposed over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Stable error code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&PluginError> for ErrorDetail {
    fn from(err: &PluginError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

/// One extension as listed by the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub status: ExtensionStatus,
    pub settings: Value,
    pub hooks: Vec<HookSubscription>,
    pub dependencies: Vec<DependencySpec>,
    pub routes: Vec<RouteDeclaration>,
    pub menu_items: Vec<Value>,
    pub admin_pages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorDetail>,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ExtensionRecord> for ExtensionResponse {
    fn from(record: ExtensionRecord) -> Self {
        let last_error = record.last_error.as_ref().map(ErrorDetail::from);
        let manifest = record.manifest;
        Self {
            name: manifest.name,
            version: manifest.version,
            description: manifest.description,
            status: record.status,
            settings: record.settings,
            hooks: record.hooks,
            dependencies: manifest.dependencies,
            routes: manifest.routes,
            menu_items: manifest.menu_items,
            admin_pages: manifest.admin_pages,
            last_error,
            registered_at: record.registered_at,
            updated_at: record.updated_at,
        }
    }
}

/// One line of the start-up report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntryResponse {
    pub name: String,
    pub status: ExtensionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl From<&ReportEntry> for ReportEntryResponse {
    fn from(entry: &ReportEntry) -> Self {
        Self {
            name: entry.name.clone(),
            status: entry.status,
            error: entry.error.as_ref().map(ErrorDetail::from),
        }
    }
}

/// Start-up report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportResponse {
    pub entries: Vec<ReportEntryResponse>,
    pub active: Vec<String>,
    pub failed: Vec<String>,
    pub duration_ms: u64,
}

impl From<&InitializationReport> for ReportResponse {
    fn from(report: &InitializationReport) -> Self {
        Self {
            entries: report.entries.iter().map(ReportEntryResponse::from).collect(),
            active: report.active().into_iter().map(str::to_string).collect(),
            failed: report.failed().into_iter().map(|e| e.name.clone()).collect(),
            duration_ms: report.duration_ms,
        }
    }
}

/// A handler attached to a hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandlerInfo {
    /// Owning extension.
    pub owner: String,
    /// Priority (lower = earlier).
    pub priority: i32,
}

/// A hook and its handlers in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HookInfo {
    pub hook: String,
    pub handlers: Vec<HandlerInfo>,
}

/// Result of firing a hook from the admin API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResponse {
    /// Transformed payload data; absent for observing dispatches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Handlers that failed.
    pub failures: Vec<ErrorDetail>,
    /// Number of handlers invoked.
    pub invoked: usize,
}

impl From<DispatchOutcome> for DispatchResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        Self {
            failures: outcome.failures.iter().map(ErrorDetail::from).collect(),
            payload: Some(outcome.payload.data),
            invoked: outcome.invoked,
        }
    }
}

impl From<BackgroundOutcome> for DispatchResponse {
    fn from(outcome: BackgroundOutcome) -> Self {
        Self {
            payload: None,
            failures: outcome.failures.iter().map(ErrorDetail::from).collect(),
            invoked: outcome.invoked,
        }
    }
}
