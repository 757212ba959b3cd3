//! # quill-plugin
//!
//! Extension runtime for Quill. Provides:
//!
//! - Manifest validation and a registry with a lifecycle state machine
//! - Dependency graph with cycle detection and stable activation ordering
//! - Hook registry with `(priority, registration)` ordering
//! - Hook dispatcher that folds payloads with per-handler failure isolation
//! - Plugin manager running lifecycle callbacks under time bounds
//! - Activation context carrying host resources and the keep-alive facility

pub mod api;
pub mod error;
pub mod extension;
pub mod graph;
pub mod hooks;
pub mod macros;
pub mod manager;
pub mod prelude;
pub mod registry;
pub mod report;
pub mod status;
pub mod store;
pub mod traits;
pub mod validator;

mod guard;

pub use api::context::ActivationContext;
pub use api::deferred::{DeferredTaskScheduler, DetachedScheduler, TrackedScheduler};
pub use error::{PluginError, PluginResult};
pub use extension::{Extension, ExtensionBuilder, ExtensionManifest, HookBinding};
pub use hooks::definitions::{HookPayload, HookPoint};
pub use hooks::dispatcher::{BackgroundOutcome, DispatchOutcome, HookDispatcher};
pub use hooks::registry::HookRegistry;
pub use manager::PluginManager;
pub use registry::{ExtensionRecord, PluginRegistry};
pub use report::{InitializationReport, ReportEntry};
pub use status::ExtensionStatus;
pub use store::{ExtensionStore, JsonFileExtensionStore, MemoryExtensionStore, StoredExtension};
