//! Application state shared across all handlers.

use std::sync::Arc;

use uuid::Uuid;

use quill_core::config::AppConfig;
use quill_plugin::{ActivationContext, PluginManager};

/// Shared application state passed to all handlers via Axum's `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    // ── Configuration ──
    /// Application configuration.
    pub config: Arc<AppConfig>,

    // ── Extension runtime ──
    /// Lifecycle orchestrator; also owns the registries and the dispatcher.
    pub manager: Arc<PluginManager>,
    /// Host context every request-scoped context is derived from.
    pub context: ActivationContext,
}

impl AppState {
    /// Creates the state from its parts.
    pub fn new(config: Arc<AppConfig>, manager: Arc<PluginManager>, context: ActivationContext) -> Self {
        Self {
            config,
            manager,
            context,
        }
    }

    /// Context for one request, tagged with a fresh request ID.
    pub fn request_context(&self) -> ActivationContext {
        self.context.clone().with_request_id(Uuid::new_v4())
    }
}
