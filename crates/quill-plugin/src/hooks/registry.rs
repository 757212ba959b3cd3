//! Hook registry: extensions attach handlers by hook point with priority ordering.
//!
//! Within one hook, handlers are ordered by `(priority, sequence)`: lower
//! priority first, and registration order among equal priorities. The
//! sequence number is assigned here, so the order is deterministic for a
//! given registration sequence.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::definitions::{HookPayload, HookPoint};
use crate::api::context::ActivationContext;

/// Trait for hook handler implementations.
#[async_trait]
pub trait HookHandler: Send + Sync + std::fmt::Debug {
    /// Handles a hook invocation and returns the (possibly unchanged) payload.
    async fn handle(
        &self,
        payload: HookPayload,
        ctx: &ActivationContext,
    ) -> anyhow::Result<HookPayload>;
}

/// A handler as stored in the registry.
#[derive(Debug, Clone)]
pub struct HookEntry {
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
    /// Priority (lower = earlier execution).
    pub priority: i32,
    /// Extension that registered this handler.
    pub owner: String,
    /// Registration sequence, used as the tie-break.
    pub sequence: u64,
}

#[derive(Debug, Default)]
struct HookTable {
    /// Hook point → handlers sorted by `(priority, sequence)`.
    by_hook: HashMap<HookPoint, Vec<Arc<HookEntry>>>,
    /// Next registration sequence number.
    next_sequence: u64,
}

/// Registry of hook handlers organized by hook point.
#[derive(Debug, Default)]
pub struct HookRegistry {
    table: RwLock<HookTable>,
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a hook point and returns its sequence number.
    pub async fn register(
        &self,
        hook: HookPoint,
        owner: &str,
        priority: i32,
        handler: Arc<dyn HookHandler>,
    ) -> u64 {
        let mut table = self.table.write().await;
        let sequence = table.next_sequence;
        table.next_sequence += 1;

        let entries = table.by_hook.entry(hook.clone()).or_default();
        entries.push(Arc::new(HookEntry {
            handler,
            priority,
            owner: owner.to_string(),
            sequence,
        }));
        entries.sort_by_key(|e| (e.priority, e.sequence));

        debug!(
            hook = %hook,
            extension = %owner,
            priority,
            sequence,
            "Hook handler registered"
        );

        sequence
    }

    /// Removes every handler owned by `owner` and returns how many were removed.
    ///
    /// Remaining handlers keep their relative order.
    pub async fn unregister_all(&self, owner: &str) -> usize {
        let mut table = self.table.write().await;
        let mut removed = 0;

        for entries in table.by_hook.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.owner != owner);
            removed += before - entries.len();
        }

        table.by_hook.retain(|_, entries| !entries.is_empty());

        if removed > 0 {
            info!(extension = %owner, removed, "Hook handlers unregistered");
        }

        removed
    }

    /// Snapshot of the handlers for a hook point, in execution order.
    ///
    /// Later registrations do not affect a snapshot already taken.
    pub async fn handlers(&self, hook: &HookPoint) -> Vec<Arc<HookEntry>> {
        let table = self.table.read().await;
        table.by_hook.get(hook).cloned().unwrap_or_default()
    }

    /// Returns whether any handlers are registered for a hook point.
    pub async fn has_handlers(&self, hook: &HookPoint) -> bool {
        self.handler_count(hook).await > 0
    }

    /// Returns the number of handlers registered for a hook point.
    pub async fn handler_count(&self, hook: &HookPoint) -> usize {
        let table = self.table.read().await;
        table.by_hook.get(hook).map(Vec::len).unwrap_or(0)
    }

    /// Returns all hook points with at least one handler, sorted by name.
    pub async fn registered_hooks(&self) -> Vec<HookPoint> {
        let table = self.table.read().await;
        let mut hooks: Vec<HookPoint> = table.by_hook.keys().cloned().collect();
        hooks.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        hooks
    }

    /// Returns the hook points `owner` currently has handlers on.
    pub async fn hooks_for(&self, owner: &str) -> Vec<HookPoint> {
        let table = self.table.read().await;
        let mut hooks: Vec<HookPoint> = table
            .by_hook
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.owner == owner))
            .map(|(hook, _)| hook.clone())
            .collect();
        hooks.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        hooks
    }
}
