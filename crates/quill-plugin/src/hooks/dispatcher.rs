//! Hook dispatcher: runs a payload through every handler of a hook.
//!
//! `dispatch` folds the payload: each handler receives the output of the
//! previous one. A handler that fails, panics or times out is recorded and
//! skipped; the next handler receives the payload as it was before the
//! failure. Dispatch itself never fails.
//!
//! `dispatch_background` is for observers: every handler sees the original
//! payload and returned payloads are discarded. Work that must outlive the
//! call goes through `ActivationContext::keep_alive`.
//!
//! Handlers of one dispatch run sequentially, in the order of the snapshot
//! taken when the dispatch starts.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::definitions::HookPayload;
use super::registry::{HookEntry, HookRegistry};
use crate::api::context::ActivationContext;
use crate::error::PluginError;
use crate::guard::{GuardFailure, supervise};

/// Default bound for a single handler invocation.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of a transforming dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Payload as transformed by every handler that succeeded.
    pub payload: HookPayload,
    /// Handlers that failed, in execution order.
    pub failures: Vec<PluginError>,
    /// Number of handlers invoked.
    pub invoked: usize,
}

impl DispatchOutcome {
    /// Whether every handler succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Result of an observing dispatch.
#[derive(Debug, Clone, Default)]
pub struct BackgroundOutcome {
    /// Handlers that failed, in execution order.
    pub failures: Vec<PluginError>,
    /// Number of handlers invoked.
    pub invoked: usize,
}

/// Dispatches hooks to all registered handlers.
#[derive(Debug)]
pub struct HookDispatcher {
    /// Hook registry.
    registry: Arc<HookRegistry>,
    /// Per-handler time bound.
    timeout: Duration,
}

impl HookDispatcher {
    /// Creates a dispatcher with the default per-handler timeout.
    pub fn new(registry: Arc<HookRegistry>) -> Self {
        Self::with_timeout(registry, DEFAULT_HOOK_TIMEOUT)
    }

    /// Creates a dispatcher with a custom per-handler timeout.
    pub fn with_timeout(registry: Arc<HookRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// Folds `payload` through every handler of `payload.hook`.
    pub async fn dispatch(&self, payload: HookPayload, ctx: &ActivationContext) -> DispatchOutcome {
        let handlers = self.registry.handlers(&payload.hook).await;
        let mut outcome = DispatchOutcome {
            payload,
            failures: Vec::new(),
            invoked: handlers.len(),
        };

        if handlers.is_empty() {
            return outcome;
        }

        debug!(
            hook = %outcome.payload.hook,
            handler_count = handlers.len(),
            "Dispatching hook"
        );

        for entry in &handlers {
            let hook = outcome.payload.hook.clone();
            match self.invoke(entry, outcome.payload.clone(), ctx).await {
                Ok(mut next) => {
                    next.hook = hook;
                    outcome.payload = next;
                }
                Err(failure) => outcome.failures.push(failure),
            }
        }

        outcome
    }

    /// Runs every handler of `payload.hook` as an observer.
    ///
    /// Returns once all handlers have returned; work they scheduled through
    /// the keep-alive facility may still be running.
    pub async fn dispatch_background(
        &self,
        payload: HookPayload,
        ctx: &ActivationContext,
    ) -> BackgroundOutcome {
        let handlers = self.registry.handlers(&payload.hook).await;
        let mut outcome = BackgroundOutcome {
            failures: Vec::new(),
            invoked: handlers.len(),
        };

        if handlers.is_empty() {
            return outcome;
        }

        debug!(
            hook = %payload.hook,
            handler_count = handlers.len(),
            "Dispatching background hook"
        );

        for entry in &handlers {
            if let Err(failure) = self.invoke(entry, payload.clone(), ctx).await {
                outcome.failures.push(failure);
            }
        }

        outcome
    }

    /// Returns a reference to the hook registry.
    pub fn registry(&self) -> &Arc<HookRegistry> {
        &self.registry
    }

    /// Returns the per-handler time bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn invoke(
        &self,
        entry: &Arc<HookEntry>,
        payload: HookPayload,
        ctx: &ActivationContext,
    ) -> Result<HookPayload, PluginError> {
        let hook = payload.hook.clone();
        let handler = Arc::clone(&entry.handler);
        let ctx = ctx.clone();

        let result = supervise(self.timeout, async move {
            handler.handle(payload, &ctx).await
        })
        .await;

        match result {
            Ok(next) => {
                debug!(hook = %hook, extension = %entry.owner, "Handler completed");
                Ok(next)
            }
            Err(GuardFailure::TimedOut) => {
                error!(
                    hook = %hook,
                    extension = %entry.owner,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Hook handler timed out"
                );
                Err(PluginError::Timeout {
                    owner: entry.owner.clone(),
                    operation: format!("hook {hook}"),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Err(failure) => {
                let cause = failure.cause();
                warn!(
                    hook = %hook,
                    extension = %entry.owner,
                    error = %cause,
                    "Hook handler failed, continuing with previous payload"
                );
                Err(PluginError::HookExecution {
                    hook: hook.to_string(),
                    owner: entry.owner.clone(),
                    cause,
                })
            }
        }
    }
}
