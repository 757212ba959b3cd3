//! Plugin manager: start-up orchestration and lifecycle operations.
//!
//! Every extension-supplied callback runs under the configured callback
//! timeout. A failure or timeout moves that one extension to `Error` and is
//! returned to the caller of that one operation; other extensions are not
//! touched.
//!
//! An operation locks its extension together with every extension whose
//! status it checks: dependencies for activation, dependents for
//! deactivation. Locks are always taken in name order. Operations on
//! unrelated extensions run concurrently.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use quill_core::config::PluginConfig;

use crate::api::context::ActivationContext;
use crate::error::{PluginError, PluginResult};
use crate::extension::Extension;
use crate::guard::{GuardFailure, supervise};
use crate::hooks::definitions::{HookPayload, HookPoint};
use crate::hooks::dispatcher::HookDispatcher;
use crate::hooks::registry::HookRegistry;
use crate::registry::{ExtensionRecord, PluginRegistry};
use crate::report::{InitializationReport, ReportEntry};
use crate::status::ExtensionStatus;
use crate::store::StoredExtension;

#[derive(Debug, Clone, Copy)]
enum Callback {
    Install,
    Uninstall,
    Activate,
    Deactivate,
}

impl Callback {
    fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }
}

/// Manages the full lifecycle of extensions.
#[derive(Debug)]
pub struct PluginManager {
    /// Plugin registry.
    plugin_registry: Arc<PluginRegistry>,
    /// Hook registry.
    hook_registry: Arc<HookRegistry>,
    /// Hook dispatcher.
    hook_dispatcher: Arc<HookDispatcher>,
    /// Timeouts and start-up policy.
    config: PluginConfig,
    /// Per-extension operation locks.
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Extensions in the order they became active.
    activation_order: Mutex<Vec<String>>,
    /// Report of the last `initialize` run.
    last_report: RwLock<Option<InitializationReport>>,
}

impl PluginManager {
    /// Creates a manager over an existing registry.
    pub fn new(plugin_registry: Arc<PluginRegistry>, config: PluginConfig) -> Self {
        let hook_registry = Arc::new(HookRegistry::new());
        let hook_dispatcher = Arc::new(HookDispatcher::with_timeout(
            hook_registry.clone(),
            config.hook_timeout(),
        ));

        Self {
            plugin_registry,
            hook_registry,
            hook_dispatcher,
            config,
            locks: DashMap::new(),
            activation_order: Mutex::new(Vec::new()),
            last_report: RwLock::new(None),
        }
    }

    /// Starts every registered extension in dependency order.
    ///
    /// Only a dependency cycle fails the whole run. Any other failure is
    /// confined to its extension and listed in the report.
    pub async fn initialize(&self, ctx: &ActivationContext) -> PluginResult<InitializationReport> {
        let started = Instant::now();

        let order = self
            .plugin_registry
            .resolve_activation_order()
            .await
            .map_err(|e| {
                error!(error = %e, "Extension dependency graph cannot be ordered");
                PluginError::SystemInitialization(Box::new(e))
            })?;

        info!(extensions = order.len(), "Initializing extensions");

        let mut entries: Vec<ReportEntry> = self
            .plugin_registry
            .list(Some(ExtensionStatus::Error))
            .await
            .into_iter()
            .map(|record| ReportEntry {
                name: record.manifest.name,
                status: ExtensionStatus::Error,
                error: record.last_error,
            })
            .collect();

        for name in &order {
            let _guards = self.lock_related(name, true, false).await;

            let entry = match self.start(name, ctx).await {
                Ok(status) => ReportEntry {
                    name: name.clone(),
                    status,
                    error: None,
                },
                Err(err) => ReportEntry {
                    name: name.clone(),
                    status: self
                        .plugin_registry
                        .status(name)
                        .await
                        .unwrap_or(ExtensionStatus::Error),
                    error: Some(err),
                },
            };
            entries.push(entry);
        }

        let report = InitializationReport {
            entries,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            total = report.entries.len(),
            active = report.active().len(),
            failed = report.failed().len(),
            duration_ms = report.duration_ms,
            "Extension initialization complete"
        );

        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    async fn start(&self, name: &str, ctx: &ActivationContext) -> PluginResult<ExtensionStatus> {
        let persisted = match self.plugin_registry.persisted(name).await {
            Ok(persisted) => persisted,
            Err(e) => return self.fail(name, e).await,
        };
        // A record holding only settings carries no status.
        let stored_status = persisted.as_ref().and_then(|r| r.status);
        let wants_active = stored_status
            .map(|status| status == ExtensionStatus::Active)
            .unwrap_or(self.config.auto_activate);
        let installed_before = persisted
            .as_ref()
            .is_some_and(StoredExtension::is_installed);

        self.plugin_registry.validate(name).await?;

        if !wants_active {
            if installed_before {
                let durable = match stored_status {
                    Some(ExtensionStatus::Inactive) => ExtensionStatus::Inactive,
                    _ => ExtensionStatus::Installed,
                };
                self.plugin_registry.reconcile_status(name, durable).await?;
                debug!(extension = %name, status = %durable, "Extension installed but not enabled");
                return Ok(durable);
            }
            debug!(extension = %name, "Extension not enabled");
            return Ok(ExtensionStatus::Validated);
        }

        let extension = self.instance(name).await?;

        if let Err(e) = self.ensure_dependencies_active(name).await {
            return self.fail(name, e).await;
        }

        if installed_before {
            self.plugin_registry
                .reconcile_status(name, ExtensionStatus::Installed)
                .await?;
        } else {
            self.install(name, &extension, ctx).await?;
        }

        self.enable(name, &extension, ctx).await?;
        Ok(ExtensionStatus::Active)
    }

    /// Activates an extension that is `Validated`, `Installed` or `Inactive`.
    ///
    /// Every dependency must already be active.
    pub async fn activate(&self, name: &str, ctx: &ActivationContext) -> PluginResult<ExtensionRecord> {
        let _guards = self.lock_related(name, true, false).await;
        self.activate_locked(name, ctx).await
    }

    async fn activate_locked(
        &self,
        name: &str,
        ctx: &ActivationContext,
    ) -> PluginResult<ExtensionRecord> {
        let current = self
            .plugin_registry
            .status(name)
            .await
            .ok_or_else(|| PluginError::not_found(name))?;
        let extension = self.instance(name).await?;

        match current {
            ExtensionStatus::Validated => {
                self.ensure_dependencies_active(name).await?;
                self.install(name, &extension, ctx).await?;
            }
            ExtensionStatus::Installed | ExtensionStatus::Inactive => {
                self.ensure_dependencies_active(name).await?;
            }
            current => {
                return Err(PluginError::InvalidState {
                    name: name.to_string(),
                    current,
                    requested: ExtensionStatus::Active,
                });
            }
        }

        self.enable(name, &extension, ctx).await
    }

    /// Deactivates an active extension.
    ///
    /// Refused while an active extension depends on it.
    pub async fn deactivate(&self, name: &str, ctx: &ActivationContext) -> PluginResult<ExtensionRecord> {
        let _guards = self.lock_related(name, false, true).await;
        self.deactivate_locked(name, ctx).await
    }

    async fn deactivate_locked(
        &self,
        name: &str,
        ctx: &ActivationContext,
    ) -> PluginResult<ExtensionRecord> {
        let current = self
            .plugin_registry
            .status(name)
            .await
            .ok_or_else(|| PluginError::not_found(name))?;
        if current != ExtensionStatus::Active {
            return Err(PluginError::InvalidState {
                name: name.to_string(),
                current,
                requested: ExtensionStatus::Inactive,
            });
        }

        for dependent in self.plugin_registry.dependents_of(name).await {
            if self.plugin_registry.status(&dependent).await == Some(ExtensionStatus::Active) {
                return Err(PluginError::dependency(
                    &dependent,
                    name,
                    format!("'{name}' cannot be deactivated while '{dependent}' is active"),
                ));
            }
        }

        self.disable(name, ctx, true).await
    }

    /// Deactivates then re-activates an extension.
    pub async fn reload(&self, name: &str, ctx: &ActivationContext) -> PluginResult<ExtensionRecord> {
        let _guards = self.lock_related(name, true, true).await;

        info!(extension = %name, "Reloading extension");
        self.deactivate_locked(name, ctx).await?;
        self.activate_locked(name, ctx).await
    }

    /// Uninstalls an inactive extension and removes it from the registry.
    pub async fn uninstall(&self, name: &str, ctx: &ActivationContext) -> PluginResult<ExtensionRecord> {
        let guards = self.lock_related(name, false, true).await;

        let current = self
            .plugin_registry
            .status(name)
            .await
            .ok_or_else(|| PluginError::not_found(name))?;
        if current != ExtensionStatus::Inactive {
            return Err(PluginError::InvalidState {
                name: name.to_string(),
                current,
                requested: ExtensionStatus::Uninstalled,
            });
        }

        let extension = self.instance(name).await?;
        if let Err(e) = self.run_callback(name, &extension, Callback::Uninstall, ctx).await {
            return self.fail(name, e).await;
        }
        if let Err(e) = self
            .plugin_registry
            .update_status(name, ExtensionStatus::Uninstalled)
            .await
        {
            return self.fail(name, e).await;
        }

        let removed = self.plugin_registry.remove(name).await?;
        drop(guards);
        self.locks.remove(name);

        info!(extension = %name, "Extension uninstalled");
        Ok(removed)
    }

    /// Stops every active extension, dependents first.
    ///
    /// Statuses are changed in memory only, so the next start-up brings
    /// the same extensions back. Failures are logged, not returned.
    pub async fn shutdown(&self, ctx: &ActivationContext) {
        let order: Vec<String> = self
            .activation_order
            .lock()
            .await
            .iter()
            .rev()
            .cloned()
            .collect();

        info!(extensions = order.len(), "Stopping extensions");

        for name in order {
            let lock = self.lock_for(&name);
            let _guard = lock.lock().await;

            if self.plugin_registry.status(&name).await != Some(ExtensionStatus::Active) {
                continue;
            }
            if let Err(e) = self.disable(&name, ctx, false).await {
                warn!(extension = %name, error = %e, "Extension failed to stop cleanly");
            }
        }

        info!("All extensions stopped");
    }

    async fn install(
        &self,
        name: &str,
        extension: &Arc<dyn Extension>,
        ctx: &ActivationContext,
    ) -> PluginResult<()> {
        if let Err(e) = self.run_callback(name, extension, Callback::Install, ctx).await {
            return self.fail(name, e).await;
        }
        if let Err(e) = self
            .plugin_registry
            .update_status(name, ExtensionStatus::Installed)
            .await
        {
            return self.fail(name, e).await;
        }
        info!(extension = %name, "Extension installed");
        Ok(())
    }

    async fn enable(
        &self,
        name: &str,
        extension: &Arc<dyn Extension>,
        ctx: &ActivationContext,
    ) -> PluginResult<ExtensionRecord> {
        if let Err(e) = self.run_callback(name, extension, Callback::Activate, ctx).await {
            return self.fail(name, e).await;
        }

        let record = match self
            .plugin_registry
            .update_status(name, ExtensionStatus::Active)
            .await
        {
            Ok(record) => record,
            Err(e) => return self.fail(name, e).await,
        };

        let bindings = extension.hooks();
        let hook_count = bindings.len();
        for binding in bindings {
            self.hook_registry
                .register(binding.hook, name, binding.priority, binding.handler)
                .await;
        }
        self.activation_order.lock().await.push(name.to_string());

        info!(
            extension = %name,
            version = %record.manifest.version,
            hooks = hook_count,
            "Extension activated"
        );

        self.announce(HookPoint::ExtensionActivated, name, ctx).await;
        Ok(record)
    }

    async fn disable(
        &self,
        name: &str,
        ctx: &ActivationContext,
        persist: bool,
    ) -> PluginResult<ExtensionRecord> {
        let extension = self.instance(name).await?;

        let removed = self.hook_registry.unregister_all(name).await;
        self.activation_order.lock().await.retain(|n| n != name);

        if let Err(e) = self
            .run_callback(name, &extension, Callback::Deactivate, ctx)
            .await
        {
            return self.fail(name, e).await;
        }

        let transition = if persist {
            self.plugin_registry
                .update_status(name, ExtensionStatus::Inactive)
                .await
        } else {
            self.plugin_registry
                .restore_status(name, ExtensionStatus::Inactive)
                .await
        };
        let record = match transition {
            Ok(record) => record,
            Err(e) => return self.fail(name, e).await,
        };

        info!(extension = %name, hooks_removed = removed, "Extension deactivated");
        self.announce(HookPoint::ExtensionDeactivated, name, ctx).await;
        Ok(record)
    }

    async fn ensure_dependencies_active(&self, name: &str) -> PluginResult<()> {
        let record = self
            .plugin_registry
            .get(name)
            .await
            .ok_or_else(|| PluginError::not_found(name))?;

        for dep in &record.manifest.dependencies {
            match self.plugin_registry.status(&dep.name).await {
                Some(ExtensionStatus::Active) => {}
                Some(status) => {
                    return Err(PluginError::dependency(
                        name,
                        &dep.name,
                        format!("is {status}, not active"),
                    ));
                }
                None => {
                    return Err(PluginError::dependency(name, &dep.name, "not registered"));
                }
            }
        }
        Ok(())
    }

    async fn run_callback(
        &self,
        name: &str,
        extension: &Arc<dyn Extension>,
        callback: Callback,
        ctx: &ActivationContext,
    ) -> PluginResult<()> {
        let extension = Arc::clone(extension);
        let ctx = ctx.clone();
        let limit = self.config.callback_timeout();

        debug!(extension = %name, callback = callback.as_str(), "Running lifecycle callback");

        let result = supervise(limit, async move {
            match callback {
                Callback::Install => extension.install(&ctx).await,
                Callback::Uninstall => extension.uninstall(&ctx).await,
                Callback::Activate => extension.activate(&ctx).await,
                Callback::Deactivate => extension.deactivate(&ctx).await,
            }
        })
        .await;

        result.map_err(|failure| match failure {
            GuardFailure::TimedOut => {
                error!(
                    extension = %name,
                    callback = callback.as_str(),
                    timeout_ms = limit.as_millis() as u64,
                    "Lifecycle callback timed out"
                );
                PluginError::Timeout {
                    owner: name.to_string(),
                    operation: callback.as_str().to_string(),
                    timeout_ms: limit.as_millis() as u64,
                }
            }
            failure => PluginError::Callback {
                name: name.to_string(),
                callback: callback.as_str().to_string(),
                cause: failure.cause(),
            },
        })
    }

    async fn announce(&self, hook: HookPoint, name: &str, ctx: &ActivationContext) {
        let payload = HookPayload::new(hook).with_string("extension", name);
        let outcome = self.hook_dispatcher.dispatch_background(payload, ctx).await;
        for failure in &outcome.failures {
            warn!(extension = %name, error = %failure, "Lifecycle announcement handler failed");
        }
    }

    async fn fail<T>(&self, name: &str, err: PluginError) -> PluginResult<T> {
        self.hook_registry.unregister_all(name).await;
        if let Err(e) = self.plugin_registry.mark_error(name, err.clone()).await {
            warn!(extension = %name, error = %e, "Could not record extension failure");
        }
        Err(err)
    }

    async fn instance(&self, name: &str) -> PluginResult<Arc<dyn Extension>> {
        self.plugin_registry
            .instance(name)
            .await
            .ok_or_else(|| PluginError::not_found(name))
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks.entry(name.to_string()).or_default().clone()
    }

    /// Locks `name` plus its dependencies and/or dependents, in name order
    /// so that overlapping operations cannot deadlock.
    async fn lock_related(
        &self,
        name: &str,
        dependencies: bool,
        dependents: bool,
    ) -> Vec<OwnedMutexGuard<()>> {
        let mut names = BTreeSet::from([name.to_string()]);
        if dependencies {
            if let Some(record) = self.plugin_registry.get(name).await {
                names.extend(record.dependency_names());
            }
        }
        if dependents {
            names.extend(self.plugin_registry.dependents_of(name).await);
        }

        let mut guards = Vec::with_capacity(names.len());
        for related in names {
            guards.push(self.lock_for(&related).lock_owned().await);
        }
        guards
    }

    /// Report of the last `initialize` run.
    pub async fn last_report(&self) -> Option<InitializationReport> {
        self.last_report.read().await.clone()
    }

    /// Names of active extensions in activation order.
    pub async fn active_extensions(&self) -> Vec<String> {
        self.activation_order.lock().await.clone()
    }

    /// Returns the hook dispatcher for firing hooks.
    pub fn dispatcher(&self) -> &Arc<HookDispatcher> {
        &self.hook_dispatcher
    }

    /// Returns the hook registry.
    pub fn hook_registry(&self) -> &Arc<HookRegistry> {
        &self.hook_registry
    }

    /// Returns the plugin registry.
    pub fn plugin_registry(&self) -> &Arc<PluginRegistry> {
        &self.plugin_registry
    }

    /// Returns the runtime configuration.
    pub fn config(&self) -> &PluginConfig {
        &self.config
    }
}
