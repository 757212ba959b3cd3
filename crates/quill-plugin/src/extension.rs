//! The extension contract: manifest, lifecycle callbacks and declared hooks.
//!
//! An extension is a fixed interface with optional slots. Callbacks that an
//! extension does not provide are no-ops.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::context::ActivationContext;
use crate::api::events::HookSubscription;
use crate::hooks::definitions::HookPoint;
use crate::hooks::registry::HookHandler;

/// A dependency declared by an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencySpec {
    /// Name of the required extension.
    pub name: String,
    /// Semantic version requirement, e.g. `^1.2`.
    pub version_range: String,
}

impl DependencySpec {
    /// Creates a dependency declaration.
    pub fn new(name: impl Into<String>, version_range: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version_range: version_range.into(),
        }
    }
}

/// An HTTP route an extension claims. Everything but method and path is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDeclaration {
    /// HTTP method, compared case-insensitively.
    pub method: String,
    /// Route path.
    pub path: String,
    /// Fields passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RouteDeclaration {
    /// Creates a route declaration.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            extra: Map::new(),
        }
    }

    /// Normalized `METHOD path` key used for conflict detection.
    pub fn claim_key(&self) -> String {
        format!("{} {}", self.method.to_ascii_uppercase(), self.path)
    }
}

/// Declared metadata of an extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionManifest {
    /// Unique extension name.
    pub name: String,
    /// Semantic version string.
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Extensions this one requires.
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    /// Routes the extension serves.
    #[serde(default)]
    pub routes: Vec<RouteDeclaration>,
    /// Admin menu entries.
    #[serde(default)]
    pub menu_items: Vec<Value>,
    /// Admin pages.
    #[serde(default)]
    pub admin_pages: Vec<Value>,
    /// Settings used when nothing is persisted yet.
    #[serde(default = "empty_object")]
    pub default_settings: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl ExtensionManifest {
    /// Creates a manifest with just a name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            dependencies: Vec::new(),
            routes: Vec::new(),
            menu_items: Vec::new(),
            admin_pages: Vec::new(),
            default_settings: empty_object(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, name: impl Into<String>, version_range: impl Into<String>) -> Self {
        self.dependencies.push(DependencySpec::new(name, version_range));
        self
    }

    /// Adds a route claim.
    pub fn with_route(mut self, method: impl Into<String>, path: impl Into<String>) -> Self {
        self.routes.push(RouteDeclaration::new(method, path));
        self
    }

    /// Sets the default settings.
    pub fn with_default_settings(mut self, settings: Value) -> Self {
        self.default_settings = settings;
        self
    }
}

/// A hook registration declared by an extension, attached on activation.
#[derive(Debug, Clone)]
pub struct HookBinding {
    /// Hook point to attach to.
    pub hook: HookPoint,
    /// Priority (lower = earlier).
    pub priority: i32,
    /// The handler.
    pub handler: Arc<dyn HookHandler>,
}

impl HookBinding {
    /// Creates a hook binding.
    pub fn new(hook: impl Into<HookPoint>, priority: i32, handler: Arc<dyn HookHandler>) -> Self {
        Self {
            hook: hook.into(),
            priority,
            handler,
        }
    }

    /// Summary without the handler.
    pub fn subscription(&self) -> HookSubscription {
        HookSubscription::new(self.hook.clone(), self.priority)
    }
}

/// Trait every extension implements.
#[async_trait]
pub trait Extension: Send + Sync + std::fmt::Debug {
    /// Returns the extension's manifest.
    fn manifest(&self) -> ExtensionManifest;

    /// Hooks to attach when the extension activates.
    fn hooks(&self) -> Vec<HookBinding> {
        Vec::new()
    }

    /// Called once before the first activation.
    async fn install(&self, _ctx: &ActivationContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the extension is removed.
    async fn uninstall(&self, _ctx: &ActivationContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the extension is enabled.
    async fn activate(&self, _ctx: &ActivationContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the extension is disabled.
    async fn deactivate(&self, _ctx: &ActivationContext) -> anyhow::Result<()> {
        Ok(())
    }
}

type LifecycleFn =
    Arc<dyn Fn(ActivationContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

fn lifecycle<F, Fut>(callback: F) -> LifecycleFn
where
    F: Fn(ActivationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(callback(ctx)))
}

#[derive(Default, Clone)]
struct LifecycleSlots {
    install: Option<LifecycleFn>,
    uninstall: Option<LifecycleFn>,
    activate: Option<LifecycleFn>,
    deactivate: Option<LifecycleFn>,
}

impl LifecycleSlots {
    async fn run(slot: &Option<LifecycleFn>, ctx: &ActivationContext) -> anyhow::Result<()> {
        match slot {
            Some(callback) => callback(ctx.clone()).await,
            None => Ok(()),
        }
    }
}

/// An extension assembled from closures by [`ExtensionBuilder`].
#[derive(Clone)]
pub struct BuiltExtension {
    manifest: ExtensionManifest,
    hooks: Vec<HookBinding>,
    slots: LifecycleSlots,
}

impl std::fmt::Debug for BuiltExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltExtension")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

#[async_trait]
impl Extension for BuiltExtension {
    fn manifest(&self) -> ExtensionManifest {
        self.manifest.clone()
    }

    fn hooks(&self) -> Vec<HookBinding> {
        self.hooks.clone()
    }

    async fn install(&self, ctx: &ActivationContext) -> anyhow::Result<()> {
        LifecycleSlots::run(&self.slots.install, ctx).await
    }

    async fn uninstall(&self, ctx: &ActivationContext) -> anyhow::Result<()> {
        LifecycleSlots::run(&self.slots.uninstall, ctx).await
    }

    async fn activate(&self, ctx: &ActivationContext) -> anyhow::Result<()> {
        LifecycleSlots::run(&self.slots.activate, ctx).await
    }

    async fn deactivate(&self, ctx: &ActivationContext) -> anyhow::Result<()> {
        LifecycleSlots::run(&self.slots.deactivate, ctx).await
    }
}

/// Builder for assembling an extension from a manifest and closures.
#[derive(Debug)]
pub struct ExtensionBuilder {
    extension: BuiltExtension,
}

impl ExtensionBuilder {
    /// Starts a builder from a manifest.
    pub fn new(manifest: ExtensionManifest) -> Self {
        Self {
            extension: BuiltExtension {
                manifest,
                hooks: Vec::new(),
                slots: LifecycleSlots::default(),
            },
        }
    }

    /// Declares a hook handler.
    pub fn on(
        mut self,
        hook: impl Into<HookPoint>,
        priority: i32,
        handler: Arc<dyn HookHandler>,
    ) -> Self {
        self.extension
            .hooks
            .push(HookBinding::new(hook, priority, handler));
        self
    }

    /// Sets the install callback.
    pub fn on_install<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ActivationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.extension.slots.install = Some(lifecycle(callback));
        self
    }

    /// Sets the uninstall callback.
    pub fn on_uninstall<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ActivationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.extension.slots.uninstall = Some(lifecycle(callback));
        self
    }

    /// Sets the activate callback.
    pub fn on_activate<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ActivationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.extension.slots.activate = Some(lifecycle(callback));
        self
    }

    /// Sets the deactivate callback.
    pub fn on_deactivate<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(ActivationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.extension.slots.deactivate = Some(lifecycle(callback));
        self
    }

    /// Builds the extension.
    pub fn build(self) -> Arc<dyn Extension> {
        Arc::new(self.extension)
    }
}
