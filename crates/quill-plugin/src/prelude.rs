//! Prelude for convenient imports.

pub use async_trait::async_trait;
pub use serde_json::{Value, json};

pub use crate::api::context::ActivationContext;
pub use crate::api::deferred::{DeferredTaskScheduler, DetachedScheduler, TrackedScheduler};
pub use crate::api::events::HookSubscription;
pub use crate::error::{PluginError, PluginResult};
pub use crate::extension::{
    DependencySpec, Extension, ExtensionBuilder, ExtensionManifest, HookBinding, RouteDeclaration,
};
pub use crate::hooks::definitions::{HookPayload, HookPoint};
pub use crate::hooks::registry::HookHandler;
pub use crate::status::ExtensionStatus;
pub use crate::traits::FnHandler;

pub use crate::hook_payload;
