//! Extension-facing API: the activation context and keep-alive facility.

pub mod context;
pub mod deferred;
pub mod events;

pub use context::ActivationContext;
pub use deferred::{DeferredTaskScheduler, DetachedScheduler, TrackedScheduler};
pub use events::HookSubscription;
