//! Activation context: host resources handed to every extension callback.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use super::deferred::{DeferredTaskScheduler, DetachedScheduler};

type ResourceMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Context passed to lifecycle callbacks and hook handlers.
///
/// The runtime never looks inside: it clones the context and passes it
/// through. Hosts attach whatever their extensions need (a data-access
/// handle, a mailer, ...) as typed resources, and the keep-alive facility
/// as the deferred-task scheduler.
#[derive(Clone)]
pub struct ActivationContext {
    /// Keep-alive facility for work outliving the current unit of work.
    scheduler: Arc<dyn DeferredTaskScheduler>,
    /// Host resources keyed by type.
    resources: Arc<ResourceMap>,
    /// Request that triggered the current unit of work.
    request_id: Option<Uuid>,
    /// User that triggered the current unit of work.
    actor_id: Option<Uuid>,
}

impl std::fmt::Debug for ActivationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationContext")
            .field("scheduler", &self.scheduler)
            .field("resources", &self.resources.len())
            .field("request_id", &self.request_id)
            .field("actor_id", &self.actor_id)
            .finish()
    }
}

impl ActivationContext {
    /// Creates a context around the host's keep-alive facility.
    pub fn new(scheduler: Arc<dyn DeferredTaskScheduler>) -> Self {
        Self {
            scheduler,
            resources: Arc::new(HashMap::new()),
            request_id: None,
            actor_id: None,
        }
    }

    /// Creates a context for hosts without a keep-alive facility.
    pub fn detached() -> Self {
        Self::new(Arc::new(DetachedScheduler))
    }

    /// Attaches a host resource, replacing any previous one of the same type.
    pub fn with_resource<T: Any + Send + Sync>(mut self, resource: Arc<T>) -> Self {
        Arc::make_mut(&mut self.resources).insert(TypeId::of::<T>(), resource);
        self
    }

    /// Looks up a host resource by type.
    pub fn resource<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.resources
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|resource| resource.downcast::<T>().ok())
    }

    /// Derives a request-scoped context.
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Sets the acting user.
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Request ID, if this is a request-scoped context.
    pub fn request_id(&self) -> Option<Uuid> {
        self.request_id
    }

    /// Acting user, if known.
    pub fn actor_id(&self) -> Option<Uuid> {
        self.actor_id
    }

    /// The keep-alive facility.
    pub fn scheduler(&self) -> &Arc<dyn DeferredTaskScheduler> {
        &self.scheduler
    }

    /// Runs `task` past the end of the current unit of work.
    ///
    /// With a lifetime-extending scheduler the host waits for the task
    /// before terminating. Otherwise the task runs best-effort and a
    /// warning is logged.
    pub fn keep_alive<F>(&self, label: &str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.scheduler.wait_until(label, Box::pin(task));
    }
}

impl Default for ActivationContext {
    fn default() -> Self {
        Self::detached()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::api::deferred::TrackedScheduler;

    #[derive(Debug)]
    struct SiteName(String);

    #[test]
    fn test_resources_are_typed() {
        let ctx = ActivationContext::detached().with_resource(Arc::new(SiteName("blog".into())));

        let site = ctx.resource::<SiteName>().unwrap();
        assert_eq!(site.0, "blog");
        assert!(ctx.resource::<String>().is_none());
    }

    #[test]
    fn test_request_scope_does_not_leak_into_parent() {
        let parent = ActivationContext::detached();
        let child = parent.clone().with_request_id(Uuid::new_v4());

        assert!(parent.request_id().is_none());
        assert!(child.request_id().is_some());
    }

    #[tokio::test]
    async fn test_keep_alive_goes_through_scheduler() {
        let scheduler = Arc::new(TrackedScheduler::new());
        let ctx = ActivationContext::new(scheduler.clone());
        let (tx, rx) = tokio::sync::oneshot::channel();

        ctx.keep_alive("notify", async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = tx.send(());
        });

        assert!(ctx.scheduler().extends_lifetime());
        assert!(scheduler.drain(Duration::from_secs(5)).await);
        assert!(rx.await.is_ok());
    }
}
