//! Closure adapters for hook handlers.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::api::context::ActivationContext;
use crate::hooks::definitions::HookPayload;
use crate::hooks::registry::HookHandler;

type HandlerFn = Arc<
    dyn Fn(HookPayload, ActivationContext) -> BoxFuture<'static, anyhow::Result<HookPayload>>
        + Send
        + Sync,
>;

/// A closure-based hook handler for quick handler creation.
#[derive(Clone)]
pub struct FnHandler {
    /// Handler function.
    handler: HandlerFn,
}

impl std::fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnHandler")
            .field("handler", &"<closure>")
            .finish()
    }
}

impl FnHandler {
    /// Wraps a transforming closure: it receives the payload and returns
    /// the payload for the next handler.
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(HookPayload, ActivationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<HookPayload>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |payload, ctx| Box::pin(handler(payload, ctx))),
        }
    }

    /// Wraps an observing closure: the payload is passed on unchanged.
    pub fn observer<F, Fut>(observer: F) -> Self
    where
        F: Fn(HookPayload, ActivationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(move |payload: HookPayload, ctx| {
            let observed = observer(payload.clone(), ctx);
            async move {
                observed.await?;
                Ok(payload)
            }
        })
    }

    /// Wraps the handler into an `Arc<dyn HookHandler>`.
    pub fn arc(self) -> Arc<dyn HookHandler> {
        Arc::new(self)
    }
}

#[async_trait]
impl HookHandler for FnHandler {
    async fn handle(
        &self,
        payload: HookPayload,
        ctx: &ActivationContext,
    ) -> anyhow::Result<HookPayload> {
        (self.handler)(payload, ctx.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::hooks::definitions::HookPoint;

    #[tokio::test]
    async fn test_transforming_closure() {
        let handler = FnHandler::new(|payload, _ctx| async move {
            Ok(payload.with_string("slug", "hello-world"))
        });

        let out = handler
            .handle(
                HookPayload::new(HookPoint::ContentCreate),
                &ActivationContext::detached(),
            )
            .await
            .unwrap();
        assert_eq!(out.get_string("slug"), Some("hello-world"));
    }

    #[tokio::test]
    async fn test_observer_passes_payload_through() {
        let handler = FnHandler::observer(|payload, _ctx| async move {
            anyhow::ensure!(payload.get_string("title").is_some(), "title missing");
            Ok(())
        });
        let ctx = ActivationContext::detached();

        let payload = HookPayload::with_value(HookPoint::ContentCreate, json!({"title": "Hi"}));
        let out = handler.handle(payload.clone(), &ctx).await.unwrap();
        assert_eq!(out, payload);

        let err = handler
            .handle(HookPayload::new(HookPoint::ContentCreate), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "title missing");
    }
}
