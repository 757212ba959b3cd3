//! Hook inspection and dispatch handlers.

use axum::Json;
use axum::extract::{Path, State};

use quill_plugin::{HookPayload, HookPoint};

use crate::dto::request::DispatchRequest;
use crate::dto::response::{ApiResponse, DispatchResponse, HandlerInfo, HookInfo};
use crate::state::AppState;

/// GET /api/hooks
pub async fn list_hooks(State(state): State<AppState>) -> Json<ApiResponse<Vec<HookInfo>>> {
    let registry = state.manager.hook_registry();

    let mut hooks = Vec::new();
    for hook in registry.registered_hooks().await {
        let handlers = registry
            .handlers(&hook)
            .await
            .iter()
            .map(|entry| HandlerInfo {
                owner: entry.owner.clone(),
                priority: entry.priority,
            })
            .collect();
        hooks.push(HookInfo {
            hook: hook.to_string(),
            handlers,
        });
    }

    Json(ApiResponse::ok(hooks))
}

/// POST /api/hooks/{hook}/dispatch
pub async fn dispatch_hook(
    State(state): State<AppState>,
    Path(hook): Path<String>,
    Json(req): Json<DispatchRequest>,
) -> Json<ApiResponse<DispatchResponse>> {
    let payload = HookPayload::with_value(HookPoint::from(hook), req.data);
    let ctx = state.request_context();
    let dispatcher = state.manager.dispatcher();

    let response = if req.background {
        DispatchResponse::from(dispatcher.dispatch_background(payload, &ctx).await)
    } else {
        DispatchResponse::from(dispatcher.dispatch(payload, &ctx).await)
    };

    tracing::debug!(
        invoked = response.invoked,
        failures = response.failures.len(),
        "Hook dispatched from admin API"
    );

    Json(ApiResponse::ok(response))
}
