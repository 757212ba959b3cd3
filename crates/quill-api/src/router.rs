//! Route definitions for the Quill HTTP API.
//!
//! All routes are mounted under `/api`.

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(health_routes())
        .merge(extension_routes())
        .merge(hook_routes());

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness
fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}

/// Extension administration
fn extension_routes() -> Router<AppState> {
    Router::new()
        .route("/extensions", get(handlers::extensions::list_extensions))
        .route("/extensions/report", get(handlers::extensions::get_report))
        .route("/extensions/{name}", get(handlers::extensions::get_extension))
        .route(
            "/extensions/{name}/activate",
            post(handlers::extensions::activate_extension),
        )
        .route(
            "/extensions/{name}/deactivate",
            post(handlers::extensions::deactivate_extension),
        )
        .route(
            "/extensions/{name}/reload",
            post(handlers::extensions::reload_extension),
        )
        .route(
            "/extensions/{name}/uninstall",
            post(handlers::extensions::uninstall_extension),
        )
        .route(
            "/extensions/{name}/settings",
            put(handlers::extensions::update_settings),
        )
}

/// Hook inspection and dispatch
fn hook_routes() -> Router<AppState> {
    Router::new()
        .route("/hooks", get(handlers::hooks::list_hooks))
        .route("/hooks/{hook}/dispatch", post(handlers::hooks::dispatch_hook))
}
