//! Quill Server: content management host with a hook-driven extension runtime.
//!
//! Main entry point that wires the crates together and starts the server.

mod builtin;

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use quill_core::config::AppConfig;
use quill_core::AppResult;
use quill_core::error::AppError;
use quill_plugin::{
    ActivationContext, ExtensionStore, JsonFileExtensionStore, MemoryExtensionStore,
    PluginError, PluginManager, PluginRegistry, TrackedScheduler,
};

#[tokio::main]
async fn main() {
    let env = std::env::var("QUILL_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!("Configuration loaded (env: {})", env);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> AppResult<()> {
    tracing::info!("Starting Quill v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Extension store ──────────────────────────────────
    let store: Arc<dyn ExtensionStore> = match &config.plugins.state_file {
        Some(path) => {
            tracing::info!("Opening extension state file '{}'...", path);
            Arc::new(JsonFileExtensionStore::open(path).await?)
        }
        None => {
            tracing::warn!("No state file configured; extension state will not survive restarts");
            Arc::new(MemoryExtensionStore::new())
        }
    };

    // ── Step 2: Register built-in extensions ─────────────────────
    let registry = Arc::new(PluginRegistry::new(store));
    for (name, result) in registry.register_all(builtin::extensions()).await {
        if let Err(e) = result {
            tracing::error!(extension = %name, error = %e, "Built-in extension rejected");
        }
    }

    // ── Step 3: Initialize extensions ────────────────────────────
    let scheduler = Arc::new(TrackedScheduler::new());
    let context = ActivationContext::new(scheduler.clone());
    let manager = Arc::new(PluginManager::new(registry, config.plugins.clone()));

    let report = match manager.initialize(&context).await {
        Ok(report) => report,
        Err(e @ PluginError::SystemInitialization(_)) => {
            return Err(AppError::configuration(format!(
                "Extension system failed to start: {}",
                e
            )));
        }
        Err(e) => return Err(e.into()),
    };
    tracing::info!(
        active = report.active().len(),
        failed = report.failed().len(),
        duration_ms = report.duration_ms,
        "Extensions initialized"
    );

    // ── Step 4: Build and start HTTP server ──────────────────────
    let addr = config.server.bind_address();
    let app_state = quill_api::AppState::new(
        Arc::new(config.clone()),
        Arc::clone(&manager),
        context.clone(),
    );
    let app = quill_api::build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("Quill server listening on {}", addr);

    // ── Step 5: Graceful shutdown ────────────────────────────────
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown...");
        })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    // ── Step 6: Deactivate extensions and drain deferred work ────
    manager.shutdown(&context).await;

    tracing::info!("Waiting for deferred extension tasks to complete...");
    if !scheduler.drain(config.plugins.drain_timeout()).await {
        tracing::warn!("Deferred tasks abandoned after drain timeout");
    }

    tracing::info!("Quill server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
