//! Integration tests for start-up and extension lifecycle operations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use quill_core::config::PluginConfig;
use quill_plugin::prelude::*;
use quill_plugin::store::{ExtensionStore, MemoryExtensionStore};
use quill_plugin::{PluginManager, PluginRegistry};

type Journal = Arc<Mutex<Vec<String>>>;

fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

/// Extension whose lifecycle callbacks append `name:callback` to the journal.
fn recorded(manifest: ExtensionManifest, journal: &Journal) -> ExtensionBuilder {
    let name = manifest.name.clone();
    let note = |callback: &'static str| {
        let journal = journal.clone();
        let name = name.clone();
        move |_ctx: ActivationContext| {
            let journal = journal.clone();
            let entry = format!("{name}:{callback}");
            async move {
                journal.lock().unwrap().push(entry);
                Ok(())
            }
        }
    };

    ExtensionBuilder::new(manifest)
        .on_install(note("install"))
        .on_activate(note("activate"))
        .on_deactivate(note("deactivate"))
        .on_uninstall(note("uninstall"))
}

fn manager_with(store: Arc<MemoryExtensionStore>, config: PluginConfig) -> PluginManager {
    PluginManager::new(Arc::new(PluginRegistry::new(store)), config)
}

fn manager() -> PluginManager {
    manager_with(Arc::new(MemoryExtensionStore::new()), PluginConfig::default())
}

fn slug_handler() -> Arc<dyn HookHandler> {
    FnHandler::new(|mut payload, _ctx| async move {
        if let Some(title) = payload.get_string("title").map(str::to_lowercase) {
            payload.set("slug", Value::from(title.replace(' ', "-")));
        }
        Ok(payload)
    })
    .arc()
}

#[tokio::test]
async fn test_one_failing_activate_does_not_block_the_other() {
    let manager = manager();
    let journal = journal();

    manager
        .plugin_registry()
        .register_all(vec![
            recorded(ExtensionManifest::new("healthy", "1.0.0"), &journal).build(),
            ExtensionBuilder::new(ExtensionManifest::new("broken", "1.0.0"))
                .on_activate(|_ctx| async { Err(anyhow::anyhow!("database unreachable")) })
                .build(),
        ])
        .await;

    let report = manager
        .initialize(&ActivationContext::detached())
        .await
        .unwrap();

    assert_eq!(report.active(), vec!["healthy"]);
    let broken = report.entry("broken").unwrap();
    assert_eq!(broken.status, ExtensionStatus::Error);
    assert_eq!(
        broken.error,
        Some(PluginError::Callback {
            name: "broken".into(),
            callback: "activate".into(),
            cause: "database unreachable".into(),
        })
    );
    assert_eq!(
        manager.plugin_registry().status("broken").await,
        Some(ExtensionStatus::Error)
    );
    assert_eq!(entries(&journal), vec!["healthy:install", "healthy:activate"]);
    assert_eq!(manager.last_report().await, Some(report));
}

#[tokio::test]
async fn test_dependencies_activate_first_regardless_of_declaration_order() {
    let manager = manager();
    let journal = journal();

    manager
        .plugin_registry()
        .register_all(vec![
            recorded(
                ExtensionManifest::new("audit", "0.1.0").depends_on("slug", "^0.1"),
                &journal,
            )
            .build(),
            recorded(ExtensionManifest::new("theme", "2.0.0"), &journal).build(),
            recorded(ExtensionManifest::new("slug", "0.1.4"), &journal).build(),
        ])
        .await;

    let report = manager
        .initialize(&ActivationContext::detached())
        .await
        .unwrap();

    assert!(report.is_clean());
    let activations: Vec<String> = entries(&journal)
        .into_iter()
        .filter(|e| e.ends_with(":activate"))
        .collect();
    assert_eq!(
        activations,
        vec!["theme:activate", "slug:activate", "audit:activate"]
    );
    assert_eq!(
        manager.active_extensions().await,
        vec!["theme", "slug", "audit"]
    );
}

#[tokio::test]
async fn test_cycle_is_fatal_to_initialization() {
    let manager = manager();
    manager
        .plugin_registry()
        .register_all(vec![
            ExtensionBuilder::new(ExtensionManifest::new("a", "1.0.0").depends_on("b", "*")).build(),
            ExtensionBuilder::new(ExtensionManifest::new("b", "1.0.0").depends_on("a", "*")).build(),
        ])
        .await;

    let err = manager
        .initialize(&ActivationContext::detached())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PluginError::SystemInitialization(Box::new(PluginError::CircularDependency {
            members: vec!["a".into(), "b".into()],
        }))
    );
    assert!(err.is_fatal());
    assert!(manager.last_report().await.is_none());
}

#[tokio::test]
async fn test_dependents_of_a_failed_extension_fail_with_dependency_error() {
    let manager = manager();
    manager
        .plugin_registry()
        .register_all(vec![
            ExtensionBuilder::new(ExtensionManifest::new("slug", "0.1.0"))
                .on_install(|_ctx| async { Err(anyhow::anyhow!("migration failed")) })
                .build(),
            ExtensionBuilder::new(ExtensionManifest::new("audit", "0.1.0").depends_on("slug", "*"))
                .build(),
        ])
        .await;

    let report = manager
        .initialize(&ActivationContext::detached())
        .await
        .unwrap();

    assert_eq!(report.failed().len(), 2);
    assert!(matches!(
        report.entry("slug").unwrap().error,
        Some(PluginError::Callback { ref callback, .. }) if callback == "install"
    ));
    assert!(matches!(
        report.entry("audit").unwrap().error,
        Some(PluginError::Dependency { ref dependency, .. }) if dependency == "slug"
    ));
}

#[tokio::test]
async fn test_registration_errors_are_listed_in_the_report() {
    let manager = manager();
    manager
        .plugin_registry()
        .register_all(vec![
            ExtensionBuilder::new(ExtensionManifest::new("bad-version", "v1")).build(),
            ExtensionBuilder::new(ExtensionManifest::new("fine", "1.0.0")).build(),
        ])
        .await;

    let report = manager
        .initialize(&ActivationContext::detached())
        .await
        .unwrap();

    assert_eq!(report.active(), vec!["fine"]);
    assert!(matches!(
        report.entry("bad-version").unwrap().error,
        Some(PluginError::Validation { .. })
    ));
}

#[tokio::test]
async fn test_persisted_status_decides_what_starts() {
    let store = Arc::new(MemoryExtensionStore::new());
    store.set_status("seo", ExtensionStatus::Installed).await.unwrap();
    store.set_status("seo", ExtensionStatus::Inactive).await.unwrap();
    store.set_status("search", ExtensionStatus::Active).await.unwrap();

    let config = PluginConfig {
        auto_activate: false,
        ..PluginConfig::default()
    };
    let manager = manager_with(store.clone(), config);
    let journal = journal();

    manager
        .plugin_registry()
        .register_all(vec![
            recorded(ExtensionManifest::new("seo", "1.0.0"), &journal).build(),
            recorded(ExtensionManifest::new("search", "1.0.0"), &journal).build(),
            recorded(ExtensionManifest::new("fresh", "1.0.0"), &journal).build(),
        ])
        .await;

    let report = manager
        .initialize(&ActivationContext::detached())
        .await
        .unwrap();

    assert_eq!(report.entry("seo").unwrap().status, ExtensionStatus::Inactive);
    assert_eq!(report.entry("search").unwrap().status, ExtensionStatus::Active);
    assert_eq!(report.entry("fresh").unwrap().status, ExtensionStatus::Validated);
    // search was installed in an earlier run, so only activate runs.
    assert_eq!(entries(&journal), vec!["search:activate"]);
    assert_eq!(
        store.get_extension("seo").await.unwrap().unwrap().status,
        Some(ExtensionStatus::Inactive)
    );
}

#[tokio::test]
async fn test_settings_saved_after_failed_install_do_not_block_auto_activate() {
    let store = Arc::new(MemoryExtensionStore::new());
    let ctx = ActivationContext::detached();

    let first = manager_with(store.clone(), PluginConfig::default());
    first
        .plugin_registry()
        .register(
            ExtensionBuilder::new(ExtensionManifest::new("seo", "1.0.0"))
                .on_install(|_ctx| async { Err(anyhow::anyhow!("schema migration failed")) })
                .build(),
        )
        .await
        .unwrap();
    let report = first.initialize(&ctx).await.unwrap();
    assert_eq!(report.entry("seo").unwrap().status, ExtensionStatus::Error);
    first
        .plugin_registry()
        .update_settings("seo", json!({ "sitemap": true }))
        .await
        .unwrap();
    assert_eq!(store.get_extension("seo").await.unwrap().unwrap().status, None);

    let journal = journal();
    let second = manager_with(store.clone(), PluginConfig::default());
    second
        .plugin_registry()
        .register(recorded(ExtensionManifest::new("seo", "1.0.1"), &journal).build())
        .await
        .unwrap();
    let report = second.initialize(&ctx).await.unwrap();

    assert_eq!(report.entry("seo").unwrap().status, ExtensionStatus::Active);
    assert_eq!(entries(&journal), vec!["seo:install", "seo:activate"]);
    let record = second.plugin_registry().get("seo").await.unwrap();
    assert_eq!(record.settings["sitemap"], json!(true));
}

#[tokio::test]
async fn test_extension_deactivated_before_restart_can_be_uninstalled() {
    let store = Arc::new(MemoryExtensionStore::new());
    let ctx = ActivationContext::detached();

    let first = manager_with(store.clone(), PluginConfig::default());
    first
        .plugin_registry()
        .register(recorded(ExtensionManifest::new("seo", "1.0.0"), &journal()).build())
        .await
        .unwrap();
    first.initialize(&ctx).await.unwrap();
    first.deactivate("seo", &ctx).await.unwrap();
    first.shutdown(&ctx).await;

    let journal = journal();
    let second = manager_with(store.clone(), PluginConfig::default());
    second
        .plugin_registry()
        .register(recorded(ExtensionManifest::new("seo", "1.0.0"), &journal).build())
        .await
        .unwrap();
    let report = second.initialize(&ctx).await.unwrap();
    assert_eq!(report.entry("seo").unwrap().status, ExtensionStatus::Inactive);

    let removed = second.uninstall("seo", &ctx).await.unwrap();
    assert_eq!(removed.status, ExtensionStatus::Uninstalled);
    assert_eq!(entries(&journal), vec!["seo:uninstall"]);
    assert_eq!(
        store.get_extension("seo").await.unwrap().unwrap().status,
        Some(ExtensionStatus::Uninstalled)
    );
}

#[tokio::test]
async fn test_deactivate_refused_while_dependent_is_active() {
    let manager = manager();
    let ctx = ActivationContext::detached();

    manager
        .plugin_registry()
        .register_all(vec![
            ExtensionBuilder::new(ExtensionManifest::new("slug", "0.1.0"))
                .on(HookPoint::ContentCreate, 10, slug_handler())
                .build(),
            ExtensionBuilder::new(ExtensionManifest::new("audit", "0.1.0").depends_on("slug", "*"))
                .build(),
        ])
        .await;
    manager.initialize(&ctx).await.unwrap();

    let err = manager.deactivate("slug", &ctx).await.unwrap_err();
    assert!(matches!(
        err,
        PluginError::Dependency { ref name, ref dependency, .. }
            if name == "audit" && dependency == "slug"
    ));
    assert_eq!(
        manager.plugin_registry().status("slug").await,
        Some(ExtensionStatus::Active)
    );

    manager.deactivate("audit", &ctx).await.unwrap();
    let record = manager.deactivate("slug", &ctx).await.unwrap();
    assert_eq!(record.status, ExtensionStatus::Inactive);
    assert!(
        !manager
            .hook_registry()
            .has_handlers(&HookPoint::ContentCreate)
            .await
    );

    let err = manager.activate("audit", &ctx).await.unwrap_err();
    assert!(matches!(err, PluginError::Dependency { .. }));
    assert_eq!(
        manager.plugin_registry().status("audit").await,
        Some(ExtensionStatus::Inactive)
    );
}

#[tokio::test(start_paused = true)]
async fn test_activation_waits_for_in_flight_deactivation_of_its_dependency() {
    let manager = Arc::new(manager());
    let ctx = ActivationContext::detached();

    manager
        .plugin_registry()
        .register_all(vec![
            ExtensionBuilder::new(ExtensionManifest::new("slug", "0.1.0"))
                .on_deactivate(|_ctx| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(())
                })
                .build(),
            ExtensionBuilder::new(ExtensionManifest::new("audit", "0.1.0").depends_on("slug", "^0.1"))
                .build(),
        ])
        .await;
    manager.initialize(&ctx).await.unwrap();
    manager.deactivate("audit", &ctx).await.unwrap();

    let stopping = tokio::spawn({
        let manager = manager.clone();
        let ctx = ctx.clone();
        async move { manager.deactivate("slug", &ctx).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = manager.activate("audit", &ctx).await.unwrap_err();
    assert!(matches!(err, PluginError::Dependency { .. }));
    stopping.await.unwrap().unwrap();

    let registry = manager.plugin_registry();
    assert_eq!(registry.status("slug").await, Some(ExtensionStatus::Inactive));
    assert_eq!(registry.status("audit").await, Some(ExtensionStatus::Inactive));
    assert!(manager.active_extensions().await.is_empty());
}

#[tokio::test]
async fn test_hooks_are_live_only_while_active() {
    let manager = manager();
    let ctx = ActivationContext::detached();
    manager
        .plugin_registry()
        .register(
            ExtensionBuilder::new(ExtensionManifest::new("slug", "0.1.0"))
                .on(HookPoint::ContentCreate, 10, slug_handler())
                .build(),
        )
        .await
        .unwrap();
    manager.initialize(&ctx).await.unwrap();

    let payload = hook_payload!(HookPoint::ContentCreate, { "title" => "Hello World" });
    let outcome = manager.dispatcher().dispatch(payload.clone(), &ctx).await;
    assert!(outcome.is_clean());
    assert_eq!(outcome.payload.get_string("slug"), Some("hello-world"));

    manager.deactivate("slug", &ctx).await.unwrap();
    let outcome = manager.dispatcher().dispatch(payload.clone(), &ctx).await;
    assert_eq!(outcome.invoked, 0);
    assert!(outcome.payload.get_string("slug").is_none());

    manager.activate("slug", &ctx).await.unwrap();
    let outcome = manager.dispatcher().dispatch(payload, &ctx).await;
    assert_eq!(outcome.payload.get_string("slug"), Some("hello-world"));
}

#[tokio::test]
async fn test_reload_runs_deactivate_then_activate() {
    let manager = manager();
    let ctx = ActivationContext::detached();
    let journal = journal();
    manager
        .plugin_registry()
        .register(
            recorded(ExtensionManifest::new("seo", "1.0.0"), &journal)
                .on(HookPoint::ContentPublish, 5, slug_handler())
                .build(),
        )
        .await
        .unwrap();
    manager.initialize(&ctx).await.unwrap();

    let record = manager.reload("seo", &ctx).await.unwrap();

    assert_eq!(record.status, ExtensionStatus::Active);
    assert_eq!(
        entries(&journal),
        vec!["seo:install", "seo:activate", "seo:deactivate", "seo:activate"]
    );
    assert_eq!(
        manager
            .hook_registry()
            .handler_count(&HookPoint::ContentPublish)
            .await,
        1
    );
}

#[tokio::test]
async fn test_uninstall_only_from_inactive() {
    let store = Arc::new(MemoryExtensionStore::new());
    let manager = manager_with(store.clone(), PluginConfig::default());
    let ctx = ActivationContext::detached();
    let journal = journal();
    manager
        .plugin_registry()
        .register(recorded(ExtensionManifest::new("seo", "1.0.0"), &journal).build())
        .await
        .unwrap();
    manager.initialize(&ctx).await.unwrap();

    let err = manager.uninstall("seo", &ctx).await.unwrap_err();
    assert_eq!(
        err,
        PluginError::InvalidState {
            name: "seo".into(),
            current: ExtensionStatus::Active,
            requested: ExtensionStatus::Uninstalled,
        }
    );

    manager.deactivate("seo", &ctx).await.unwrap();
    let removed = manager.uninstall("seo", &ctx).await.unwrap();

    assert_eq!(removed.status, ExtensionStatus::Uninstalled);
    assert!(!manager.plugin_registry().contains("seo").await);
    assert_eq!(entries(&journal).last().map(String::as_str), Some("seo:uninstall"));
    let stored = store.get_extension("seo").await.unwrap().unwrap();
    assert_eq!(stored.status, Some(ExtensionStatus::Uninstalled));
    assert!(!stored.is_installed());
    assert_eq!(
        manager.activate("seo", &ctx).await.unwrap_err(),
        PluginError::not_found("seo")
    );
}

#[tokio::test(start_paused = true)]
async fn test_activate_timeout_marks_only_that_extension() {
    let config = PluginConfig {
        callback_timeout_ms: 250,
        ..PluginConfig::default()
    };
    let manager = manager_with(Arc::new(MemoryExtensionStore::new()), config);

    manager
        .plugin_registry()
        .register_all(vec![
            ExtensionBuilder::new(ExtensionManifest::new("slow", "1.0.0"))
                .on_activate(|_ctx| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                })
                .build(),
            ExtensionBuilder::new(ExtensionManifest::new("quick", "1.0.0")).build(),
        ])
        .await;

    let report = manager
        .initialize(&ActivationContext::detached())
        .await
        .unwrap();

    assert_eq!(report.active(), vec!["quick"]);
    assert_eq!(
        report.entry("slow").unwrap().error,
        Some(PluginError::Timeout {
            owner: "slow".into(),
            operation: "activate".into(),
            timeout_ms: 250,
        })
    );
}

#[tokio::test]
async fn test_panicking_callback_is_reported_not_propagated() {
    let manager = manager();
    let fail = true;
    manager
        .plugin_registry()
        .register(
            ExtensionBuilder::new(ExtensionManifest::new("panicky", "1.0.0"))
                .on_install(move |_ctx| async move {
                    if fail {
                        panic!("settings table missing");
                    }
                    Ok(())
                })
                .build(),
        )
        .await
        .unwrap();

    let report = manager
        .initialize(&ActivationContext::detached())
        .await
        .unwrap();

    assert!(matches!(
        report.entry("panicky").unwrap().error,
        Some(PluginError::Callback { ref cause, .. }) if cause == "panicked: settings table missing"
    ));
}

#[tokio::test]
async fn test_shutdown_stops_dependents_first_without_persisting() {
    let store = Arc::new(MemoryExtensionStore::new());
    let manager = manager_with(store.clone(), PluginConfig::default());
    let ctx = ActivationContext::detached();
    let journal = journal();

    manager
        .plugin_registry()
        .register_all(vec![
            recorded(ExtensionManifest::new("slug", "0.1.0"), &journal).build(),
            recorded(
                ExtensionManifest::new("audit", "0.1.0").depends_on("slug", "*"),
                &journal,
            )
            .build(),
        ])
        .await;
    manager.initialize(&ctx).await.unwrap();

    manager.shutdown(&ctx).await;

    let stops: Vec<String> = entries(&journal)
        .into_iter()
        .filter(|e| e.ends_with(":deactivate"))
        .collect();
    assert_eq!(stops, vec!["audit:deactivate", "slug:deactivate"]);
    assert!(manager.active_extensions().await.is_empty());
    for name in ["slug", "audit"] {
        assert_eq!(
            store.get_extension(name).await.unwrap().unwrap().status,
            Some(ExtensionStatus::Active)
        );
    }
}

#[tokio::test]
async fn test_activation_is_announced_to_observers() {
    let manager = manager();
    let ctx = ActivationContext::detached();
    let journal = journal();
    let seen = journal.clone();

    manager
        .plugin_registry()
        .register_all(vec![
            ExtensionBuilder::new(ExtensionManifest::new("watcher", "1.0.0"))
                .on(
                    HookPoint::ExtensionActivated,
                    0,
                    FnHandler::observer(move |payload, _ctx| {
                        let seen = seen.clone();
                        async move {
                            if let Some(name) = payload.get_string("extension") {
                                seen.lock().unwrap().push(name.to_string());
                            }
                            Ok(())
                        }
                    })
                    .arc(),
                )
                .build(),
            ExtensionBuilder::new(ExtensionManifest::new("seo", "1.0.0")).build(),
        ])
        .await;

    manager.initialize(&ctx).await.unwrap();

    // The watcher's own activation is announced after its hooks attach.
    assert_eq!(entries(&journal), vec!["watcher", "seo"]);
}

#[tokio::test]
async fn test_keep_alive_work_is_drained() {
    let scheduler = Arc::new(TrackedScheduler::new());
    let ctx = ActivationContext::new(scheduler.clone());
    let manager = manager();
    let journal = journal();
    let sink = journal.clone();

    manager
        .plugin_registry()
        .register(
            ExtensionBuilder::new(ExtensionManifest::new("audit", "0.1.0"))
                .on(
                    HookPoint::ContentCreate,
                    50,
                    FnHandler::observer(move |payload, ctx| {
                        let sink = sink.clone();
                        async move {
                            let title = payload.get_string("title").unwrap_or_default().to_string();
                            ctx.keep_alive("audit-log", async move {
                                tokio::time::sleep(Duration::from_millis(20)).await;
                                sink.lock().unwrap().push(title);
                            });
                            Ok(())
                        }
                    })
                    .arc(),
                )
                .build(),
        )
        .await
        .unwrap();
    manager.initialize(&ctx).await.unwrap();

    let outcome = manager
        .dispatcher()
        .dispatch_background(
            hook_payload!(HookPoint::ContentCreate, { "title" => "Launch" }),
            &ctx,
        )
        .await;

    assert_eq!(outcome.invoked, 1);
    assert!(scheduler.drain(Duration::from_secs(5)).await);
    assert_eq!(entries(&journal), vec!["Launch"]);
}
