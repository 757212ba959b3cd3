//! Extensions compiled into the server.

use std::sync::Arc;

use quill_plugin::prelude::*;

/// Every built-in extension, in registration order.
pub fn extensions() -> Vec<Arc<dyn Extension>> {
    vec![content_slug(), content_audit()]
}

/// Fills in `slug` on new content from its `title`.
pub fn content_slug() -> Arc<dyn Extension> {
    let manifest = ExtensionManifest::new("content-slug", "0.1.0")
        .with_description("Derives URL slugs from content titles")
        .with_default_settings(json!({ "maxLength": 96 }));

    ExtensionBuilder::new(manifest)
        .on(
            HookPoint::ContentCreate,
            10,
            FnHandler::new(|mut payload: HookPayload, _ctx| async move {
                if payload.get_string("slug").is_none() {
                    if let Some(slug) = payload.get_string("title").map(slugify) {
                        if !slug.is_empty() {
                            payload.set("slug", Value::from(slug));
                        }
                    }
                }
                Ok(payload)
            })
            .arc(),
        )
        .build()
}

/// Records an audit line for every new content entry.
pub fn content_audit() -> Arc<dyn Extension> {
    let manifest = ExtensionManifest::new("content-audit", "0.1.0")
        .with_description("Writes an audit line when content is created")
        .depends_on("content-slug", "^0.1");

    ExtensionBuilder::new(manifest)
        .on(
            HookPoint::ContentCreate,
            100,
            FnHandler::observer(|payload: HookPayload, ctx: ActivationContext| async move {
                let slug = payload.get_string("slug").unwrap_or_default().to_string();
                let actor = payload.actor_id;
                let request = ctx.request_id();
                ctx.keep_alive("content-audit", async move {
                    tracing::info!(
                        target: "quill::audit",
                        slug = %slug,
                        actor = ?actor,
                        request = ?request,
                        "Content created"
                    );
                });
                Ok(())
            })
            .arc(),
        )
        .build()
}

/// Lower-cases `title` and joins its alphanumeric runs with `-`.
fn slugify(title: &str) -> String {
    title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}
