//! Convenience macros for extension development.

/// Builds a `HookPayload` from a hook point and key/value pairs.
///
/// Values are anything convertible into `serde_json::Value`.
///
/// # Example
/// ```rust,ignore
/// let payload = hook_payload!(HookPoint::ContentCreate, {
///     "title" => "Hello world",
///     "revision" => 3,
/// });
/// ```
#[macro_export]
macro_rules! hook_payload {
    ($hook:expr) => {
        $crate::prelude::HookPayload::new($hook)
    };
    ($hook:expr, { $($key:expr => $value:expr),* $(,)? }) => {{
        let mut payload = $crate::prelude::HookPayload::new($hook);
        $(
            payload.set($key, $crate::prelude::Value::from($value));
        )*
        payload
    }};
    ($hook:expr, actor: $actor:expr, { $($key:expr => $value:expr),* $(,)? }) => {{
        let mut payload = $crate::prelude::HookPayload::new($hook).with_actor($actor);
        $(
            payload.set($key, $crate::prelude::Value::from($value));
        )*
        payload
    }};
}
