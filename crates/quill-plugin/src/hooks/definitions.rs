//! Hook point names and the payload carried through a handler chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A named extension point in the content-management lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HookPoint {
    // ── Content ──
    /// A content entry was persisted. Handlers may transform the entry.
    ContentCreate,
    /// A content entry was updated.
    ContentUpdate,
    /// A content entry was deleted.
    ContentDelete,
    /// A content entry was published.
    ContentPublish,

    // ── Media ──
    /// A media file was uploaded.
    MediaUpload,

    // ── Users & settings ──
    /// A user account was created.
    UserCreate,
    /// A user logged in.
    UserLogin,
    /// Site settings were changed.
    SettingsUpdate,

    // ── Extensions ──
    /// An extension finished activating.
    ExtensionActivated,
    /// An extension finished deactivating.
    ExtensionDeactivated,

    /// Any other hook name an extension wants to publish.
    Custom(String),
}

impl HookPoint {
    /// Returns the string name of this hook point.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ContentCreate => "content:create",
            Self::ContentUpdate => "content:update",
            Self::ContentDelete => "content:delete",
            Self::ContentPublish => "content:publish",
            Self::MediaUpload => "media:upload",
            Self::UserCreate => "user:create",
            Self::UserLogin => "user:login",
            Self::SettingsUpdate => "settings:update",
            Self::ExtensionActivated => "extension:activated",
            Self::ExtensionDeactivated => "extension:deactivated",
            Self::Custom(name) => name,
        }
    }
}

impl From<&str> for HookPoint {
    fn from(name: &str) -> Self {
        match name {
            "content:create" => Self::ContentCreate,
            "content:update" => Self::ContentUpdate,
            "content:delete" => Self::ContentDelete,
            "content:publish" => Self::ContentPublish,
            "media:upload" => Self::MediaUpload,
            "user:create" => Self::UserCreate,
            "user:login" => Self::UserLogin,
            "settings:update" => Self::SettingsUpdate,
            "extension:activated" => Self::ExtensionActivated,
            "extension:deactivated" => Self::ExtensionDeactivated,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<String> for HookPoint {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<HookPoint> for String {
    fn from(hook: HookPoint) -> Self {
        hook.as_str().to_string()
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload folded through the handlers of one hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookPayload {
    /// The hook point being fired.
    pub hook: HookPoint,
    /// Event data. Usually a JSON object describing the domain entity.
    pub data: Value,
    /// The actor (user) who triggered this event.
    pub actor_id: Option<Uuid>,
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,
}

impl HookPayload {
    /// Creates a payload with an empty object as data.
    pub fn new(hook: impl Into<HookPoint>) -> Self {
        Self::with_value(hook, Value::Object(Map::new()))
    }

    /// Creates a payload wrapping arbitrary JSON data.
    pub fn with_value(hook: impl Into<HookPoint>, data: Value) -> Self {
        Self {
            hook: hook.into(),
            data,
            actor_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Sets the actor ID.
    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Inserts a value under `key`. Non-object data is replaced by an object.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        self.set(key, value);
        self
    }

    /// Inserts a string value.
    pub fn with_string(self, key: &str, value: &str) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Inserts an integer value.
    pub fn with_int(self, key: &str, value: i64) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Inserts a boolean value.
    pub fn with_bool(self, key: &str, value: bool) -> Self {
        self.with_data(key, Value::from(value))
    }

    /// Sets `key` in place. Non-object data is replaced by an object.
    pub fn set(&mut self, key: &str, value: Value) {
        if !self.data.is_object() {
            self.data = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.data {
            map.insert(key.to_string(), value);
        }
    }

    /// Gets a data value by key.
    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a string data value.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    /// Gets a UUID data value.
    pub fn get_uuid(&self, key: &str) -> Option<Uuid> {
        self.get_string(key).and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Gets an i64 data value.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.data.get(key).and_then(|v| v.as_i64())
    }

    /// Gets a bool data value.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_map_to_variants() {
        assert_eq!(HookPoint::from("content:create"), HookPoint::ContentCreate);
        assert_eq!(
            HookPoint::from("seo:sitemap"),
            HookPoint::Custom("seo:sitemap".into())
        );
        assert_eq!(HookPoint::MediaUpload.to_string(), "media:upload");
    }

    #[test]
    fn test_hook_point_serializes_as_name() {
        let json = serde_json::to_string(&HookPoint::ContentPublish).unwrap();
        assert_eq!(json, "\"content:publish\"");
        let parsed: HookPoint = serde_json::from_str("\"user:login\"").unwrap();
        assert_eq!(parsed, HookPoint::UserLogin);
    }

    #[test]
    fn test_payload_accessors() {
        let actor = Uuid::new_v4();
        let payload = HookPayload::new(HookPoint::ContentCreate)
            .with_actor(actor)
            .with_string("title", "Hello")
            .with_int("revision", 3)
            .with_bool("draft", true);

        assert_eq!(payload.get_string("title"), Some("Hello"));
        assert_eq!(payload.get_i64("revision"), Some(3));
        assert_eq!(payload.get_bool("draft"), Some(true));
        assert_eq!(payload.actor_id, Some(actor));
        assert!(payload.get_data("missing").is_none());
    }

    #[test]
    fn test_set_replaces_scalar_data_with_object() {
        let mut payload = HookPayload::with_value("custom:event", Value::from(42));
        payload.set("answer", Value::from(42));
        assert_eq!(payload.get_i64("answer"), Some(42));
    }
}
