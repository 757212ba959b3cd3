//! Request DTOs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query string for `GET /api/extensions`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusFilter {
    /// Only list extensions in this status.
    pub status: Option<String>,
}

/// Body for `POST /api/hooks/{hook}/dispatch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Payload data handed to the first handler.
    #[serde(default = "empty_object")]
    pub data: Value,
    /// Run as an observing dispatch instead of a transforming one.
    #[serde(default)]
    pub background: bool,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Body for `PUT /api/extensions/{name}/settings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettingsRequest {
    /// Keys to merge into the stored settings.
    pub settings: Value,
}
