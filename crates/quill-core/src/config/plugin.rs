//! Extension runtime configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Extension runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Activate extensions that have no persisted record yet.
    #[serde(default = "default_true")]
    pub auto_activate: bool,
    /// Upper bound for a single lifecycle callback (install, activate, ...).
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_ms: u64,
    /// Upper bound for a single hook handler invocation.
    #[serde(default = "default_hook_timeout")]
    pub hook_timeout_ms: u64,
    /// JSON file holding persisted status and settings. In-memory when unset.
    #[serde(default)]
    pub state_file: Option<String>,
    /// How long the host waits for deferred tasks while shutting down.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

impl PluginConfig {
    /// Lifecycle callback bound as a `Duration`.
    pub fn callback_timeout(&self) -> Duration {
        Duration::from_millis(self.callback_timeout_ms)
    }

    /// Hook handler bound as a `Duration`.
    pub fn hook_timeout(&self) -> Duration {
        Duration::from_millis(self.hook_timeout_ms)
    }

    /// Shutdown drain bound as a `Duration`.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            auto_activate: default_true(),
            callback_timeout_ms: default_callback_timeout(),
            hook_timeout_ms: default_hook_timeout(),
            state_file: None,
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_callback_timeout() -> u64 {
    10_000
}

fn default_hook_timeout() -> u64 {
    30_000
}

fn default_drain_timeout() -> u64 {
    30
}
