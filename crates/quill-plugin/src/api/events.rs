//! Hook subscription summaries exposed on extension records.

use serde::{Deserialize, Serialize};

use crate::hooks::definitions::HookPoint;

/// Describes a hook an extension attaches to when it activates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSubscription {
    /// The hook point subscribed to.
    pub hook: HookPoint,
    /// Priority (lower = runs earlier).
    pub priority: i32,
}

impl HookSubscription {
    /// Creates a new hook subscription.
    pub fn new(hook: HookPoint, priority: i32) -> Self {
        Self { hook, priority }
    }
}
