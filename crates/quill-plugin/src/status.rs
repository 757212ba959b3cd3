//! Extension lifecycle states and the legal transitions between them.
//!
//! ```text
//! Registered -> Validated -> Installed -> Active <-> Inactive -> Uninstalled
//!      \____________\____________\__________\__________\_____> Error
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionStatus {
    /// Manifest accepted into the registry.
    Registered,
    /// Dependencies re-checked against the live registry.
    Validated,
    /// `install` callback completed.
    Installed,
    /// `activate` callback completed; hooks are attached.
    Active,
    /// `deactivate` callback completed; hooks are detached.
    Inactive,
    /// `uninstall` callback completed.
    Uninstalled,
    /// A transition failed irrecoverably. Cleared only by re-registration.
    Error,
}

impl ExtensionStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [ExtensionStatus; 7] = [
        Self::Registered,
        Self::Validated,
        Self::Installed,
        Self::Active,
        Self::Inactive,
        Self::Uninstalled,
        Self::Error,
    ];

    /// Returns the string name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Validated => "validated",
            Self::Installed => "installed",
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Uninstalled => "uninstalled",
            Self::Error => "error",
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: ExtensionStatus) -> bool {
        use ExtensionStatus::*;

        match (self, next) {
            (Error, _) => false,
            (_, Error) => true,
            (Registered, Validated)
            | (Validated, Installed)
            | (Installed, Active)
            | (Active, Inactive)
            | (Inactive, Active)
            | (Inactive, Uninstalled) => true,
            _ => false,
        }
    }

    /// Whether the extension's hooks are live in this status.
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    /// Whether the extension takes part in activation ordering.
    pub fn is_pending_activation(self) -> bool {
        matches!(self, Self::Registered | Self::Validated)
    }

    /// Whether this status is written to the persisted extension store.
    ///
    /// `Registered`, `Validated` and `Error` describe the current process
    /// only and never reach the store.
    pub fn is_persisted(self) -> bool {
        matches!(
            self,
            Self::Installed | Self::Active | Self::Inactive | Self::Uninstalled
        )
    }
}

impl fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExtensionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown extension status '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::ExtensionStatus::*;
    use super::*;

    #[test]
    fn test_happy_path_is_legal() {
        let path = [Registered, Validated, Installed, Active, Inactive, Active];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Inactive.can_transition_to(Uninstalled));
    }

    #[test]
    fn test_skipping_states_is_illegal() {
        assert!(!Registered.can_transition_to(Active));
        assert!(!Validated.can_transition_to(Active));
        assert!(!Active.can_transition_to(Uninstalled));
        assert!(!Uninstalled.can_transition_to(Active));
        assert!(!Installed.can_transition_to(Inactive));
    }

    #[test]
    fn test_error_reachable_from_everywhere_but_terminal() {
        for status in ExtensionStatus::ALL {
            if status != Error {
                assert!(status.can_transition_to(Error));
            }
            assert!(!Error.can_transition_to(status));
        }
    }

    #[test]
    fn test_only_lifecycle_choices_are_persisted() {
        let persisted: Vec<_> = ExtensionStatus::ALL
            .into_iter()
            .filter(|s| s.is_persisted())
            .collect();
        assert_eq!(persisted, vec![Installed, Active, Inactive, Uninstalled]);
    }

    #[test]
    fn test_parse_round_trips_names() {
        for status in ExtensionStatus::ALL {
            assert_eq!(status.as_str().parse::<ExtensionStatus>().unwrap(), status);
        }
        assert_eq!("ACTIVE".parse::<ExtensionStatus>().unwrap(), Active);
        assert!("running".parse::<ExtensionStatus>().is_err());
    }
}
