//! Error taxonomy of the extension runtime.
//!
//! Errors fall into two scopes. Single-extension errors (validation,
//! dependency, state, handler and timeout failures) are recorded at the
//! manager/dispatcher boundary and never abort sibling processing.
//! Graph-wide errors (a dependency cycle during start-up) are fatal and
//! surface as [`PluginError::SystemInitialization`].

use thiserror::Error;

use quill_core::error::{AppError, ErrorKind};

use crate::status::ExtensionStatus;

/// Every failure the extension runtime can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// No extension with this name is registered.
    #[error("Extension '{name}' not found")]
    NotFound {
        /// Requested extension name.
        name: String,
    },

    /// The manifest is malformed.
    #[error("Extension '{name}' failed validation: {message}")]
    Validation {
        /// Extension name as declared (may be empty).
        name: String,
        /// What was wrong.
        message: String,
    },

    /// A declared dependency is missing, inactive or has an incompatible version.
    #[error("Extension '{name}' has an unusable dependency '{dependency}': {reason}")]
    Dependency {
        /// The dependent extension.
        name: String,
        /// The dependency that could not be satisfied.
        dependency: String,
        /// Why it could not be satisfied.
        reason: String,
    },

    /// The dependency graph contains a cycle.
    #[error("Circular dependency between extensions: {}", members.join(" -> "))]
    CircularDependency {
        /// Cycle members in traversal order.
        members: Vec<String>,
    },

    /// An extension with this name is already registered.
    #[error("Extension '{name}' is already registered")]
    AlreadyRegistered {
        /// The duplicate name.
        name: String,
    },

    /// The requested status transition is not allowed.
    #[error("Extension '{name}' cannot move from {current} to {requested}")]
    InvalidState {
        /// Extension name.
        name: String,
        /// Status at the time of the request.
        current: ExtensionStatus,
        /// Status that was requested.
        requested: ExtensionStatus,
    },

    /// Two extensions claim the same external resource.
    #[error("Extension '{name}' conflicts with '{other}': {resource} is already claimed")]
    Conflict {
        /// Extension being registered.
        name: String,
        /// Extension that already owns the resource.
        other: String,
        /// The contested resource.
        resource: String,
    },

    /// A hook handler returned an error or panicked.
    #[error("Hook '{hook}' handler of extension '{owner}' failed: {cause}")]
    HookExecution {
        /// Hook being dispatched.
        hook: String,
        /// Extension that owns the handler.
        owner: String,
        /// Failure description.
        cause: String,
    },

    /// A lifecycle callback returned an error or panicked.
    #[error("Extension '{name}' {callback} callback failed: {cause}")]
    Callback {
        /// Extension name.
        name: String,
        /// Callback that failed (`install`, `activate`, ...).
        callback: String,
        /// Failure description.
        cause: String,
    },

    /// A callback or handler exceeded its time bound.
    #[error("Extension '{owner}' {operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Extension that owns the callback or handler.
        owner: String,
        /// What was running (`activate`, `hook content:create`, ...).
        operation: String,
        /// The bound that was exceeded.
        timeout_ms: u64,
    },

    /// The persisted extension store failed.
    #[error("Extension store error: {message}")]
    Storage {
        /// Failure description.
        message: String,
    },

    /// Start-up could not proceed at all.
    #[error("Extension system initialization failed: {0}")]
    SystemInitialization(Box<PluginError>),
}

impl PluginError {
    /// Create a not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a validation error.
    pub fn validation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a dependency error.
    pub fn dependency(
        name: impl Into<String>,
        dependency: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Dependency {
            name: name.into(),
            dependency: dependency.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Stable error code for structured logging and API bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "plugin_not_found",
            Self::Validation { .. } => "plugin_validation_failed",
            Self::Dependency { .. } => "plugin_dependency_unsatisfied",
            Self::CircularDependency { .. } => "plugin_circular_dependency",
            Self::AlreadyRegistered { .. } => "plugin_already_registered",
            Self::InvalidState { .. } => "plugin_invalid_state",
            Self::Conflict { .. } => "plugin_conflict",
            Self::HookExecution { .. } => "plugin_hook_failed",
            Self::Callback { .. } => "plugin_callback_failed",
            Self::Timeout { .. } => "plugin_timeout",
            Self::Storage { .. } => "plugin_storage_error",
            Self::SystemInitialization(_) => "plugin_system_initialization_failed",
        }
    }

    /// Whether this error concerns the whole extension graph rather than
    /// a single extension or handler.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. } | Self::SystemInitialization(_)
        )
    }
}

/// Result alias for extension runtime operations.
pub type PluginResult<T> = Result<T, PluginError>;

impl From<PluginError> for AppError {
    fn from(err: PluginError) -> Self {
        let kind = match &err {
            PluginError::NotFound { .. } => ErrorKind::NotFound,
            PluginError::Validation { .. } | PluginError::Dependency { .. } => {
                ErrorKind::Validation
            }
            PluginError::AlreadyRegistered { .. }
            | PluginError::Conflict { .. }
            | PluginError::InvalidState { .. } => ErrorKind::Conflict,
            PluginError::Storage { .. } => ErrorKind::Storage,
            _ => ErrorKind::Plugin,
        };
        let message = err.to_string();
        AppError::with_source(kind, message, err)
    }
}
