//! Typed errors for the plugin runtime.
//!
//! Each stage of a plugin's life has its own error type so callers can tell
//! a broken archive from a failing entry point or a registry refusal. The
//! admin surface folds them into [`LifecycleError`], which maps onto
//! [`ska_core::AppError`].

use thiserror::Error;

use ska_core::AppError;

use crate::descriptor::PluginState;
use crate::module::ModuleId;

/// The archive could not be turned into a resolved module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The manifest is missing, unreadable, or incomplete.
    #[error("plugin archive '{archive}' is malformed: {reason}")]
    MalformedArchive { archive: String, reason: String },

    /// The plugin id cannot be used as a registry key prefix.
    #[error("invalid plugin id '{0}': ids must be non-empty and must not contain ':'")]
    InvalidPluginId(String),

    /// A declared dependency is not in the `STARTED` state.
    #[error("plugin '{plugin_id}' depends on '{dependency}', which is not started")]
    UnresolvedDependency { plugin_id: String, dependency: String },

    /// The loader has no module for the manifest's entry point.
    #[error("no module entry named '{entry}' is available to plugin '{plugin_id}'")]
    UnknownEntry { plugin_id: String, entry: String },

    /// The loader failed while instantiating the module.
    #[error("module loader failed for plugin '{plugin_id}': {reason}")]
    Loader { plugin_id: String, reason: String },
}

/// The plugin's entry point could not be activated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartError {
    /// The module's `start` returned an error.
    #[error("plugin '{plugin_id}' entry point failed: {reason}")]
    EntryPoint { plugin_id: String, reason: String },

    /// The module's `start` did not finish within the configured budget.
    #[error("plugin '{plugin_id}' did not start within {timeout_ms} ms")]
    Timeout { plugin_id: String, timeout_ms: u64 },

    /// The module produced a capability it never declared, or declared it
    /// with a different kind.
    #[error("plugin '{plugin_id}' produced undeclared capability '{name}'")]
    UndeclaredCapability { plugin_id: String, name: String },

    /// The module context was already torn down.
    #[error("module context of plugin '{plugin_id}' is no longer available")]
    ContextReleased { plugin_id: String },
}

/// The capability registry refused a registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The plugin id would make the composite key ambiguous.
    #[error("invalid plugin id '{0}': ids must be non-empty and must not contain ':'")]
    InvalidPluginId(String),

    /// Capability names must be non-empty.
    #[error("plugin '{0}' tried to register a capability with an empty name")]
    EmptyName(String),

    /// The plugin's hooks were withdrawn; it must be started again before it
    /// can register.
    #[error("plugin '{0}' has been withdrawn from the registry")]
    PluginWithdrawn(String),

    /// A non-terminal plugin with the same id already exists.
    #[error("plugin '{0}' is already active")]
    DuplicateActive(String),
}

/// A single hook invocation failed. Logged by the chains, never shown to
/// end users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookExecutionError {
    /// The hook returned an error.
    #[error("hook '{hook}' failed: {message}")]
    Failed { hook: String, message: String },

    /// The hook exceeded its time budget.
    #[error("hook '{hook}' exceeded its {budget_ms} ms budget")]
    TimedOut { hook: String, budget_ms: u64 },

    /// The hook panicked.
    #[error("hook '{hook}' panicked")]
    Panicked { hook: String },
}

impl HookExecutionError {
    /// Composite key of the hook that failed.
    pub fn hook(&self) -> &str {
        match self {
            Self::Failed { hook, .. } | Self::TimedOut { hook, .. } | Self::Panicked { hook } => {
                hook
            }
        }
    }
}

/// The registry could not be reached from a module context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocatorError {
    /// The module context was built without a parent link.
    #[error("module context {module} has no parent link to the host context")]
    NoParentLink { module: ModuleId },

    /// The host context was dropped.
    #[error("host context of module {module} is no longer alive")]
    HostGone { module: ModuleId },

    /// The host context has nothing published under the slot.
    #[error("host context has no '{slot}' slot")]
    SlotEmpty { slot: &'static str },

    /// The slot holds a value of another type.
    #[error("host context slot '{slot}' holds an unexpected type")]
    SlotTypeMismatch { slot: &'static str },

    /// Something is already published under the slot.
    #[error("host context slot '{slot}' is already occupied")]
    SlotOccupied { slot: &'static str },
}

/// A lifecycle listener failed to react to an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListenerError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Locator(#[from] LocatorError),
}

/// Errors surfaced by [`crate::PluginManager`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// No plugin with this id is known.
    #[error("plugin '{0}' not found")]
    NotFound(String),

    /// The operation is not allowed from the plugin's current state.
    #[error("cannot {operation} plugin '{plugin_id}' in state {from}")]
    InvalidTransition {
        plugin_id: String,
        from: PluginState,
        operation: &'static str,
    },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Start(#[from] StartError),

    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Locator(#[from] LocatorError),
}

impl From<ListenerError> for LifecycleError {
    fn from(err: ListenerError) -> Self {
        match err {
            ListenerError::Registration(e) => Self::Registration(e),
            ListenerError::Locator(e) => Self::Locator(e),
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match &err {
            LifecycleError::NotFound(_) => AppError::not_found(err.to_string()),
            LifecycleError::InvalidTransition { .. }
            | LifecycleError::Registration(RegistrationError::DuplicateActive(_)) => {
                AppError::conflict(err.to_string())
            }
            _ => AppError::plugin(err.to_string()),
        }
    }
}
