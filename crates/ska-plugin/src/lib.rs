//! # ska-plugin
//!
//! Plugin host runtime for Ska. Provides:
//!
//! - Plugin lifecycle management (load, start, stop, unload, reload)
//! - Capability registry keyed by `pluginId:name`, holding weak references
//! - Filter and interceptor chains driven by registry snapshots
//! - Lifecycle event bus with a registration listener
//! - Registry lookup through a module's parent host context
//! - Request draining before a plugin's module is released
//! - Optional dynamic loading via `libloading`

pub mod capability;
pub mod descriptor;
pub mod discovery;
pub mod drain;
pub mod error;
pub mod events;
pub mod hooks;
pub mod listener;
pub mod locator;
pub mod manager;
pub mod module;
pub mod prelude;
pub mod registry;

#[cfg(test)]
mod testing;

pub use capability::{CapabilityDecl, CapabilityKind, CapabilitySet};
pub use descriptor::{ArchiveRef, PluginDescriptor, PluginManifest, PluginState};
pub use discovery::{ArchiveSource, DirectoryArchiveSource, StaticArchiveSource};
pub use error::{
    HookExecutionError, LifecycleError, ListenerError, LoadError, LocatorError,
    RegistrationError, StartError,
};
pub use events::{LifecycleEvent, LifecycleEventBus, LifecycleListener};
pub use hooks::{
    Completion, FilterChain, FilterNext, HookError, InterceptorChain, Outcome, Rejection,
    RequestContext, RequestFilter, RequestInterceptor, Stage, Verdict,
};
pub use locator::{HostContext, RegistryLocator};
pub use manager::PluginManager;
pub use module::{
    ModuleContext, ModuleContextHandle, ModuleLoader, ModuleScope, PluginModule,
    StaticModuleLoader,
};
pub use registry::{CapabilityKey, CapabilityRegistry, RegisteredHook};
