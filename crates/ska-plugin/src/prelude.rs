//! Prelude for plugin authors.

pub use async_trait::async_trait;

pub use crate::capability::{CapabilityDecl, CapabilitySet};
pub use crate::hooks::definitions::{
    Completion, HookError, Outcome, Rejection, RequestContext, Verdict,
};
pub use crate::hooks::filter::{FilterNext, RequestFilter};
pub use crate::hooks::interceptor::RequestInterceptor;
pub use crate::module::{ModuleScope, PluginModule};
