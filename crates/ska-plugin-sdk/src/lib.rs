//! # ska-plugin-sdk
//!
//! SDK for developing plugins for the Ska plugin host.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use ska_plugin_sdk::prelude::*;
//!
//! struct AuditFilter;
//!
//! #[async_trait]
//! impl RequestFilter for AuditFilter {
//!     async fn handle(
//!         &self,
//!         request: &mut RequestContext,
//!         next: FilterNext<'_>,
//!     ) -> Result<Outcome, HookError> {
//!         tracing::info!(path = %request.path, "audit");
//!         Ok(next.run(request).await)
//!     }
//! }
//!
//! struct AuditModule;
//!
//! #[async_trait]
//! impl PluginModule for AuditModule {
//!     fn capabilities(&self) -> Vec<CapabilityDecl> {
//!         vec![CapabilityDecl::filter("auditFilter")]
//!     }
//!
//!     async fn start(&self, _scope: &ModuleScope) -> Result<CapabilitySet, String> {
//!         Ok(CapabilitySet::new().filter("auditFilter", Arc::new(AuditFilter)))
//!     }
//! }
//!
//! export_plugin!(AuditModule);
//! ```

pub mod helpers;
pub mod macros;

/// Prelude for convenient imports.
pub mod prelude {
    pub use ska_plugin::prelude::*;

    pub use crate::export_plugin;
    pub use crate::helpers::{is_static_path, path_matches};
}

#[doc(hidden)]
pub mod __private {
    pub use ska_plugin::module::PluginModule;
}
