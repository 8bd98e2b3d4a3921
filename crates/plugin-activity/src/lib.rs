//! Activity plugin for the Ska host.
//!
//! Guards the activity endpoints with an expiry date taken from the plugin
//! manifest: once the configured `expire_time` has passed, requests under
//! the activity path prefix are rejected with 403 by both the filter and
//! the interceptor.

pub mod hooks;
pub mod plugin;
pub mod properties;

pub use plugin::{ActivityModule, ENTRY, PLUGIN_NAME, PLUGIN_VERSION, register};
pub use properties::ActivityProperties;

#[cfg(feature = "dynamic")]
ska_plugin_sdk::export_plugin!(ActivityModule::new());
