//! Plugin system configuration.

use serde::{Deserialize, Serialize};

/// Plugin system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Directory containing one sub-directory (with a `plugin.toml`) per plugin.
    #[serde(default = "default_plugin_directory")]
    pub directory: String,
    /// Whether discovered plugins are started right after they load.
    #[serde(default = "default_true")]
    pub auto_start: bool,
    /// Upper bound for a module's start entry point, in milliseconds.
    #[serde(default = "default_start_timeout")]
    pub start_timeout_ms: u64,
    /// How long a stop may wait on in-flight hook invocations before a
    /// warning is logged. The drain keeps waiting after the warning.
    #[serde(default = "default_drain_warn_after")]
    pub drain_warn_after_ms: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            directory: default_plugin_directory(),
            auto_start: true,
            start_timeout_ms: default_start_timeout(),
            drain_warn_after_ms: default_drain_warn_after(),
        }
    }
}

fn default_plugin_directory() -> String {
    "./plugins".to_string()
}

fn default_true() -> bool {
    true
}

fn default_start_timeout() -> u64 {
    30_000
}

fn default_drain_warn_after() -> u64 {
    5_000
}
