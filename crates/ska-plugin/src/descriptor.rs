//! Plugin manifests, lifecycle states, and descriptor snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::module::ModuleId;

/// Lifecycle state of a plugin.
///
/// ```text
/// CREATED -> RESOLVED -> STARTED <-> STOPPED -> UNLOADED
///                 \          \
///                  +----------+--> FAILED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginState {
    /// Known to the manager, module not yet loaded.
    Created,
    /// Module context built and dependencies satisfied.
    Resolved,
    /// Entry point ran and capabilities are registered.
    Started,
    /// Capabilities withdrawn and drained.
    Stopped,
    /// Module context released.
    Unloaded,
    /// Load or start failed.
    Failed,
}

impl PluginState {
    /// Returns the upper-case name used in logs and admin responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Resolved => "RESOLVED",
            Self::Started => "STARTED",
            Self::Stopped => "STOPPED",
            Self::Unloaded => "UNLOADED",
            Self::Failed => "FAILED",
        }
    }

    /// `UNLOADED` and `FAILED` end a plugin's life. A new `load` with the same
    /// id is allowed afterwards.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unloaded | Self::Failed)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `plugin.toml` of an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin id.
    pub id: String,
    /// Plugin version string.
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Author or maintainer.
    #[serde(default)]
    pub provider: Option<String>,
    /// Name of the module entry point the loader instantiates.
    pub entry: String,
    /// Plugin ids that must be `STARTED` before this plugin resolves.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Free-form module properties handed to the entry point.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl PluginManifest {
    /// Creates a manifest with no dependencies or properties.
    pub fn new(id: impl Into<String>, version: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            description: String::new(),
            provider: None,
            entry: entry.into(),
            dependencies: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_dependency(mut self, plugin_id: impl Into<String>) -> Self {
        self.dependencies.push(plugin_id.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Reference to a plugin archive: where it lives and what its manifest says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRef {
    /// Archive location (a plugin directory, or a synthetic path for
    /// compiled-in modules).
    pub location: PathBuf,
    /// The archive's manifest.
    pub manifest: PluginManifest,
}

impl ArchiveRef {
    pub fn new(location: impl Into<PathBuf>, manifest: PluginManifest) -> Self {
        Self {
            location: location.into(),
            manifest,
        }
    }

    /// Archive for a module compiled into the host binary.
    pub fn in_memory(manifest: PluginManifest) -> Self {
        let location = PathBuf::from(format!("memory://{}", manifest.id));
        Self { location, manifest }
    }

    pub fn plugin_id(&self) -> &str {
        &self.manifest.id
    }
}

/// Point-in-time snapshot of a plugin, as returned by `list` and the admin
/// API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// Plugin id.
    pub plugin_id: String,
    /// Plugin version.
    pub version: String,
    /// Current lifecycle state.
    pub state: PluginState,
    /// Manifest description.
    pub description: String,
    /// Id of the live module context, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_id: Option<ModuleId>,
    /// Why the plugin entered `FAILED`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the state last changed.
    pub updated_at: DateTime<Utc>,
}

impl PluginDescriptor {
    pub(crate) fn created(manifest: &PluginManifest) -> Self {
        Self {
            plugin_id: manifest.id.clone(),
            version: manifest.version.clone(),
            state: PluginState::Created,
            description: manifest.description.clone(),
            module_id: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }
}
