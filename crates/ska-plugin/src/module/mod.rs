//! Module contexts: the isolated place where a plugin's own objects live.
//!
//! A [`ModuleContext`] owns the plugin's [`PluginModule`] and, once started,
//! the capability instances it produced. The capability registry only ever
//! sees weak references to those instances.

pub mod loader;

#[cfg(feature = "dynamic")]
pub mod dynamic;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::capability::{Capability, CapabilityDecl, CapabilitySet};
use crate::descriptor::{ArchiveRef, PluginManifest};
use crate::drain::DrainGate;
use crate::error::StartError;
use crate::locator::HostContext;
use crate::registry::HookHandle;

pub use loader::{ModuleLoader, StaticModuleLoader};

/// Process-unique id of a module context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(u64);

impl ModuleId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module-{}", self.0)
    }
}

/// What a module's entry point sees when it is started.
#[derive(Debug, Clone)]
pub struct ModuleScope {
    pub plugin_id: String,
    pub version: String,
    pub module_id: ModuleId,
    pub properties: BTreeMap<String, String>,
}

impl ModuleScope {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// A plugin's entry point.
#[async_trait]
pub trait PluginModule: Send + Sync {
    /// Capabilities this module will produce. Read at load time, before
    /// anything is instantiated.
    fn capabilities(&self) -> Vec<CapabilityDecl>;

    /// Instantiates the declared capabilities.
    async fn start(&self, scope: &ModuleScope) -> Result<CapabilitySet, String>;

    /// Releases whatever `start` acquired. Capability instances are dropped
    /// by the host afterwards.
    async fn stop(&self) -> Result<(), String> {
        Ok(())
    }
}

/// A loaded plugin module and the objects it owns.
pub struct ModuleContext {
    id: ModuleId,
    manifest: PluginManifest,
    location: PathBuf,
    module: Box<dyn PluginModule>,
    declared: Vec<CapabilityDecl>,
    capabilities: RwLock<Vec<Capability>>,
    parent: Option<Weak<HostContext>>,
    gate: Arc<DrainGate>,
}

impl ModuleContext {
    /// Builds a context whose parent link points at `host`.
    pub fn new(archive: &ArchiveRef, module: Box<dyn PluginModule>, host: &Arc<HostContext>) -> Self {
        let mut context = Self::detached(archive, module);
        context.parent = Some(Arc::downgrade(host));
        context
    }

    /// Builds a context with no parent link. The registry cannot be located
    /// from it.
    pub fn detached(archive: &ArchiveRef, module: Box<dyn PluginModule>) -> Self {
        let declared = module.capabilities();
        Self {
            id: ModuleId::next(),
            manifest: archive.manifest.clone(),
            location: archive.location.clone(),
            module,
            declared,
            capabilities: RwLock::new(Vec::new()),
            parent: None,
            gate: DrainGate::new(),
        }
    }

    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn plugin_id(&self) -> &str {
        &self.manifest.id
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn declared_capabilities(&self) -> &[CapabilityDecl] {
        &self.declared
    }

    /// The declared link to the host context, if the loader set one.
    pub fn parent_link(&self) -> Option<&Weak<HostContext>> {
        self.parent.as_ref()
    }

    pub fn gate(&self) -> &Arc<DrainGate> {
        &self.gate
    }

    /// Runs the module's entry point and keeps the capability instances it
    /// produced. Returns how many were produced.
    pub async fn activate(&self) -> Result<usize, StartError> {
        let scope = ModuleScope {
            plugin_id: self.manifest.id.clone(),
            version: self.manifest.version.clone(),
            module_id: self.id,
            properties: self.manifest.properties.clone(),
        };

        let produced = self
            .module
            .start(&scope)
            .await
            .map_err(|reason| StartError::EntryPoint {
                plugin_id: self.manifest.id.clone(),
                reason,
            })?;

        for capability in produced.iter() {
            let declared = self
                .declared
                .iter()
                .any(|d| d.name == capability.name && d.kind == capability.instance.kind());
            if !declared {
                return Err(StartError::UndeclaredCapability {
                    plugin_id: self.manifest.id.clone(),
                    name: capability.name.clone(),
                });
            }
        }
        if produced.len() < self.declared.len() {
            warn!(
                plugin_id = %self.manifest.id,
                declared = self.declared.len(),
                produced = produced.len(),
                "Module produced fewer capabilities than it declared"
            );
        }

        let count = produced.len();
        *self.write_capabilities() = produced.into_vec();
        debug!(plugin_id = %self.manifest.id, module = %self.id, count, "Module activated");
        Ok(count)
    }

    /// Registry handles for the live capabilities, in declaration order.
    pub fn hook_handles(&self) -> Vec<(String, HookHandle)> {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|c| (c.name.clone(), HookHandle::new(&c.instance, Arc::clone(&self.gate))))
            .collect()
    }

    pub fn capability_count(&self) -> usize {
        self.capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Runs the module's stop callback and drops the capability instances.
    /// The instances are dropped even when the callback fails.
    pub async fn deactivate(&self) -> Result<(), String> {
        let result = self.module.stop().await;
        self.write_capabilities().clear();
        result
    }

    fn write_capabilities(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Capability>> {
        self.capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("id", &self.id)
            .field("plugin_id", &self.manifest.id)
            .field("capabilities", &self.capability_count())
            .finish()
    }
}

/// Shared handle to a module context. The plugin descriptor holds one for as
/// long as the module is loaded.
#[derive(Debug, Clone)]
pub struct ModuleContextHandle(Arc<ModuleContext>);

impl ModuleContextHandle {
    pub fn new(context: ModuleContext) -> Self {
        Self(Arc::new(context))
    }

    /// Number of live handles, this one included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }
}

impl Deref for ModuleContextHandle {
    type Target = ModuleContext;

    fn deref(&self) -> &ModuleContext {
        &self.0
    }
}
