//! Module loaders turn an archive into a module context.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::descriptor::{ArchiveRef, PluginManifest};
use crate::error::LoadError;
use crate::locator::HostContext;

use super::{ModuleContext, ModuleContextHandle, PluginModule};

/// Builds and releases module contexts.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    /// Instantiates the archive's module. The returned context links back
    /// to `host`.
    async fn load_module(
        &self,
        archive: &ArchiveRef,
        host: &Arc<HostContext>,
    ) -> Result<ModuleContextHandle, LoadError>;

    /// Releases a module context. Called only after every capability of the
    /// module has been withdrawn from the registry.
    async fn unload_module(&self, handle: ModuleContextHandle);
}

/// Constructor for a compiled-in module.
pub type ModuleFactory =
    Arc<dyn Fn(&PluginManifest) -> Result<Box<dyn PluginModule>, String> + Send + Sync>;

/// Loader for modules compiled into the host, keyed by manifest `entry`.
#[derive(Default)]
pub struct StaticModuleLoader {
    factories: RwLock<HashMap<String, ModuleFactory>>,
}

impl StaticModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `factory` available under the manifest entry name `entry`.
    pub fn register<F>(&self, entry: impl Into<String>, factory: F)
    where
        F: Fn(&PluginManifest) -> Result<Box<dyn PluginModule>, String> + Send + Sync + 'static,
    {
        let entry = entry.into();
        info!(entry = %entry, "Module entry registered");
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(entry, Arc::new(factory));
    }

    /// Entry names this loader can instantiate.
    pub fn entries(&self) -> Vec<String> {
        let mut entries: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        entries.sort();
        entries
    }

    pub fn has_entry(&self, entry: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(entry)
    }

    fn factory(&self, entry: &str) -> Option<ModuleFactory> {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entry)
            .cloned()
    }
}

#[async_trait]
impl ModuleLoader for StaticModuleLoader {
    async fn load_module(
        &self,
        archive: &ArchiveRef,
        host: &Arc<HostContext>,
    ) -> Result<ModuleContextHandle, LoadError> {
        let manifest = archive.manifest.clone();
        let plugin_id = manifest.id.clone();
        let factory = self
            .factory(&manifest.entry)
            .ok_or_else(|| LoadError::UnknownEntry {
                plugin_id: plugin_id.clone(),
                entry: manifest.entry.clone(),
            })?;

        // Module construction is plugin code; keep it off the request workers.
        let module = tokio::task::spawn_blocking(move || factory(&manifest))
            .await
            .map_err(|e| LoadError::Loader {
                plugin_id: plugin_id.clone(),
                reason: e.to_string(),
            })?
            .map_err(|reason| LoadError::Loader {
                plugin_id: plugin_id.clone(),
                reason,
            })?;

        let handle = ModuleContextHandle::new(ModuleContext::new(archive, module, host));
        info!(
            plugin_id = %plugin_id,
            module = %handle.id(),
            declared = handle.declared_capabilities().len(),
            "Module context created"
        );
        Ok(handle)
    }

    async fn unload_module(&self, handle: ModuleContextHandle) {
        let module = handle.id();
        let plugin_id = handle.plugin_id().to_string();
        let refs = handle.ref_count();
        if refs > 1 {
            warn!(
                plugin_id = %plugin_id,
                module = %module,
                refs,
                "Module context still referenced at unload"
            );
        }
        drop(handle);
        info!(plugin_id = %plugin_id, module = %module, "Module context released");
    }
}
