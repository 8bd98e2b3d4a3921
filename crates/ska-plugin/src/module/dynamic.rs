//! Shared-library module loader using `libloading` (feature `dynamic`).
//!
//! A library exports `ska_plugin_entry`, which returns a boxed
//! [`PluginModule`]. Use `ska_plugin_sdk::export_plugin!` to generate it.
//! The library must be built with the same compiler and the same
//! `ska-plugin` version as the host.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::descriptor::ArchiveRef;
use crate::error::LoadError;
use crate::locator::HostContext;

use super::{ModuleContext, ModuleContextHandle, ModuleId, ModuleLoader, PluginModule};

/// Symbol every dynamic plugin library exports.
pub const ENTRY_SYMBOL: &[u8] = b"ska_plugin_entry";

/// Signature of [`ENTRY_SYMBOL`].
pub type ModuleEntryFn = unsafe extern "C" fn() -> *mut Box<dyn PluginModule>;

/// Loads modules from shared libraries (.so / .dll / .dylib) inside the
/// archive directory. Entries that are not library file names go to the
/// fallback loader, if any.
pub struct DynamicModuleLoader {
    libraries: Mutex<HashMap<ModuleId, libloading::Library>>,
    fallback: Option<Arc<dyn ModuleLoader>>,
}

impl DynamicModuleLoader {
    pub fn new() -> Self {
        Self {
            libraries: Mutex::new(HashMap::new()),
            fallback: None,
        }
    }

    /// Sends non-library entries to `loader`.
    pub fn with_fallback(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.fallback = Some(loader);
        self
    }

    fn is_library(entry: &str) -> bool {
        Path::new(entry)
            .extension()
            .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
    }
}

impl Default for DynamicModuleLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Opens the library and calls its entry symbol.
///
/// # Safety
/// Runs arbitrary code from the library. Only load trusted plugins.
unsafe fn open_library(
    path: &Path,
) -> Result<(libloading::Library, Box<dyn PluginModule>), String> {
    let library = unsafe { libloading::Library::new(path) }
        .map_err(|e| format!("failed to open '{}': {e}", path.display()))?;

    let raw = {
        let entry: libloading::Symbol<'_, ModuleEntryFn> = unsafe { library.get(ENTRY_SYMBOL) }
            .map_err(|e| format!("'{}' does not export ska_plugin_entry: {e}", path.display()))?;
        unsafe { entry() }
    };

    let module = unsafe { take_module(raw, path) }?;
    Ok((library, module))
}

/// Takes ownership of the module an entry symbol returned.
///
/// # Safety
/// `raw` must be null or come from `Box::into_raw` on a
/// `Box<Box<dyn PluginModule>>`, as `export_plugin!` does.
unsafe fn take_module(
    raw: *mut Box<dyn PluginModule>,
    path: &Path,
) -> Result<Box<dyn PluginModule>, String> {
    if raw.is_null() {
        return Err(format!("'{}' returned a null module", path.display()));
    }
    Ok(unsafe { *Box::from_raw(raw) })
}

#[async_trait]
impl ModuleLoader for DynamicModuleLoader {
    async fn load_module(
        &self,
        archive: &ArchiveRef,
        host: &Arc<HostContext>,
    ) -> Result<ModuleContextHandle, LoadError> {
        let plugin_id = archive.manifest.id.clone();
        if !Self::is_library(&archive.manifest.entry) {
            return match &self.fallback {
                Some(fallback) => fallback.load_module(archive, host).await,
                None => Err(LoadError::UnknownEntry {
                    plugin_id,
                    entry: archive.manifest.entry.clone(),
                }),
            };
        }

        let path = archive.location.join(&archive.manifest.entry);
        let (library, module) = tokio::task::spawn_blocking(move || unsafe { open_library(&path) })
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
        self.libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(handle.id(), library);

        info!(plugin_id = %plugin_id, module = %handle.id(), "Dynamic module loaded");
        Ok(handle)
    }

    async fn unload_module(&self, handle: ModuleContextHandle) {
        let module = handle.id();
        let library = self
            .libraries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&module);

        let Some(library) = library else {
            if let Some(fallback) = &self.fallback {
                fallback.unload_module(handle).await;
            }
            return;
        };

        let plugin_id = handle.plugin_id().to_string();
        let sole_owner = handle.ref_count() == 1;
        drop(handle);

        if sole_owner {
            drop(library);
            info!(plugin_id = %plugin_id, module = %module, "Dynamic module unloaded");
        } else {
            // Code from the library may still run through the other handles.
            warn!(
                plugin_id = %plugin_id,
                module = %module,
                "Module context still referenced; leaving library mapped"
            );
            std::mem::forget(library);
        }
    }
}
