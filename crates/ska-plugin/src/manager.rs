//! Plugin manager: lifecycle management for all plugins.
//!
//! Lifecycle operations on one plugin are serialized by that plugin's own
//! lock; operations on different plugins and request traffic run
//! concurrently. The request path never takes a manager lock.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use ska_core::config::PluginConfig;

use crate::descriptor::{ArchiveRef, PluginDescriptor, PluginState};
use crate::discovery::{ArchiveSource, order_by_dependencies};
use crate::error::{LifecycleError, LoadError, StartError};
use crate::events::{LifecycleEvent, LifecycleEventBus};
use crate::listener::CapabilityRegistrationListener;
use crate::locator::HostContext;
use crate::module::{ModuleContextHandle, ModuleId, ModuleLoader};
use crate::registry::{CapabilityRegistry, validate_plugin_id};

/// Book-keeping for one plugin id.
struct PluginSlot {
    /// Serializes lifecycle operations and owns the module context.
    module: Mutex<Option<ModuleContextHandle>>,
    /// Archive of the current incarnation.
    archive: StdRwLock<ArchiveRef>,
    /// Snapshot served to readers.
    descriptor: StdRwLock<PluginDescriptor>,
}

impl PluginSlot {
    fn new(archive: ArchiveRef) -> Self {
        let descriptor = PluginDescriptor::created(&archive.manifest);
        Self {
            module: Mutex::new(None),
            archive: StdRwLock::new(archive),
            descriptor: StdRwLock::new(descriptor),
        }
    }

    fn snapshot(&self) -> PluginDescriptor {
        self.descriptor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn state(&self) -> PluginState {
        self.descriptor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    fn archive(&self) -> ArchiveRef {
        self.archive
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Starts a new incarnation from `archive`.
    fn replace_archive(&self, archive: ArchiveRef) {
        *self.descriptor.write().unwrap_or_else(PoisonError::into_inner) =
            PluginDescriptor::created(&archive.manifest);
        *self.archive.write().unwrap_or_else(PoisonError::into_inner) = archive;
    }

    fn transition(&self, state: PluginState, module: Option<ModuleId>, last_error: Option<String>) {
        let mut descriptor = self.descriptor.write().unwrap_or_else(PoisonError::into_inner);
        debug!(
            plugin_id = %descriptor.plugin_id,
            from = %descriptor.state,
            to = %state,
            "Plugin state transition"
        );
        descriptor.state = state;
        descriptor.module_id = module;
        descriptor.last_error = last_error;
        descriptor.updated_at = Utc::now();
    }
}

/// Manages the full lifecycle of plugins: load, start, stop, unload.
pub struct PluginManager {
    loader: Arc<dyn ModuleLoader>,
    source: Option<Arc<dyn ArchiveSource>>,
    host: Arc<HostContext>,
    registry: Arc<CapabilityRegistry>,
    bus: Arc<LifecycleEventBus>,
    config: PluginConfig,
    plugins: RwLock<BTreeMap<String, Arc<PluginSlot>>>,
}

impl PluginManager {
    /// Creates a manager with a fresh registry published into a fresh host
    /// context, and the capability registration listener subscribed.
    pub fn new(loader: Arc<dyn ModuleLoader>, config: PluginConfig) -> Self {
        let registry = Arc::new(CapabilityRegistry::new());
        let host = HostContext::with_registry(Arc::clone(&registry));
        let bus = Arc::new(LifecycleEventBus::new());
        bus.subscribe(Arc::new(CapabilityRegistrationListener::new()));

        info!(
            host = %host.id(),
            registry = %registry.instance_id(),
            "Plugin manager created"
        );

        Self {
            loader,
            source: None,
            host,
            registry,
            bus,
            config,
            plugins: RwLock::new(BTreeMap::new()),
        }
    }

    /// Sets where `bootstrap` and `reload_all` discover archives.
    pub fn with_archive_source(mut self, source: Arc<dyn ArchiveSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns the capability registry.
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Returns the lifecycle event bus.
    pub fn bus(&self) -> &Arc<LifecycleEventBus> {
        &self.bus
    }

    /// Returns the host context module contexts link to.
    pub fn host(&self) -> &Arc<HostContext> {
        &self.host
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Builds the archive's module context: `CREATED -> RESOLVED`.
    pub async fn load(&self, archive: ArchiveRef) -> Result<String, LifecycleError> {
        let plugin_id = archive.manifest.id.clone();
        if validate_plugin_id(&plugin_id).is_err() {
            return Err(LoadError::InvalidPluginId(plugin_id).into());
        }

        let (slot, inserted) = {
            let mut plugins = self.plugins.write().await;
            match plugins.get(&plugin_id) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let slot = Arc::new(PluginSlot::new(archive.clone()));
                    plugins.insert(plugin_id.clone(), Arc::clone(&slot));
                    (slot, true)
                }
            }
        };

        let mut module = slot.module.lock().await;
        if !inserted {
            if !slot.state().is_terminal() {
                warn!(plugin_id = %plugin_id, state = %slot.state(), "Plugin already active");
                return Err(crate::error::RegistrationError::DuplicateActive(plugin_id).into());
            }
            slot.replace_archive(archive);
        }

        self.resolve(&slot, &mut module).await?;
        Ok(plugin_id)
    }

    /// Runs the entry point and registers capabilities: `RESOLVED -> STARTED`.
    ///
    /// A plugin in `STOPPED` or `UNLOADED` goes through a fresh
    /// `CREATED -> RESOLVED -> STARTED` cycle with a new module context.
    pub async fn start(&self, plugin_id: &str) -> Result<PluginDescriptor, LifecycleError> {
        let slot = self.slot(plugin_id).await?;
        let mut module = slot.module.lock().await;

        match slot.state() {
            PluginState::Started => {
                debug!(plugin_id = %plugin_id, "Plugin already started");
                return Ok(slot.snapshot());
            }
            PluginState::Resolved => {}
            PluginState::Stopped | PluginState::Unloaded => {
                info!(plugin_id = %plugin_id, "Starting plugin from a fresh module context");
                self.release(&slot, &mut module).await;
                self.resolve(&slot, &mut module).await?;
            }
            from @ (PluginState::Created | PluginState::Failed) => {
                return Err(LifecycleError::InvalidTransition {
                    plugin_id: plugin_id.to_string(),
                    from,
                    operation: "start",
                });
            }
        }

        self.activate(&slot, &mut module).await
    }

    /// Withdraws capabilities and drains: `STARTED -> STOPPED`.
    pub async fn stop(&self, plugin_id: &str) -> Result<PluginDescriptor, LifecycleError> {
        let slot = self.slot(plugin_id).await?;
        let module = slot.module.lock().await;

        match slot.state() {
            PluginState::Started => {}
            PluginState::Stopped | PluginState::Unloaded | PluginState::Resolved => {
                debug!(plugin_id = %plugin_id, state = %slot.state(), "Plugin not started");
                return Ok(slot.snapshot());
            }
            from @ (PluginState::Created | PluginState::Failed) => {
                return Err(LifecycleError::InvalidTransition {
                    plugin_id: plugin_id.to_string(),
                    from,
                    operation: "stop",
                });
            }
        }

        self.deactivate(&slot, module.as_ref()).await;
        Ok(slot.snapshot())
    }

    /// Releases the module context, stopping first if needed: `-> UNLOADED`.
    pub async fn unload(&self, plugin_id: &str) -> Result<PluginDescriptor, LifecycleError> {
        let slot = self.slot(plugin_id).await?;
        let mut module = slot.module.lock().await;

        match slot.state() {
            PluginState::Unloaded | PluginState::Failed => {
                debug!(plugin_id = %plugin_id, state = %slot.state(), "Plugin already released");
                return Ok(slot.snapshot());
            }
            PluginState::Started => self.deactivate(&slot, module.as_ref()).await,
            PluginState::Created | PluginState::Resolved | PluginState::Stopped => {}
        }

        self.release(&slot, &mut module).await;
        info!(plugin_id = %plugin_id, "Plugin unloaded");
        Ok(slot.snapshot())
    }

    /// Snapshots of every known plugin, ordered by id.
    pub async fn list(&self) -> Vec<PluginDescriptor> {
        self.plugins
            .read()
            .await
            .values()
            .map(|slot| slot.snapshot())
            .collect()
    }

    /// Snapshot of one plugin.
    pub async fn get(&self, plugin_id: &str) -> Result<PluginDescriptor, LifecycleError> {
        Ok(self.slot(plugin_id).await?.snapshot())
    }

    /// Loads every archive from the archive source, starting each one when
    /// `auto_start` is set. Failures are logged per plugin.
    pub async fn bootstrap(&self) -> Result<Vec<PluginDescriptor>, LifecycleError> {
        let Some(source) = &self.source else {
            debug!("No archive source configured");
            return Ok(self.list().await);
        };

        let archives = source.discover().await?;
        for archive in archives {
            let plugin_id = archive.manifest.id.clone();
            match self.load(archive).await {
                Ok(_) if self.config.auto_start => {
                    if let Err(e) = self.start(&plugin_id).await {
                        error!(plugin_id = %plugin_id, error = %e, "Plugin start failed");
                    }
                }
                Ok(_) => {}
                Err(e) => error!(plugin_id = %plugin_id, error = %e, "Plugin load failed"),
            }
        }

        let plugins = self.list().await;
        let started = plugins
            .iter()
            .filter(|p| p.state == PluginState::Started)
            .count();
        info!(total = plugins.len(), started, "Plugin bootstrap complete");
        Ok(plugins)
    }

    /// Unloads every plugin, then loads them again from fresh module
    /// contexts.
    ///
    /// With an archive source the source is re-read, so new and changed
    /// archives are picked up. Without one, each previously active plugin is
    /// reloaded from its archive and restarted if it was started.
    pub async fn reload_all(&self) -> Result<Vec<PluginDescriptor>, LifecycleError> {
        info!("Reloading all plugins");

        let previous: Vec<(ArchiveRef, PluginState)> = {
            let plugins = self.plugins.read().await;
            plugins
                .values()
                .map(|slot| (slot.archive(), slot.state()))
                .collect()
        };

        self.unload_all().await;

        if self.source.is_some() {
            return self.bootstrap().await;
        }

        let started: Vec<String> = previous
            .iter()
            .filter(|(_, state)| *state == PluginState::Started)
            .map(|(archive, _)| archive.manifest.id.clone())
            .collect();
        let archives: Vec<ArchiveRef> = previous
            .into_iter()
            .filter(|(_, state)| !state.is_terminal())
            .map(|(archive, _)| archive)
            .collect();

        for archive in order_by_dependencies(archives) {
            let plugin_id = archive.manifest.id.clone();
            if let Err(e) = self.load(archive).await {
                error!(plugin_id = %plugin_id, error = %e, "Plugin reload failed");
                continue;
            }
            if started.contains(&plugin_id) {
                if let Err(e) = self.start(&plugin_id).await {
                    error!(plugin_id = %plugin_id, error = %e, "Plugin restart failed");
                }
            }
        }

        Ok(self.list().await)
    }

    /// Stops and unloads every plugin, dependents first.
    pub async fn shutdown(&self) {
        self.unload_all().await;
        info!("All plugins unloaded");
    }

    async fn unload_all(&self) {
        let archives: Vec<ArchiveRef> = {
            let plugins = self.plugins.read().await;
            plugins.values().map(|slot| slot.archive()).collect()
        };

        for archive in order_by_dependencies(archives).into_iter().rev() {
            let plugin_id = archive.manifest.id;
            if let Err(e) = self.unload(&plugin_id).await {
                error!(plugin_id = %plugin_id, error = %e, "Error unloading plugin");
            }
        }
    }

    async fn slot(&self, plugin_id: &str) -> Result<Arc<PluginSlot>, LifecycleError> {
        self.plugins
            .read()
            .await
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(plugin_id.to_string()))
    }

    async fn state_of(&self, plugin_id: &str) -> Option<PluginState> {
        self.plugins
            .read()
            .await
            .get(plugin_id)
            .map(|slot| slot.state())
    }

    /// `CREATED -> RESOLVED`, or `FAILED`.
    async fn resolve(
        &self,
        slot: &PluginSlot,
        module: &mut Option<ModuleContextHandle>,
    ) -> Result<(), LifecycleError> {
        let archive = slot.archive();
        let plugin_id = archive.manifest.id.clone();
        slot.transition(PluginState::Created, None, None);

        for dependency in &archive.manifest.dependencies {
            if self.state_of(dependency).await != Some(PluginState::Started) {
                let err = LoadError::UnresolvedDependency {
                    plugin_id: plugin_id.clone(),
                    dependency: dependency.clone(),
                };
                warn!(plugin_id = %plugin_id, error = %err, "Plugin resolution failed");
                slot.transition(PluginState::Failed, None, Some(err.to_string()));
                return Err(err.into());
            }
        }

        match self.loader.load_module(&archive, &self.host).await {
            Ok(handle) => {
                info!(
                    plugin_id = %plugin_id,
                    version = %archive.manifest.version,
                    module = %handle.id(),
                    location = %archive.location.display(),
                    "Plugin resolved"
                );
                slot.transition(PluginState::Resolved, Some(handle.id()), None);
                *module = Some(handle);
                Ok(())
            }
            Err(err) => {
                error!(plugin_id = %plugin_id, error = %err, "Plugin load failed");
                slot.transition(PluginState::Failed, None, Some(err.to_string()));
                Err(err.into())
            }
        }
    }

    /// `RESOLVED -> STARTED`, or `FAILED`.
    async fn activate(
        &self,
        slot: &PluginSlot,
        module: &mut Option<ModuleContextHandle>,
    ) -> Result<PluginDescriptor, LifecycleError> {
        let plugin_id = slot.snapshot().plugin_id;
        let Some(handle) = module.clone() else {
            return Err(StartError::ContextReleased { plugin_id }.into());
        };

        let timeout_ms = self.config.start_timeout_ms;
        let activated = tokio::time::timeout(Duration::from_millis(timeout_ms), handle.activate())
            .await
            .unwrap_or_else(|_| {
                Err(StartError::Timeout {
                    plugin_id: plugin_id.clone(),
                    timeout_ms,
                })
            });

        if let Err(err) = activated {
            error!(plugin_id = %plugin_id, error = %err, "Plugin start failed");
            drop(handle);
            self.fail(slot, module, err.to_string()).await;
            return Err(err.into());
        }

        slot.transition(PluginState::Started, Some(handle.id()), None);

        if let Err(err) = self.bus.publish(LifecycleEvent::started(&handle)).await {
            error!(
                plugin_id = %plugin_id,
                error = %err,
                "Capability registration failed, rolling back start"
            );
            self.registry.unregister_all(&plugin_id);
            self.withdraw(&handle).await;
            drop(handle);
            self.fail(slot, module, err.to_string()).await;
            return Err(err.into());
        }

        info!(
            plugin_id = %plugin_id,
            module = %handle.id(),
            hooks = self.registry.count_for(&plugin_id),
            "Plugin started"
        );
        Ok(slot.snapshot())
    }

    /// `STARTED -> STOPPED`: publish, verify withdrawal, drain, stop module.
    async fn deactivate(&self, slot: &PluginSlot, module: Option<&ModuleContextHandle>) {
        let Some(handle) = module else {
            slot.transition(PluginState::Stopped, None, None);
            return;
        };
        let plugin_id = handle.plugin_id().to_string();

        if let Err(err) = self.bus.publish(LifecycleEvent::stopped(handle)).await {
            warn!(plugin_id = %plugin_id, error = %err, "Lifecycle listener failed during stop");
        }

        let leftover = self.registry.count_for(&plugin_id);
        if leftover > 0 {
            warn!(
                plugin_id = %plugin_id,
                leftover,
                "Capabilities still registered after stop event, withdrawing"
            );
            self.registry.unregister_all(&plugin_id);
        }

        self.withdraw(handle).await;
        slot.transition(PluginState::Stopped, Some(handle.id()), None);
        info!(plugin_id = %plugin_id, module = %handle.id(), "Plugin stopped");
    }

    /// Closes the module's drain gate, waits for in-flight hook invocations,
    /// then stops the module and drops its capability instances.
    async fn withdraw(&self, handle: &ModuleContextHandle) {
        let gate = handle.gate();
        gate.close();

        let warn_after = Duration::from_millis(self.config.drain_warn_after_ms.max(1));
        let began = Instant::now();
        loop {
            match tokio::time::timeout(warn_after, gate.drained()).await {
                Ok(()) => break,
                Err(_) => warn!(
                    plugin_id = %handle.plugin_id(),
                    in_flight = gate.in_flight(),
                    waited_ms = began.elapsed().as_millis() as u64,
                    "Still waiting for in-flight hook invocations"
                ),
            }
        }
        debug!(
            plugin_id = %handle.plugin_id(),
            waited_ms = began.elapsed().as_millis() as u64,
            "Module drained"
        );

        if let Err(reason) = handle.deactivate().await {
            warn!(plugin_id = %handle.plugin_id(), error = %reason, "Module stop callback failed");
        }
    }

    /// Hands the module context back to the loader: `-> UNLOADED`.
    async fn release(&self, slot: &PluginSlot, module: &mut Option<ModuleContextHandle>) {
        if let Some(handle) = module.take() {
            self.loader.unload_module(handle).await;
        }
        slot.transition(PluginState::Unloaded, None, None);
    }

    /// Releases whatever module context exists and records the failure.
    async fn fail(&self, slot: &PluginSlot, module: &mut Option<ModuleContextHandle>, reason: String) {
        if let Some(handle) = module.take() {
            self.loader.unload_module(handle).await;
        }
        slot.transition(PluginState::Failed, None, Some(reason));
    }
}
