//! Host-side listener that keeps the capability registry in step with
//! plugin lifecycles.

use async_trait::async_trait;
use tracing::info;

use crate::descriptor::PluginState;
use crate::error::ListenerError;
use crate::events::{LifecycleEvent, LifecycleListener};
use crate::locator::RegistryLocator;

/// Registers a plugin's capabilities when it starts and withdraws them when
/// it stops. The registry is always found through the module context's
/// parent link.
#[derive(Debug, Default)]
pub struct CapabilityRegistrationListener;

impl CapabilityRegistrationListener {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LifecycleListener for CapabilityRegistrationListener {
    fn name(&self) -> &str {
        "capability-registration"
    }

    async fn on_event(&self, event: &LifecycleEvent) -> Result<(), ListenerError> {
        let registry = RegistryLocator::locate(&event.module)?;

        match event.to_state {
            PluginState::Started => {
                registry.admit(&event.plugin_id);
                let handles = event.module.hook_handles();
                let count = handles.len();
                for (name, handle) in handles {
                    registry.register(&event.plugin_id, &name, handle)?;
                }
                info!(
                    plugin_id = %event.plugin_id,
                    module = %event.module.id(),
                    registry = %registry.instance_id(),
                    count,
                    "Plugin capabilities registered"
                );
            }
            PluginState::Stopped => {
                let removed = registry.unregister_all(&event.plugin_id);
                info!(
                    plugin_id = %event.plugin_id,
                    module = %event.module.id(),
                    registry = %registry.instance_id(),
                    removed,
                    "Plugin capabilities withdrawn"
                );
            }
            _ => {}
        }
        Ok(())
    }
}
