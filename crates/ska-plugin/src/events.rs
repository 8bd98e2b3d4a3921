//! Lifecycle event bus.
//!
//! Delivery is synchronous: `publish` awaits every listener, in
//! subscription order, before it returns. When the manager's `start`
//! returns, the plugin's hooks are therefore already in the registry.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::descriptor::PluginState;
use crate::error::ListenerError;
use crate::module::ModuleContextHandle;

/// A plugin entered `STARTED` or `STOPPED`.
#[derive(Clone)]
pub struct LifecycleEvent {
    /// Plugin id.
    pub plugin_id: String,
    /// The state being entered.
    pub to_state: PluginState,
    /// The plugin's module context.
    pub module: ModuleContextHandle,
    /// When the event was published.
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleEvent {
    pub fn new(plugin_id: impl Into<String>, to_state: PluginState, module: ModuleContextHandle) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            to_state,
            module,
            occurred_at: Utc::now(),
        }
    }

    pub fn started(module: &ModuleContextHandle) -> Self {
        Self::new(module.plugin_id(), PluginState::Started, module.clone())
    }

    pub fn stopped(module: &ModuleContextHandle) -> Self {
        Self::new(module.plugin_id(), PluginState::Stopped, module.clone())
    }
}

impl fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEvent")
            .field("plugin_id", &self.plugin_id)
            .field("to_state", &self.to_state)
            .field("module", &self.module.id())
            .field("occurred_at", &self.occurred_at)
            .finish()
    }
}

/// Reacts to lifecycle events.
#[async_trait]
pub trait LifecycleListener: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn on_event(&self, event: &LifecycleEvent) -> Result<(), ListenerError>;
}

/// Single-process publish/subscribe for lifecycle events.
#[derive(Default)]
pub struct LifecycleEventBus {
    listeners: RwLock<Vec<Arc<dyn LifecycleListener>>>,
}

impl LifecycleEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener after the existing ones.
    pub fn subscribe(&self, listener: Arc<dyn LifecycleListener>) {
        debug!(listener = listener.name(), "Lifecycle listener subscribed");
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers `event` to every listener in subscription order. Every
    /// listener runs even if an earlier one failed; the first error is
    /// returned.
    pub async fn publish(&self, event: LifecycleEvent) -> Result<(), ListenerError> {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        debug!(
            plugin_id = %event.plugin_id,
            to_state = %event.to_state,
            listeners = listeners.len(),
            "Publishing lifecycle event"
        );

        let mut first_error = None;
        for listener in &listeners {
            if let Err(err) = listener.on_event(&event).await {
                error!(
                    plugin_id = %event.plugin_id,
                    to_state = %event.to_state,
                    listener = listener.name(),
                    error = %err,
                    "Lifecycle listener failed"
                );
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
