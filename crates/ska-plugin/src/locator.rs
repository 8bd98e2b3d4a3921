//! Host context and the registry locator.
//!
//! The host publishes its capability registry into named slots of a
//! [`HostContext`]. Module contexts keep a weak parent link to it, and
//! [`RegistryLocator`] follows that link. Nothing here ever creates a
//! registry: a missing link or slot is an error.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::error::LocatorError;
use crate::module::ModuleContext;
use crate::registry::CapabilityRegistry;

/// Slot the host publishes its [`CapabilityRegistry`] under.
pub const REGISTRY_SLOT: &str = "ska.capability-registry";

type SlotValue = Arc<dyn Any + Send + Sync>;

/// The host-side parent of every module context.
pub struct HostContext {
    id: Uuid,
    slots: RwLock<HashMap<&'static str, SlotValue>>,
}

impl HostContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            slots: RwLock::new(HashMap::new()),
        })
    }

    /// Creates a host context with `registry` already published.
    pub fn with_registry(registry: Arc<CapabilityRegistry>) -> Arc<Self> {
        let host = Self::new();
        host.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(REGISTRY_SLOT, registry);
        host
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Publishes `value` under `slot`. A slot can be filled once.
    pub fn publish<T>(&self, slot: &'static str, value: Arc<T>) -> Result<(), LocatorError>
    where
        T: Any + Send + Sync,
    {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(slot) {
            return Err(LocatorError::SlotOccupied { slot });
        }
        slots.insert(slot, value);
        debug!(host = %self.id, slot, "Host slot published");
        Ok(())
    }

    /// Returns the value under `slot` if it has type `T`.
    pub fn lookup<T>(&self, slot: &'static str) -> Result<Arc<T>, LocatorError>
    where
        T: Any + Send + Sync,
    {
        let value = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot)
            .cloned()
            .ok_or(LocatorError::SlotEmpty { slot })?;
        value
            .downcast::<T>()
            .map_err(|_| LocatorError::SlotTypeMismatch { slot })
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<&'static str> = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        f.debug_struct("HostContext")
            .field("id", &self.id)
            .field("slots", &slots)
            .finish()
    }
}

/// Finds the host's registry from inside a module context.
pub struct RegistryLocator;

impl RegistryLocator {
    /// Follows the module context's parent link to the host's registry.
    pub fn locate(from: &ModuleContext) -> Result<Arc<CapabilityRegistry>, LocatorError> {
        let module = from.id();
        let host = from
            .parent_link()
            .ok_or(LocatorError::NoParentLink { module })?
            .upgrade()
            .ok_or(LocatorError::HostGone { module })?;
        host.lookup::<CapabilityRegistry>(REGISTRY_SLOT)
    }
}
