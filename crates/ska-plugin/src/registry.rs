//! Capability registry: the host-wide index of request hooks.
//!
//! Keys are `"<pluginId>:<capabilityName>"`. The registry holds only weak
//! references to hook objects; the module context that produced them owns
//! them. Every lookup returns a snapshot in registration order, so a request
//! never observes a half-applied registration or withdrawal.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::capability::{CapabilityInstance, CapabilityKind};
use crate::drain::{DrainGate, DrainPermit};
use crate::error::RegistrationError;
use crate::hooks::filter::RequestFilter;
use crate::hooks::interceptor::RequestInterceptor;

/// Separator between plugin id and capability name in registry keys.
pub const KEY_SEPARATOR: char = ':';

/// Returns `Ok` when `plugin_id` can prefix registry keys unambiguously.
pub fn validate_plugin_id(plugin_id: &str) -> Result<(), RegistrationError> {
    if plugin_id.is_empty() || plugin_id.contains(KEY_SEPARATOR) {
        return Err(RegistrationError::InvalidPluginId(plugin_id.to_string()));
    }
    Ok(())
}

/// Composite registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityKey {
    pub plugin_id: String,
    pub name: String,
}

impl CapabilityKey {
    pub fn new(plugin_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for CapabilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.plugin_id, KEY_SEPARATOR, self.name)
    }
}

/// Non-owning reference to a hook object.
#[derive(Clone)]
pub enum HookTarget {
    Filter(Weak<dyn RequestFilter>),
    Interceptor(Weak<dyn RequestInterceptor>),
}

/// What the registry stores for a capability: a weak reference to the hook
/// and the drain gate of the module context that owns it.
#[derive(Clone)]
pub struct HookHandle {
    target: HookTarget,
    gate: Arc<DrainGate>,
}

impl HookHandle {
    /// Builds a handle that does not keep `instance` alive.
    pub fn new(instance: &CapabilityInstance, gate: Arc<DrainGate>) -> Self {
        let target = match instance {
            CapabilityInstance::Filter(filter) => HookTarget::Filter(Arc::downgrade(filter)),
            CapabilityInstance::Interceptor(interceptor) => {
                HookTarget::Interceptor(Arc::downgrade(interceptor))
            }
        };
        Self { target, gate }
    }

    pub fn kind(&self) -> CapabilityKind {
        match self.target {
            HookTarget::Filter(_) => CapabilityKind::Filter,
            HookTarget::Interceptor(_) => CapabilityKind::Interceptor,
        }
    }

    /// Admits one filter invocation. `None` when the owning context is
    /// draining, already gone, or the handle is not a filter.
    pub fn acquire_filter(&self) -> Option<(Arc<dyn RequestFilter>, DrainPermit)> {
        let HookTarget::Filter(weak) = &self.target else {
            return None;
        };
        let permit = self.gate.try_enter()?;
        Some((weak.upgrade()?, permit))
    }

    /// Admits one interceptor invocation. See [`HookHandle::acquire_filter`].
    pub fn acquire_interceptor(&self) -> Option<(Arc<dyn RequestInterceptor>, DrainPermit)> {
        let HookTarget::Interceptor(weak) = &self.target else {
            return None;
        };
        let permit = self.gate.try_enter()?;
        Some((weak.upgrade()?, permit))
    }

    /// Whether the owning module context still holds the hook object.
    pub fn is_live(&self) -> bool {
        match &self.target {
            HookTarget::Filter(weak) => weak.strong_count() > 0,
            HookTarget::Interceptor(weak) => weak.strong_count() > 0,
        }
    }
}

impl fmt::Debug for HookHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookHandle")
            .field("kind", &self.kind())
            .field("live", &self.is_live())
            .field("in_flight", &self.gate.in_flight())
            .finish()
    }
}

/// A registry entry as seen by the chains.
#[derive(Debug, Clone)]
pub struct RegisteredHook {
    /// Composite key.
    pub key: CapabilityKey,
    /// Registration sequence number; chains run hooks in ascending order.
    pub sequence: u64,
    /// Weak hook reference plus drain gate.
    pub handle: HookHandle,
}

impl RegisteredHook {
    pub fn kind(&self) -> CapabilityKind {
        self.handle.kind()
    }
}

#[derive(Default)]
struct RegistryState {
    /// Sequence -> entry; iteration order is registration order.
    entries: BTreeMap<u64, RegisteredHook>,
    /// Key -> sequence.
    index: HashMap<CapabilityKey, u64>,
    /// Plugins whose hooks were withdrawn and that have not been re-admitted.
    withdrawn: HashSet<String>,
}

/// Host-wide registry of request hooks keyed by `pluginId:name`.
pub struct CapabilityRegistry {
    instance_id: Uuid,
    state: RwLock<RegistryState>,
    next_sequence: AtomicU64,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            state: RwLock::new(RegistryState::default()),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Identifies this registry instance in diagnostics.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Registers or replaces the hook under `pluginId:name`.
    ///
    /// Replacing keeps the original sequence number, so the hook keeps its
    /// position in the chain. Returns the sequence number.
    pub fn register(
        &self,
        plugin_id: &str,
        name: &str,
        handle: HookHandle,
    ) -> Result<u64, RegistrationError> {
        validate_plugin_id(plugin_id)?;
        if name.is_empty() {
            return Err(RegistrationError::EmptyName(plugin_id.to_string()));
        }

        let key = CapabilityKey::new(plugin_id, name);
        let kind = handle.kind();
        let mut state = self.write();

        if state.withdrawn.contains(plugin_id) {
            return Err(RegistrationError::PluginWithdrawn(plugin_id.to_string()));
        }

        if let Some(&sequence) = state.index.get(&key) {
            if let Some(entry) = state.entries.get_mut(&sequence) {
                entry.handle = handle;
            }
            debug!(key = %key, kind = %kind, sequence, "Capability replaced");
            return Ok(sequence);
        }

        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        debug!(key = %key, kind = %kind, sequence, "Capability registered");
        state.index.insert(key.clone(), sequence);
        state.entries.insert(
            sequence,
            RegisteredHook {
                key,
                sequence,
                handle,
            },
        );
        Ok(sequence)
    }

    /// Allows a previously withdrawn plugin to register again.
    pub fn admit(&self, plugin_id: &str) {
        self.write().withdrawn.remove(plugin_id);
    }

    /// Removes every hook registered by `plugin_id` in one step and refuses
    /// further registrations for it until [`CapabilityRegistry::admit`].
    ///
    /// Removal matches on the plugin id component of the key, never on a
    /// string prefix, so `"a"` does not touch hooks of `"ab"`.
    pub fn unregister_all(&self, plugin_id: &str) -> usize {
        let mut state = self.write();
        let RegistryState {
            entries,
            index,
            withdrawn,
        } = &mut *state;

        let before = entries.len();
        entries.retain(|_, entry| entry.key.plugin_id != plugin_id);
        index.retain(|key, _| key.plugin_id != plugin_id);
        withdrawn.insert(plugin_id.to_string());
        let removed = before - entries.len();

        info!(plugin_id = %plugin_id, removed, "Capabilities unregistered");
        removed
    }

    /// Snapshot of the hooks of `kind`, in registration order.
    pub fn list_by_kind(&self, kind: CapabilityKind) -> Vec<RegisteredHook> {
        self.read()
            .entries
            .values()
            .filter(|entry| entry.kind() == kind)
            .cloned()
            .collect()
    }

    /// Snapshot of every hook, in registration order.
    pub fn entries(&self) -> Vec<RegisteredHook> {
        self.read().entries.values().cloned().collect()
    }

    /// Number of hooks currently registered by `plugin_id`.
    pub fn count_for(&self, plugin_id: &str) -> usize {
        self.read()
            .entries
            .values()
            .filter(|entry| entry.key.plugin_id == plugin_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("instance_id", &self.instance_id)
            .field("len", &self.len())
            .finish()
    }
}
