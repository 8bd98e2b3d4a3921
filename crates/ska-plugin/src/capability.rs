//! Capabilities: the named request hooks a plugin contributes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::hooks::filter::RequestFilter;
use crate::hooks::interceptor::RequestInterceptor;

/// Kind of request hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Wraps the whole request, including the rest of the host pipeline.
    Filter,
    /// Wraps only the business handler.
    Interceptor,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter => write!(f, "filter"),
            Self::Interceptor => write!(f, "interceptor"),
        }
    }
}

/// A capability a module promises to produce when started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDecl {
    pub name: String,
    pub kind: CapabilityKind,
}

impl CapabilityDecl {
    pub fn filter(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CapabilityKind::Filter,
        }
    }

    pub fn interceptor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: CapabilityKind::Interceptor,
        }
    }
}

/// A live hook object owned by its module context.
#[derive(Clone)]
pub enum CapabilityInstance {
    Filter(Arc<dyn RequestFilter>),
    Interceptor(Arc<dyn RequestInterceptor>),
}

impl CapabilityInstance {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Self::Filter(_) => CapabilityKind::Filter,
            Self::Interceptor(_) => CapabilityKind::Interceptor,
        }
    }
}

impl fmt::Debug for CapabilityInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityInstance::{}", self.kind())
    }
}

/// A named capability instance.
#[derive(Debug, Clone)]
pub struct Capability {
    pub name: String,
    pub instance: CapabilityInstance,
}

/// Capabilities materialized by a module's entry point, in declaration
/// order.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    items: Vec<Capability>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter.
    pub fn filter(mut self, name: impl Into<String>, filter: Arc<dyn RequestFilter>) -> Self {
        self.items.push(Capability {
            name: name.into(),
            instance: CapabilityInstance::Filter(filter),
        });
        self
    }

    /// Adds an interceptor.
    pub fn interceptor(
        mut self,
        name: impl Into<String>,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> Self {
        self.items.push(Capability {
            name: name.into(),
            instance: CapabilityInstance::Interceptor(interceptor),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<Capability> {
        self.items
    }
}
