//! In-memory type registry.

use std::sync::Arc;

use parking_lot::RwLock;

use super::def::{Capability, TypeDef};
use crate::error::ScanError;

/// Something that can enumerate the current type universe.
///
/// Scanning may be expensive; callers go through a
/// [`ResolutionSession`](super::ResolutionSession), which scans at most once.
pub trait TypeSource: Send + Sync {
    /// Enumerate every known type.
    fn scan(&self) -> Result<Vec<TypeDef>, ScanError>;
}

/// Declared lifecycle capability of a type, by name.
pub trait CapabilityLookup: Send + Sync {
    /// Capability declared for `type_name`, `Capability::None` if unknown.
    fn capability_of(&self, type_name: &str) -> Capability;
}

/// Registry of the types known to the host application.
///
/// Built once at startup; modules loaded later may register more types.
/// Sessions opened after a registration see it, sessions already open do
/// not.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: RwLock<Vec<TypeDef>>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from everything `source` currently knows.
    pub fn load(source: &dyn TypeSource) -> Result<Self, ScanError> {
        let types = source.scan()?;
        tracing::debug!(types = types.len(), "type registry loaded");
        Ok(Self {
            types: RwLock::new(types),
        })
    }

    /// Add a type, builder style.
    pub fn with_type(self, def: TypeDef) -> Self {
        self.register(def);
        self
    }

    /// Add or replace a type.
    pub fn register(&self, def: TypeDef) {
        let mut types = self.types.write();
        match types.iter_mut().find(|existing| existing.name == def.name) {
            Some(existing) => *existing = def,
            None => types.push(def),
        }
    }

    /// Remove a type by name. Returns true if it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let mut types = self.types.write();
        let before = types.len();
        types.retain(|def| def.name != name);
        types.len() != before
    }

    /// Look up a type by name.
    pub fn get(&self, name: &str) -> Option<TypeDef> {
        self.types.read().iter().find(|def| def.name == name).cloned()
    }

    /// Declared capability of a type, `Capability::None` if unknown.
    pub fn capability_of(&self, name: &str) -> Capability {
        self.types
            .read()
            .iter()
            .find(|def| def.name == name)
            .map(|def| def.capability)
            .unwrap_or_default()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    /// Check if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}

impl CapabilityLookup for TypeRegistry {
    fn capability_of(&self, type_name: &str) -> Capability {
        TypeRegistry::capability_of(self, type_name)
    }
}

impl TypeSource for TypeRegistry {
    fn scan(&self) -> Result<Vec<TypeDef>, ScanError> {
        Ok(self.types.read().clone())
    }
}

/// Shared registry handle.
pub type SharedTypeRegistry = Arc<TypeRegistry>;
