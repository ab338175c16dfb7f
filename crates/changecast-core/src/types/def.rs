//! Type definitions.

use serde::{Deserialize, Serialize};

use changecast_proto::MutationKind;

/// Lifecycle flag an entity type declares, if any.
///
/// An entity is retirable or voidable, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    /// No lifecycle flag.
    #[default]
    None,
    /// Carries a boolean `retired` field.
    Retirable,
    /// Carries a boolean `voided` field.
    Voidable,
}

impl Capability {
    /// Name of the flag field this capability watches.
    pub fn flag_field(&self) -> Option<&'static str> {
        match self {
            Capability::None => None,
            Capability::Retirable => Some("retired"),
            Capability::Voidable => Some("voided"),
        }
    }

    /// Kind derived from a flag transition, if the flag flipped.
    pub fn transition(&self, previous: bool, current: bool) -> Option<MutationKind> {
        if previous == current {
            return None;
        }
        match (self, current) {
            (Capability::Retirable, true) => Some(MutationKind::Retired),
            (Capability::Retirable, false) => Some(MutationKind::Unretired),
            (Capability::Voidable, true) => Some(MutationKind::Voided),
            (Capability::Voidable, false) => Some(MutationKind::Unvoided),
            (Capability::None, _) => None,
        }
    }
}

/// A persisted type known to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// Fully-qualified type name.
    pub name: String,
    /// Direct supertypes (base types and implemented interfaces).
    #[serde(default, rename = "extends")]
    pub parents: Vec<String>,
    /// Abstract types are never instantiated and never resolved.
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    /// Declared lifecycle flag.
    #[serde(default)]
    pub capability: Capability,
}

impl TypeDef {
    /// A concrete (instantiable) type.
    pub fn concrete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            is_abstract: false,
            capability: Capability::None,
        }
    }

    /// An abstract type or interface.
    pub fn abstract_type(name: impl Into<String>) -> Self {
        Self {
            is_abstract: true,
            ..Self::concrete(name)
        }
    }

    /// Add a direct supertype.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Declare a lifecycle capability.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capability = capability;
        self
    }

    /// Check if instances of this type can exist.
    pub fn is_concrete(&self) -> bool {
        !self.is_abstract
    }
}
