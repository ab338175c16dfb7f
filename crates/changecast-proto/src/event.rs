//! Entity references, mutation kinds and change events.

use std::fmt;
use std::str::FromStr;

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::Error;

/// Lifecycle transitions recognized for persisted entities.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MutationKind {
    /// A new entity was persisted.
    Created,
    /// An existing entity was modified.
    Updated,
    /// A retirable entity's `retired` flag went from false to true.
    Retired,
    /// A retirable entity's `retired` flag went from true to false.
    Unretired,
    /// A voidable entity's `voided` flag went from false to true.
    Voided,
    /// A voidable entity's `voided` flag went from true to false.
    Unvoided,
    /// An entity was physically deleted.
    Purged,
}

impl MutationKind {
    /// Every kind, in declaration order.
    pub const ALL: [MutationKind; 7] = [
        MutationKind::Created,
        MutationKind::Updated,
        MutationKind::Retired,
        MutationKind::Unretired,
        MutationKind::Voided,
        MutationKind::Unvoided,
        MutationKind::Purged,
    ];

    /// Wire name of this kind, as used in topic names and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Created => "CREATED",
            MutationKind::Updated => "UPDATED",
            MutationKind::Retired => "RETIRED",
            MutationKind::Unretired => "UNRETIRED",
            MutationKind::Voided => "VOIDED",
            MutationKind::Unvoided => "UNVOIDED",
            MutationKind::Purged => "PURGED",
        }
    }

    /// Publish precedence when a committed frame is flushed.
    ///
    /// Purges go out first, then creations, updates, and finally the
    /// derived flag transitions.
    pub fn precedence(&self) -> u8 {
        match self {
            MutationKind::Purged => 0,
            MutationKind::Created => 1,
            MutationKind::Updated => 2,
            MutationKind::Retired => 3,
            MutationKind::Unretired => 4,
            MutationKind::Voided => 5,
            MutationKind::Unvoided => 6,
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MutationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MutationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// Reference to a persisted entity: its runtime type and unique identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Archive, Serialize, Deserialize)]
pub struct EntityRef {
    /// Fully-qualified runtime type name (e.g. `org.example.Patient`).
    pub type_name: String,
    /// Unique identifier of the entity.
    pub id: String,
}

impl EntityRef {
    /// Create a new entity reference.
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    /// Type name without its namespace prefix.
    pub fn simple_name(&self) -> &str {
        self.type_name
            .rsplit('.')
            .next()
            .unwrap_or(&self.type_name)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.simple_name(), self.id)
    }
}

/// A classified change to one entity.
///
/// Two events are equal when they name the same entity and the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Archive, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The entity that changed.
    pub entity: EntityRef,
    /// What happened to it.
    pub kind: MutationKind,
}

impl ChangeEvent {
    /// Create a new change event.
    pub fn new(entity: EntityRef, kind: MutationKind) -> Self {
        Self { entity, kind }
    }

    /// Same entity, different kind.
    pub fn with_kind(&self, kind: MutationKind) -> Self {
        Self {
            entity: self.entity.clone(),
            kind,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.entity)
    }
}
