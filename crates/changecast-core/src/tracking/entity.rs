//! What the persistence layer hands the tracker.

use changecast_proto::{EntityRef, Value};

use crate::types::Capability;

/// A persisted entity as seen by the tracker.
pub trait Entity {
    /// Runtime type and identifier.
    fn entity_ref(&self) -> EntityRef;

    /// Declared lifecycle flag.
    fn capability(&self) -> Capability {
        Capability::None
    }
}

impl Entity for EntityRef {
    fn entity_ref(&self) -> EntityRef {
        self.clone()
    }
}

impl Entity for (EntityRef, Capability) {
    fn entity_ref(&self) -> EntityRef {
        self.0.clone()
    }

    fn capability(&self) -> Capability {
        self.1
    }
}

/// Previous and current value of one flushed field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDelta {
    /// Field name.
    pub field: String,
    /// Value before the flush.
    pub previous: Value,
    /// Value after the flush.
    pub current: Value,
}

impl FieldDelta {
    /// Create a new field delta.
    pub fn new(field: impl Into<String>, previous: impl Into<Value>, current: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            previous: previous.into(),
            current: current.into(),
        }
    }
}
