//! Messages delivered to subscribers.

use rkyv::{Archive, Deserialize, Serialize};

use crate::event::{ChangeEvent, MutationKind};
use crate::value::Value;
use crate::Error;

/// Message key holding the entity identifier.
pub const UUID_KEY: &str = "uuid";

/// Message key holding the entity's runtime type name.
pub const CLASSNAME_KEY: &str = "classname";

/// Message key holding the mutation kind.
pub const ACTION_KEY: &str = "action";

/// One key/value pair of an [`EventMessage`].
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct MessageEntry {
    /// Entry key.
    pub key: String,
    /// Entry value.
    pub value: Value,
}

/// An insertion-ordered map of string keys to values.
///
/// Entity change messages carry exactly `uuid`, `classname` and `action`;
/// topic messages carry whatever the publisher put in.
#[derive(Debug, Clone, Default, PartialEq, Archive, Serialize, Deserialize)]
pub struct EventMessage {
    entries: Vec<MessageEntry>,
}

impl EventMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the fixed three-field message for an entity change.
    pub fn for_change(event: &ChangeEvent) -> Self {
        Self::new()
            .with(UUID_KEY, event.entity.id.as_str())
            .with(CLASSNAME_KEY, event.entity.type_name.as_str())
            .with(ACTION_KEY, event.kind.as_str())
    }

    /// Insert or replace a value, keeping the original position of an
    /// existing key.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(MessageEntry { key, value }),
        }
    }

    /// Builder-style [`put`](Self::put).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.put(key, value);
        self
    }

    /// Look up a value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .map(|entry| (entry.key.as_str(), &entry.value))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the message has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entity identifier of a change message.
    pub fn uuid(&self) -> Option<&str> {
        self.get(UUID_KEY).and_then(Value::as_str)
    }

    /// Entity type name of a change message.
    pub fn classname(&self) -> Option<&str> {
        self.get(CLASSNAME_KEY).and_then(Value::as_str)
    }

    /// Mutation kind of a change message.
    pub fn action(&self) -> Option<MutationKind> {
        self.get(ACTION_KEY)
            .and_then(Value::as_str)
            .and_then(|action| action.parse().ok())
    }

    /// Serialize with rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| Error::Serialization(format!("failed to serialize message: {}", e)))
    }

    /// Deserialize from rkyv bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        // rkyv needs an aligned buffer for validated access
        let mut aligned: rkyv::util::AlignedVec<16> = rkyv::util::AlignedVec::new();
        aligned.extend_from_slice(bytes);

        rkyv::from_bytes::<EventMessage, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(format!("failed to deserialize message: {}", e)))
    }
}
