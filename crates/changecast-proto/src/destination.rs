//! Addressable publish/subscribe targets.

use std::fmt;

use crate::event::MutationKind;

/// Separator between the action and the type name in entity topics.
pub const DELIMITER: char = ':';

/// A pub/sub destination.
///
/// Entity destinations are encoded as `"<ACTION>:<type name>"`; plain
/// topics use their name verbatim. Identity is the encoded topic string,
/// so every component that builds a destination from the same inputs
/// addresses the same target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination {
    topic: String,
}

impl Destination {
    /// Destination for changes of `kind` to entities of type `type_name`.
    pub fn for_entity(type_name: &str, kind: MutationKind) -> Self {
        Self {
            topic: format!("{}{}{}", kind.as_str(), DELIMITER, type_name),
        }
    }

    /// Destination for an arbitrary named topic.
    pub fn topic(name: impl Into<String>) -> Self {
        Self { topic: name.into() }
    }

    /// The encoded topic name.
    pub fn topic_name(&self) -> &str {
        &self.topic
    }

    /// The action prefix of an entity destination.
    ///
    /// Returns `None` when the topic carries no delimiter.
    pub fn action(&self) -> Option<&str> {
        self.topic
            .find(DELIMITER)
            .map(|index| &self.topic[..index])
    }

    /// The mutation kind of an entity destination, if the action prefix
    /// names one.
    pub fn kind(&self) -> Option<MutationKind> {
        self.action().and_then(|action| action.parse().ok())
    }

    /// The type name of an entity destination.
    pub fn type_name(&self) -> Option<&str> {
        self.kind()?;
        self.topic
            .find(DELIMITER)
            .map(|index| &self.topic[index + DELIMITER.len_utf8()..])
    }

    /// Check if the topic is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.topic.trim().is_empty()
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.topic)
    }
}
