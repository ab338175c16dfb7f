//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Invalid message format.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Topic name that cannot be addressed on the wire.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Unrecognized mutation kind name.
    #[error("unknown mutation kind: {0}")]
    UnknownKind(String),
}
