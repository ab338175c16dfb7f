//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Change tracking or type resolution error.
    #[error("core error: {0}")]
    Core(#[from] changecast_core::Error),

    /// Type universe scan error.
    #[error("type scan failed: {0}")]
    Scan(#[from] changecast_core::ScanError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] changecast_proto::Error),

    /// Destination cannot be addressed.
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    /// Broker bootstrap failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
