//! Core error types.

use std::path::PathBuf;

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The type universe could not be scanned.
    #[error("type scan failed: {0}")]
    Scan(#[from] ScanError),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] changecast_proto::Error),

    /// A persistence callback arrived with no unit of work open.
    #[error("no active unit of work")]
    NoActiveUnitOfWork,

    /// Handing committed changes to the sink failed.
    #[error("change sink error: {0}")]
    Sink(String),
}

/// Failures while scanning or indexing the type universe.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Reading a type manifest failed.
    #[error("failed to read type manifest {path}: {source}")]
    Io {
        /// Manifest location.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A type manifest could not be parsed.
    #[error("malformed type manifest: {0}")]
    Manifest(String),

    /// The requested base type is not part of the universe.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A type names a parent that is not part of the universe.
    #[error("type {type_name} extends unknown type {parent}")]
    UnknownParent {
        /// The declaring type.
        type_name: String,
        /// The missing parent.
        parent: String,
    },

    /// A type is declared more than once.
    #[error("duplicate type: {0}")]
    DuplicateType(String),

    /// A type name cannot be used to address destinations.
    #[error("invalid type name: {0:?}")]
    InvalidTypeName(String),

    /// A type is its own ancestor.
    #[error("inheritance cycle through {0}")]
    Cycle(String),
}
