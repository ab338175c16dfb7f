//! changecast core - change aggregation and type hierarchy resolution.
//!
//! This crate has no transport dependencies. It turns persistence callbacks
//! into reduced, ordered change sets ([`tracking`]) and expands subscriptions
//! on a base type into its concrete subtypes ([`types`]).

pub mod error;
pub mod tracking;
pub mod types;

pub use error::{Error, ScanError};
pub use tracking::{
    ChangeSink, ChangeTracker, Completion, Entity, FieldDelta, Outcome, Propagation,
    TransactionCommitted,
};
pub use types::{
    Capability, CapabilityLookup, ManifestSource, ResolutionSession, SharedTypeRegistry, TypeDef,
    TypeRegistry, TypeSource,
};

/// Re-export protocol types.
pub use changecast_proto as proto;
