//! Type universe and polymorphic subscription support.
//!
//! The host application describes its persisted types once, at startup, as a
//! set of [`TypeDef`]s. A [`ResolutionSession`] turns a base type into the
//! concrete subtypes a subscription has to cover, caching results until the
//! session is released.

mod def;
mod manifest;
mod registry;
mod resolver;

pub use def::{Capability, TypeDef};
pub use manifest::ManifestSource;
pub use registry::{CapabilityLookup, SharedTypeRegistry, TypeRegistry, TypeSource};
pub use resolver::ResolutionSession;
