//! changecast protocol types.
//!
//! This crate defines the data model shared by every changecast component:
//!
//! - [`event`] - Entity references, mutation kinds and change events
//! - [`destination`] - Pub/sub destinations and their topic encoding
//! - [`message`] - Messages delivered to subscribers
//! - [`value`] - Payload values
//! - [`framing`] - Topic framing for remote transports
//! - [`error`] - Protocol error types
//!
//! Messages derive `rkyv::Archive`, `rkyv::Serialize` and
//! `rkyv::Deserialize` so they can cross process boundaries unchanged.

pub mod destination;
pub mod error;
pub mod event;
pub mod framing;
pub mod message;
pub mod value;

pub use destination::{Destination, DELIMITER};
pub use error::Error;
pub use event::{ChangeEvent, EntityRef, MutationKind};
pub use message::EventMessage;
pub use value::Value;
