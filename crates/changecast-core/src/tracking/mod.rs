//! Transaction-scoped change tracking.
//!
//! The persistence layer drives a [`ChangeTracker`] through one or more
//! nested units of work:
//!
//! ```text
//! begin() → on_create / on_update / on_delete / on_collection_change → end(outcome)
//!                                                                          │
//!                  committed, outermost or independent ────────────────────┤→ ChangeSink
//!                  committed, joined to a parent ──────────────────────────┤→ parent frame
//!                  rolled back ────────────────────────────────────────────┘→ discarded
//! ```

mod entity;
mod frame;
mod tracker;

pub use entity::{Entity, FieldDelta};
pub use frame::reduce;
pub use tracker::{ChangeSink, ChangeTracker, Completion, Outcome, Propagation, TransactionCommitted};
