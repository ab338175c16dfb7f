//! Per-unit-of-work event buffers.

use std::collections::HashSet;

use changecast_proto::{ChangeEvent, MutationKind};

/// Events accumulated by one unit of work.
///
/// Recording order is kept; recording the same event twice is a no-op.
#[derive(Debug, Default)]
pub(crate) struct ChangeFrame {
    events: Vec<ChangeEvent>,
    seen: HashSet<ChangeEvent>,
}

impl ChangeFrame {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record an event. Returns false if it was already present.
    pub(crate) fn record(&mut self, event: ChangeEvent) -> bool {
        if self.seen.contains(&event) {
            return false;
        }
        self.seen.insert(event.clone());
        self.events.push(event);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.events.len()
    }

    /// Reduce the frame to the events it should emit.
    pub(crate) fn reduce(&self) -> Vec<ChangeEvent> {
        let mut ordered = self.events.clone();
        // Stable: events of the same kind keep their recording order
        ordered.sort_by_key(|event| event.kind.precedence());
        reduce(ordered)
    }
}

/// Deduplicate a sequence of events, letting creations and purges absorb
/// updates of the same entity.
///
/// - An `UPDATED` is dropped when a `CREATED` or `PURGED` for the same
///   entity was already accepted.
/// - A `PURGED` removes an already accepted `UPDATED` for the same entity.
/// - `CREATED` and `PURGED` for the same entity are both kept.
///
/// Order of the surviving events follows the input.
pub fn reduce(incoming: impl IntoIterator<Item = ChangeEvent>) -> Vec<ChangeEvent> {
    let mut accepted: Vec<ChangeEvent> = Vec::new();
    let mut present: HashSet<ChangeEvent> = HashSet::new();

    for event in incoming {
        let mut absorbed = present.contains(&event);

        if !absorbed && event.kind == MutationKind::Updated {
            absorbed = present.contains(&event.with_kind(MutationKind::Created))
                || present.contains(&event.with_kind(MutationKind::Purged));
        }

        if !absorbed && event.kind == MutationKind::Purged {
            let update = event.with_kind(MutationKind::Updated);
            if present.remove(&update) {
                accepted.retain(|existing| existing != &update);
            }
        }

        if !absorbed {
            present.insert(event.clone());
            accepted.push(event);
        }
    }

    accepted
}
