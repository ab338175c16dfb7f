//! Unit-of-work change tracker.

use std::sync::Arc;

use changecast_proto::{ChangeEvent, MutationKind};

use super::entity::{Entity, FieldDelta};
use super::frame::ChangeFrame;
use crate::error::Error;
use crate::types::{Capability, CapabilityLookup};

/// How a unit of work ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The unit of work committed.
    Committed,
    /// The unit of work rolled back.
    RolledBack,
}

/// How a nested unit of work relates to the one enclosing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// An independent sub-transaction: its events are emitted when it
    /// commits, whatever happens to the enclosing unit of work later.
    #[default]
    Independent,
    /// A scope joined to the enclosing unit of work: its committed events
    /// are merged into the parent frame and emitted only if the parent
    /// commits.
    Joined,
}

/// Events of a committed unit of work, reduced and in publish order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionCommitted {
    events: Vec<ChangeEvent>,
}

impl TransactionCommitted {
    /// Wrap already reduced events.
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self { events }
    }

    /// The committed events.
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Take the events.
    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.events
    }
}

/// Receiver of committed change sets.
pub trait ChangeSink: Send + Sync {
    /// Called with the reduced events of a unit of work about to complete.
    fn before_completion(&self, _pending: &[ChangeEvent]) -> Result<(), Error> {
        Ok(())
    }

    /// Called once per committed outermost or independent unit of work.
    fn transaction_committed(&self, committed: &TransactionCommitted) -> Result<(), Error>;
}

/// What [`ChangeTracker::end`] did with the popped frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Rolled back; nothing was kept.
    Discarded,
    /// Committed into the enclosing frame.
    Merged {
        /// Number of events handed to the parent.
        events: usize,
    },
    /// Committed and handed to the sink.
    Committed(TransactionCommitted),
}

struct TrackedFrame {
    frame: ChangeFrame,
    propagation: Propagation,
}

/// Explicit unit-of-work handle holding a stack of change frames.
///
/// One tracker belongs to one thread of execution; nested units of work on
/// that thread share it. The frame stack is released entirely whenever it
/// becomes empty.
///
/// An entity without a capability of its own falls back to the one its
/// type declares in the lookup set with [`with_types`](Self::with_types).
#[derive(Default)]
pub struct ChangeTracker {
    frames: Vec<TrackedFrame>,
    sink: Option<Arc<dyn ChangeSink>>,
    types: Option<Arc<dyn CapabilityLookup>>,
}

impl ChangeTracker {
    /// Create a tracker with no sink; committed events are only returned.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker that hands committed events to `sink`.
    pub fn with_sink(sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            frames: Vec::new(),
            sink: Some(sink),
            types: None,
        }
    }

    /// Resolve undeclared capabilities through `types`.
    pub fn with_types(mut self, types: Arc<dyn CapabilityLookup>) -> Self {
        self.types = Some(types);
        self
    }

    /// Open an independent unit of work.
    pub fn begin(&mut self) {
        self.begin_with(Propagation::Independent);
    }

    /// Open a unit of work joined to the current one.
    pub fn begin_nested(&mut self) {
        self.begin_with(Propagation::Joined);
    }

    /// Open a unit of work with explicit propagation.
    pub fn begin_with(&mut self, propagation: Propagation) {
        self.frames.push(TrackedFrame {
            frame: ChangeFrame::new(),
            propagation,
        });
        tracing::trace!(depth = self.frames.len(), ?propagation, "unit of work started");
    }

    /// Number of open units of work.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Check if a unit of work is open.
    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Capacity retained by the frame stack.
    pub fn retained_frames(&self) -> usize {
        self.frames.capacity()
    }

    /// An entity was inserted.
    pub fn on_create<E: Entity + ?Sized>(&mut self, entity: &E) -> Result<(), Error> {
        self.record(ChangeEvent::new(entity.entity_ref(), MutationKind::Created))
    }

    /// An entity was flushed dirty.
    ///
    /// Besides `UPDATED`, a flip of the lifecycle flag declared by the entity,
    /// or failing that by its registered type, records the matching
    /// retire/unretire or void/unvoid transition.
    pub fn on_update<E: Entity + ?Sized>(
        &mut self,
        entity: &E,
        deltas: &[FieldDelta],
    ) -> Result<(), Error> {
        let updated = ChangeEvent::new(entity.entity_ref(), MutationKind::Updated);
        let capability = self.capability_of(entity, &updated.entity.type_name);

        let transition = capability.flag_field().and_then(|field| {
            deltas
                .iter()
                .find(|delta| delta.field == field)
                .and_then(|delta| capability.transition(delta.previous.as_flag(), delta.current.as_flag()))
        });

        let frame = self.top()?;
        if let Some(kind) = transition {
            frame.record(updated.with_kind(kind));
        }
        frame.record(updated);
        Ok(())
    }

    /// An entity was deleted.
    pub fn on_delete<E: Entity + ?Sized>(&mut self, entity: &E) -> Result<(), Error> {
        self.record(ChangeEvent::new(entity.entity_ref(), MutationKind::Purged))
    }

    /// A collection owned by `owner` gained or lost elements.
    pub fn on_collection_change<E: Entity + ?Sized>(&mut self, owner: &E) -> Result<(), Error> {
        self.record(ChangeEvent::new(owner.entity_ref(), MutationKind::Updated))
    }

    /// Record an already classified event into the current unit of work.
    pub fn record(&mut self, event: ChangeEvent) -> Result<(), Error> {
        self.top()?.record(event);
        Ok(())
    }

    /// Reduced events of the current unit of work, before it completes.
    ///
    /// Also handed to the sink's `before_completion` hook.
    pub fn before_completion(&self) -> Result<Vec<ChangeEvent>, Error> {
        let current = self.frames.last().ok_or(Error::NoActiveUnitOfWork)?;
        let pending = current.frame.reduce();
        if let Some(sink) = &self.sink {
            sink.before_completion(&pending)?;
        }
        Ok(pending)
    }

    /// Close the current unit of work.
    ///
    /// The frame is popped whatever the outcome. A sink failure is returned
    /// as [`Error::Sink`], but the unit of work stays completed.
    pub fn end(&mut self, outcome: Outcome) -> Result<Completion, Error> {
        let TrackedFrame { frame, propagation } =
            self.frames.pop().ok_or(Error::NoActiveUnitOfWork)?;

        if self.frames.is_empty() {
            // Drop the allocation, not just the contents
            self.frames = Vec::new();
        }

        if outcome == Outcome::RolledBack {
            tracing::trace!(discarded = frame.len(), "unit of work rolled back");
            return Ok(Completion::Discarded);
        }

        let events = frame.reduce();

        if propagation == Propagation::Joined {
            if let Some(parent) = self.frames.last_mut() {
                let merged = events.len();
                for event in events {
                    parent.frame.record(event);
                }
                tracing::trace!(merged, "nested unit of work merged into parent");
                return Ok(Completion::Merged { events: merged });
            }
        }

        let committed = TransactionCommitted::new(events);
        if let Some(sink) = &self.sink {
            if !committed.is_empty() {
                sink.transaction_committed(&committed).map_err(|e| {
                    tracing::warn!(error = %e, events = committed.len(), "failed to hand off committed changes");
                    Error::Sink(e.to_string())
                })?;
            }
        }

        tracing::debug!(events = committed.len(), "unit of work committed");
        Ok(Completion::Committed(committed))
    }

    fn capability_of<E: Entity + ?Sized>(&self, entity: &E, type_name: &str) -> Capability {
        match (entity.capability(), &self.types) {
            (Capability::None, Some(types)) => types.capability_of(type_name),
            (declared, _) => declared,
        }
    }

    fn top(&mut self) -> Result<&mut ChangeFrame, Error> {
        self.frames
            .last_mut()
            .map(|tracked| &mut tracked.frame)
            .ok_or(Error::NoActiveUnitOfWork)
    }
}

impl Drop for ChangeTracker {
    fn drop(&mut self) {
        if !self.frames.is_empty() {
            tracing::warn!(depth = self.frames.len(), "change tracker dropped with open units of work");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TypeDef, TypeRegistry};
    use changecast_proto::{EntityRef, Value};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        committed: Mutex<Vec<TransactionCommitted>>,
        pending: Mutex<Vec<Vec<ChangeEvent>>>,
    }

    impl ChangeSink for RecordingSink {
        fn before_completion(&self, pending: &[ChangeEvent]) -> Result<(), Error> {
            self.pending.lock().push(pending.to_vec());
            Ok(())
        }

        fn transaction_committed(&self, committed: &TransactionCommitted) -> Result<(), Error> {
            self.committed.lock().push(committed.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl ChangeSink for FailingSink {
        fn transaction_committed(&self, _committed: &TransactionCommitted) -> Result<(), Error> {
            Err(Error::Sink("broker unreachable".to_string()))
        }
    }

    fn concept(id: &str) -> EntityRef {
        EntityRef::new("org.example.Concept", id)
    }

    fn committed_events(completion: Completion) -> Vec<ChangeEvent> {
        match completion {
            Completion::Committed(committed) => committed.into_events(),
            other => panic!("expected commit, got {:?}", other),
        }
    }

    #[test]
    fn test_create_then_update_yields_created_only() {
        let mut tracker = ChangeTracker::new();
        tracker.begin();
        tracker.on_create(&concept("1")).unwrap();
        tracker.on_update(&concept("1"), &[]).unwrap();

        let events = committed_events(tracker.end(Outcome::Committed).unwrap());
        assert_eq!(events, vec![ChangeEvent::new(concept("1"), MutationKind::Created)]);
    }

    #[test]
    fn test_create_then_purge_keeps_both() {
        let mut tracker = ChangeTracker::new();
        tracker.begin();
        tracker.on_create(&concept("1")).unwrap();
        tracker.on_update(&concept("1"), &[]).unwrap();
        tracker.on_delete(&concept("1")).unwrap();

        let kinds: Vec<MutationKind> = committed_events(tracker.end(Outcome::Committed).unwrap())
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![MutationKind::Purged, MutationKind::Created]);
    }

    #[test]
    fn test_retire_flag_flips() {
        let drug = (concept("d"), Capability::Retirable);

        let mut tracker = ChangeTracker::new();
        tracker.begin();
        tracker
            .on_update(&drug, &[FieldDelta::new("retired", false, true)])
            .unwrap();
        let kinds: Vec<MutationKind> = committed_events(tracker.end(Outcome::Committed).unwrap())
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![MutationKind::Updated, MutationKind::Retired]);

        tracker.begin();
        tracker
            .on_update(&drug, &[FieldDelta::new("retired", true, Value::Null)])
            .unwrap();
        let kinds: Vec<MutationKind> = committed_events(tracker.end(Outcome::Committed).unwrap())
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![MutationKind::Updated, MutationKind::Unretired]);
    }

    #[test]
    fn test_void_flag_and_no_flip() {
        let obs = (EntityRef::new("org.example.Obs", "o"), Capability::Voidable);

        let mut tracker = ChangeTracker::new();
        tracker.begin();
        tracker
            .on_update(&obs, &[FieldDelta::new("voided", "false", "true")])
            .unwrap();
        let kinds: Vec<MutationKind> = committed_events(tracker.end(Outcome::Committed).unwrap())
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![MutationKind::Updated, MutationKind::Voided]);

        tracker.begin();
        tracker
            .on_update(&obs, &[FieldDelta::new("voided", true, true)])
            .unwrap();
        let kinds: Vec<MutationKind> = committed_events(tracker.end(Outcome::Committed).unwrap())
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![MutationKind::Updated]);
    }

    #[test]
    fn test_declared_type_capability_used_for_bare_refs() {
        let registry = TypeRegistry::new()
            .with_type(TypeDef::concrete("org.example.Obs").with_capability(Capability::Voidable));
        let mut tracker = ChangeTracker::new().with_types(Arc::new(registry));

        tracker.begin();
        tracker
            .on_update(
                &EntityRef::new("org.example.Obs", "o"),
                &[FieldDelta::new("voided", false, true)],
            )
            .unwrap();
        tracker.on_update(&concept("c"), &[FieldDelta::new("retired", false, true)]).unwrap();
        let kinds: Vec<MutationKind> = committed_events(tracker.end(Outcome::Committed).unwrap())
            .into_iter()
            .map(|e| e.kind)
            .collect();

        // Concept is not registered, so only its update is kept
        assert_eq!(
            kinds,
            vec![MutationKind::Updated, MutationKind::Updated, MutationKind::Voided]
        );
    }

    #[test]
    fn test_entity_capability_overrides_declared() {
        let registry = TypeRegistry::new()
            .with_type(TypeDef::concrete("org.example.Concept").with_capability(Capability::Voidable));
        let mut tracker = ChangeTracker::new().with_types(Arc::new(registry));

        tracker.begin();
        tracker
            .on_update(
                &(concept("c"), Capability::Retirable),
                &[FieldDelta::new("retired", false, true)],
            )
            .unwrap();
        let kinds: Vec<MutationKind> = committed_events(tracker.end(Outcome::Committed).unwrap())
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, vec![MutationKind::Updated, MutationKind::Retired]);
    }

    #[test]
    fn test_flag_of_other_capability_ignored() {
        // A retirable entity does not react to a `voided` delta
        let drug = (concept("d"), Capability::Retirable);
        let mut tracker = ChangeTracker::new();
        tracker.begin();
        tracker
            .on_update(&drug, &[FieldDelta::new("voided", false, true)])
            .unwrap();
        let events = committed_events(tracker.end(Outcome::Committed).unwrap());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_collection_change_is_owner_update() {
        let mut tracker = ChangeTracker::new();
        tracker.begin();
        tracker.on_collection_change(&concept("owner")).unwrap();
        let events = committed_events(tracker.end(Outcome::Committed).unwrap());
        assert_eq!(events, vec![ChangeEvent::new(concept("owner"), MutationKind::Updated)]);
    }

    #[test]
    fn test_rollback_discards() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = ChangeTracker::with_sink(sink.clone());
        tracker.begin();
        tracker.on_create(&concept("1")).unwrap();

        assert_eq!(tracker.end(Outcome::RolledBack).unwrap(), Completion::Discarded);
        assert!(sink.committed.lock().is_empty());
    }

    #[test]
    fn test_inner_commit_survives_outer_rollback() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = ChangeTracker::with_sink(sink.clone());

        tracker.begin();
        tracker.on_create(&concept("outer")).unwrap();
        tracker.begin();
        tracker.on_create(&concept("inner")).unwrap();
        tracker.end(Outcome::Committed).unwrap();
        tracker.end(Outcome::RolledBack).unwrap();

        let committed = sink.committed.lock();
        assert_eq!(committed.len(), 1);
        assert_eq!(
            committed[0].events(),
            &[ChangeEvent::new(concept("inner"), MutationKind::Created)]
        );
    }

    #[test]
    fn test_inner_rollback_outer_commit() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = ChangeTracker::with_sink(sink.clone());

        tracker.begin();
        tracker.on_create(&concept("outer")).unwrap();
        tracker.begin();
        tracker.on_create(&concept("inner")).unwrap();
        tracker.end(Outcome::RolledBack).unwrap();
        tracker.end(Outcome::Committed).unwrap();

        let committed = sink.committed.lock();
        assert_eq!(committed.len(), 1);
        assert_eq!(
            committed[0].events(),
            &[ChangeEvent::new(concept("outer"), MutationKind::Created)]
        );
    }

    #[test]
    fn test_joined_scope_merges_into_parent() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = ChangeTracker::with_sink(sink.clone());

        tracker.begin();
        tracker.on_update(&concept("1"), &[]).unwrap();
        tracker.begin_nested();
        tracker.on_delete(&concept("1")).unwrap();
        assert_eq!(
            tracker.end(Outcome::Committed).unwrap(),
            Completion::Merged { events: 1 }
        );
        assert!(sink.committed.lock().is_empty());

        tracker.end(Outcome::Committed).unwrap();
        let committed = sink.committed.lock();
        assert_eq!(
            committed[0].events(),
            &[ChangeEvent::new(concept("1"), MutationKind::Purged)]
        );
    }

    #[test]
    fn test_joined_scope_lost_with_parent_rollback() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = ChangeTracker::with_sink(sink.clone());

        tracker.begin();
        tracker.begin_nested();
        tracker.on_create(&concept("1")).unwrap();
        tracker.end(Outcome::Committed).unwrap();
        tracker.end(Outcome::RolledBack).unwrap();

        assert!(sink.committed.lock().is_empty());
    }

    #[test]
    fn test_stack_released_when_empty() {
        let mut tracker = ChangeTracker::new();
        for _ in 0..4 {
            tracker.begin();
        }
        for _ in 0..4 {
            tracker.end(Outcome::Committed).unwrap();
        }
        assert!(!tracker.is_active());
        assert_eq!(tracker.retained_frames(), 0);
    }

    #[test]
    fn test_callbacks_without_unit_of_work() {
        let mut tracker = ChangeTracker::new();
        assert!(matches!(tracker.on_create(&concept("1")), Err(Error::NoActiveUnitOfWork)));
        assert!(matches!(tracker.end(Outcome::Committed), Err(Error::NoActiveUnitOfWork)));
        assert!(matches!(tracker.before_completion(), Err(Error::NoActiveUnitOfWork)));
    }

    #[test]
    fn test_before_completion_sees_pending() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = ChangeTracker::with_sink(sink.clone());
        tracker.begin();
        tracker.on_create(&concept("1")).unwrap();
        tracker.on_update(&concept("1"), &[]).unwrap();

        let pending = tracker.before_completion().unwrap();
        assert_eq!(pending, vec![ChangeEvent::new(concept("1"), MutationKind::Created)]);
        assert_eq!(sink.pending.lock().len(), 1);
        assert!(tracker.is_active());
        tracker.end(Outcome::Committed).unwrap();
    }

    #[test]
    fn test_sink_failure_still_completes() {
        let mut tracker = ChangeTracker::with_sink(Arc::new(FailingSink));
        tracker.begin();
        tracker.on_create(&concept("1")).unwrap();

        assert!(matches!(tracker.end(Outcome::Committed), Err(Error::Sink(_))));
        assert_eq!(tracker.depth(), 0);
    }

    #[test]
    fn test_empty_commit_skips_sink() {
        let sink = Arc::new(RecordingSink::default());
        let mut tracker = ChangeTracker::with_sink(sink.clone());
        tracker.begin();
        let completion = tracker.end(Outcome::Committed).unwrap();
        assert_eq!(completion, Completion::Committed(TransactionCommitted::default()));
        assert!(sink.committed.lock().is_empty());
    }
}
