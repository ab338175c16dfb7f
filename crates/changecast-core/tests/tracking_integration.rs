//! Integration tests for change tracking and type resolution.

use std::sync::Arc;

use changecast_core::proto::{ChangeEvent, Destination, EntityRef, MutationKind};
use changecast_core::{
    Capability, ChangeSink, ChangeTracker, Error, FieldDelta, ManifestSource, Outcome,
    ResolutionSession, TransactionCommitted, TypeDef, TypeRegistry,
};
use parking_lot::Mutex;

const MANIFEST: &str = r#"{
    "types": [
        { "name": "org.clinic.BaseData", "abstract": true },
        { "name": "org.clinic.Encounter", "extends": ["org.clinic.BaseData"], "capability": "voidable" },
        { "name": "org.clinic.Person", "extends": ["org.clinic.BaseData"], "capability": "voidable" },
        { "name": "org.clinic.Patient", "extends": ["org.clinic.Person"], "capability": "voidable" },
        { "name": "org.clinic.Location", "capability": "retirable" }
    ]
}"#;

/// Collects destinations the way a dispatcher would address them.
#[derive(Default)]
struct DestinationLog {
    published: Mutex<Vec<Destination>>,
}

impl ChangeSink for DestinationLog {
    fn transaction_committed(&self, committed: &TransactionCommitted) -> Result<(), Error> {
        let mut published = self.published.lock();
        for event in committed.events() {
            published.push(Destination::for_entity(&event.entity.type_name, event.kind));
        }
        Ok(())
    }
}

struct TestContext {
    source: ManifestSource,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("types.json");
        std::fs::write(&path, MANIFEST).unwrap();

        Self {
            source: ManifestSource::new(path),
            _dir: dir,
        }
    }

    fn registry(&self) -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::load(&self.source).unwrap())
    }
}

#[test]
fn test_manifest_resolution() {
    let ctx = TestContext::new();
    let mut session = ResolutionSession::open(&ctx.source);

    let base = session.resolve("org.clinic.BaseData").unwrap();
    assert_eq!(
        base.to_vec(),
        vec!["org.clinic.Encounter", "org.clinic.Person", "org.clinic.Patient"]
    );

    let persons = session.resolve("org.clinic.Person").unwrap();
    assert_eq!(persons.to_vec(), vec!["org.clinic.Person", "org.clinic.Patient"]);
    assert_eq!(session.scans(), 1);
}

#[test]
fn test_manifest_missing_surfaces_error() {
    let source = ManifestSource::new("/nonexistent/changecast/types.json");
    let mut session = ResolutionSession::open(&source);
    assert!(session.resolve("org.clinic.Person").is_err());
}

#[test]
fn test_commit_addresses_runtime_types() {
    let ctx = TestContext::new();
    let log = Arc::new(DestinationLog::default());
    let mut tracker = ChangeTracker::with_sink(log.clone()).with_types(ctx.registry());

    let patient = EntityRef::new("org.clinic.Patient", "p-1");
    let location = EntityRef::new("org.clinic.Location", "l-1");

    tracker.begin();
    tracker.on_create(&location).unwrap();
    tracker
        .on_update(&patient, &[FieldDelta::new("voided", false, true)])
        .unwrap();
    tracker.on_update(&location, &[FieldDelta::new("retired", false, true)]).unwrap();
    tracker.end(Outcome::Committed).unwrap();

    let published: Vec<String> = log
        .published
        .lock()
        .iter()
        .map(|d| d.topic_name().to_string())
        .collect();
    assert_eq!(
        published,
        vec![
            "CREATED:org.clinic.Location",
            "UPDATED:org.clinic.Patient",
            "RETIRED:org.clinic.Location",
            "VOIDED:org.clinic.Patient",
        ]
    );
}

#[test]
fn test_registered_voidable_type_emits_voided() {
    let registry = TypeRegistry::new()
        .with_type(TypeDef::concrete("org.clinic.Obs").with_capability(Capability::Voidable));
    assert_eq!(registry.capability_of("org.clinic.Obs"), Capability::Voidable);

    let log = Arc::new(DestinationLog::default());
    let mut tracker = ChangeTracker::with_sink(log.clone()).with_types(Arc::new(registry));

    tracker.begin();
    tracker
        .on_update(
            &EntityRef::new("org.clinic.Obs", "o"),
            &[FieldDelta::new("voided", false, true)],
        )
        .unwrap();
    tracker.end(Outcome::Committed).unwrap();

    let kinds: Vec<Option<MutationKind>> = log.published.lock().iter().map(|d| d.kind()).collect();
    assert_eq!(kinds, vec![Some(MutationKind::Updated), Some(MutationKind::Voided)]);
}

#[test]
fn test_update_twice_then_purge() {
    let log = Arc::new(DestinationLog::default());
    let mut tracker = ChangeTracker::with_sink(log.clone());
    let encounter = EntityRef::new("org.clinic.Encounter", "e-1");

    tracker.begin();
    tracker.on_update(&encounter, &[]).unwrap();
    tracker.end(Outcome::Committed).unwrap();

    tracker.begin();
    tracker.on_update(&encounter, &[]).unwrap();
    tracker.on_update(&encounter, &[]).unwrap();
    tracker.end(Outcome::Committed).unwrap();

    tracker.begin();
    tracker.on_delete(&encounter).unwrap();
    tracker.end(Outcome::Committed).unwrap();

    let kinds: Vec<Option<MutationKind>> = log.published.lock().iter().map(|d| d.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            Some(MutationKind::Updated),
            Some(MutationKind::Updated),
            Some(MutationKind::Purged),
        ]
    );
}

#[test]
fn test_classified_event_recorded_directly() {
    let mut tracker = ChangeTracker::new();
    let event = ChangeEvent::new(EntityRef::new("org.clinic.Person", "x"), MutationKind::Unvoided);

    tracker.begin();
    tracker.record(event.clone()).unwrap();
    tracker.record(event.clone()).unwrap();
    let pending = tracker.before_completion().unwrap();
    tracker.end(Outcome::RolledBack).unwrap();

    assert_eq!(pending, vec![event]);
}
