//! End-to-end tests: change tracking through the embedded broker.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use changecast_core::proto::{EntityRef, EventMessage, MutationKind};
use changecast_core::{Capability, ChangeTracker, FieldDelta, Outcome, TypeDef, TypeRegistry};
use changecast_server::{
    CommitPublisher, Dispatcher, DispatcherConfig, Events, SharedDispatcher, Subscriber,
};

const WAIT: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(200);

struct RecordingSubscriber {
    name: String,
    tx: Mutex<mpsc::Sender<EventMessage>>,
    rx: Mutex<mpsc::Receiver<EventMessage>>,
}

impl RecordingSubscriber {
    fn new(name: &str) -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        Arc::new(Self {
            name: name.to_string(),
            tx: Mutex::new(tx),
            rx: Mutex::new(rx),
        })
    }

    /// Wait for exactly `count` messages, then make sure nothing else arrives.
    fn expect(&self, count: usize) -> Vec<EventMessage> {
        let rx = self.rx.lock();
        let mut received = Vec::with_capacity(count);
        for _ in 0..count {
            match rx.recv_timeout(WAIT) {
                Ok(message) => received.push(message),
                Err(_) => panic!("{} got {} of {} messages", self.name, received.len(), count),
            }
        }
        assert!(
            rx.recv_timeout(QUIET).is_err(),
            "{} received more than {} messages",
            self.name,
            count
        );
        received
    }
}

impl Subscriber for RecordingSubscriber {
    fn on_message(&self, message: &EventMessage) {
        let _ = self.tx.lock().send(message.clone());
    }

    fn identity(&self) -> String {
        self.name.clone()
    }
}

struct TestContext {
    dispatcher: SharedDispatcher,
    events: Events,
    tracker: ChangeTracker,
    data_dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let data_dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(
            TypeRegistry::new()
                .with_type(TypeDef::abstract_type("org.clinic.Order"))
                .with_type(
                    TypeDef::concrete("org.clinic.DrugOrder")
                        .extends("org.clinic.Order")
                        .with_capability(Capability::Voidable),
                )
                .with_type(TypeDef::concrete("org.clinic.Concept").with_capability(Capability::Retirable)),
        );

        let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::new(data_dir.path())));
        let events = Events::new(dispatcher.clone(), registry.clone());
        let tracker = ChangeTracker::with_sink(Arc::new(CommitPublisher::new(dispatcher.clone())))
            .with_types(registry);

        Self {
            dispatcher,
            events,
            tracker,
            data_dir,
        }
    }

    fn disable(&self) {
        let marker = self.dispatcher.config().disabled_marker();
        std::fs::create_dir_all(marker.parent().unwrap()).unwrap();
        std::fs::write(&marker, b"").unwrap();
    }

    fn commit(&mut self, work: impl FnOnce(&mut ChangeTracker)) {
        self.tracker.begin();
        work(&mut self.tracker);
        self.tracker.end(Outcome::Committed).unwrap();
    }
}

fn actions(messages: &[EventMessage]) -> Vec<MutationKind> {
    messages.iter().filter_map(|m| m.action()).collect()
}

#[test]
fn test_update_subscriber_sees_only_updates() {
    let mut ctx = TestContext::new();
    let listener = RecordingSubscriber::new("updates");
    ctx.events
        .subscribe("org.clinic.Concept", Some(&[MutationKind::Updated]), listener.clone())
        .unwrap();

    let concept = EntityRef::new("org.clinic.Concept", "c-1");
    ctx.commit(|t| t.on_create(&concept).unwrap());
    ctx.commit(|t| t.on_update(&concept, &[]).unwrap());
    ctx.commit(|t| t.on_delete(&concept).unwrap());

    let received = listener.expect(1);
    assert_eq!(actions(&received), vec![MutationKind::Updated]);
    assert_eq!(received[0].uuid(), Some("c-1"));
}

#[test]
fn test_subtype_matching_create_and_purge() {
    let mut ctx = TestContext::new();
    let listener = RecordingSubscriber::new("orders");
    ctx.events
        .subscribe("org.clinic.Order", None, listener.clone())
        .unwrap();

    let order = EntityRef::new("org.clinic.DrugOrder", "o-1");
    ctx.commit(|t| {
        t.on_create(&order).unwrap();
        t.on_update(&order, &[]).unwrap();
        t.on_delete(&order).unwrap();
    });

    let mut received = actions(&listener.expect(2));
    received.sort_by_key(|kind| kind.precedence());
    assert_eq!(received, vec![MutationKind::Purged, MutationKind::Created]);
}

#[test]
fn test_void_transition_delivered() {
    let mut ctx = TestContext::new();
    let listener = RecordingSubscriber::new("voids");
    ctx.events
        .subscribe(
            "org.clinic.Order",
            Some(&[MutationKind::Voided, MutationKind::Unvoided]),
            listener.clone(),
        )
        .unwrap();

    let order = EntityRef::new("org.clinic.DrugOrder", "o-2");
    ctx.commit(|t| t.on_update(&order, &[FieldDelta::new("voided", false, true)]).unwrap());
    ctx.commit(|t| t.on_update(&order, &[FieldDelta::new("voided", true, false)]).unwrap());

    // separate destinations, so arrival order is not fixed
    let mut received = actions(&listener.expect(2));
    received.sort_by_key(|kind| kind.precedence());
    assert_eq!(received, vec![MutationKind::Voided, MutationKind::Unvoided]);
}

#[test]
fn test_nested_inner_commit_outer_rollback() {
    let mut ctx = TestContext::new();
    let listener = RecordingSubscriber::new("concepts");
    ctx.events
        .subscribe("org.clinic.Concept", Some(&[MutationKind::Created]), listener.clone())
        .unwrap();

    ctx.tracker.begin();
    ctx.tracker.on_create(&EntityRef::new("org.clinic.Concept", "outer")).unwrap();
    ctx.tracker.begin();
    ctx.tracker.on_create(&EntityRef::new("org.clinic.Concept", "inner")).unwrap();
    ctx.tracker.end(Outcome::Committed).unwrap();
    ctx.tracker.end(Outcome::RolledBack).unwrap();

    let received = listener.expect(1);
    assert_eq!(received[0].uuid(), Some("inner"));
}

#[test]
fn test_nested_inner_rollback_outer_commit() {
    let mut ctx = TestContext::new();
    let listener = RecordingSubscriber::new("concepts");
    ctx.events
        .subscribe("org.clinic.Concept", Some(&[MutationKind::Created]), listener.clone())
        .unwrap();

    ctx.tracker.begin();
    ctx.tracker.on_create(&EntityRef::new("org.clinic.Concept", "outer")).unwrap();
    ctx.tracker.begin();
    ctx.tracker.on_create(&EntityRef::new("org.clinic.Concept", "inner")).unwrap();
    ctx.tracker.end(Outcome::RolledBack).unwrap();
    ctx.tracker.end(Outcome::Committed).unwrap();

    let received = listener.expect(1);
    assert_eq!(received[0].uuid(), Some("outer"));
}

#[test]
fn test_duplicate_subscription_delivers_once() {
    let mut ctx = TestContext::new();
    let listener = RecordingSubscriber::new("dup");
    for _ in 0..3 {
        ctx.events
            .subscribe("org.clinic.Concept", Some(&[MutationKind::Created]), listener.clone())
            .unwrap();
    }
    assert_eq!(ctx.dispatcher.subscription_count(), 1);

    ctx.commit(|t| t.on_create(&EntityRef::new("org.clinic.Concept", "c")).unwrap());
    listener.expect(1);
}

#[test]
fn test_disabled_switch_drops_silently() {
    let ctx = TestContext::new();
    let listener = RecordingSubscriber::new("muted");
    ctx.events.subscribe_topic("alerts", listener.clone()).unwrap();

    ctx.disable();
    ctx.dispatcher
        .publish_topic("alerts", &EventMessage::new().with("level", "high"))
        .unwrap();

    listener.expect(0);
    assert_eq!(ctx.dispatcher.metrics().dropped(), 1);
    assert!(ctx.data_dir.path().join("broker-data/disabled").exists());
}

#[test]
fn test_topic_message_payload() {
    let ctx = TestContext::new();
    let listener = RecordingSubscriber::new("topic");
    ctx.events.subscribe_topic("inventory", listener.clone()).unwrap();

    let message = EventMessage::new().with("sku", "A-1").with("count", 12i64);
    ctx.dispatcher.publish_topic("inventory", &message).unwrap();

    let received = listener.expect(1);
    assert_eq!(received[0], message);
}

#[test]
fn test_classified_action_entry_point() {
    let ctx = TestContext::new();
    let listener = RecordingSubscriber::new("retire");
    ctx.events
        .subscribe("org.clinic.Concept", Some(&[MutationKind::Retired]), listener.clone())
        .unwrap();

    ctx.dispatcher
        .fire_action(&EntityRef::new("org.clinic.Concept", "c-9"), MutationKind::Retired)
        .unwrap();

    let received = listener.expect(1);
    assert_eq!(received[0].classname(), Some("org.clinic.Concept"));
    assert_eq!(received[0].action(), Some(MutationKind::Retired));
}
