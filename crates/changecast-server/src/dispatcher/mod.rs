//! Topic-addressed publish/subscribe dispatcher.
//!
//! The [`Dispatcher`] owns the broker connection and the subscriber
//! registry. The connection is established lazily by the first operation
//! that needs it and re-established after [`Dispatcher::shutdown`].

mod metrics;
mod registration;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use changecast_proto::{ChangeEvent, Destination, EntityRef, EventMessage, MutationKind};

pub use metrics::DispatcherMetrics;
use registration::{Guarded, Registration, RegistrationKey};

use crate::broker::{Connector, DefaultConnector, SharedBroker};
use crate::config::DispatcherConfig;
use crate::error::Error;
use crate::subscriber::Subscriber;
use crate::switch::{EnableSwitch, MarkerFileSwitch};

/// Publish/subscribe engine.
///
/// Registry mutation and broker bootstrap share one exclusive lock.
/// Publishing to an established connection only takes a read lock on the
/// connection slot and never touches the registry.
pub struct Dispatcher {
    config: DispatcherConfig,
    connector: Arc<dyn Connector>,
    switch: Arc<dyn EnableSwitch>,
    registry: Mutex<HashMap<RegistrationKey, Registration>>,
    broker: RwLock<Option<SharedBroker>>,
    metrics: Arc<DispatcherMetrics>,
}

impl Dispatcher {
    /// Create a dispatcher using the default connector and the marker file
    /// switch under the configured broker directory.
    pub fn new(config: DispatcherConfig) -> Self {
        let switch = MarkerFileSwitch::new(config.disabled_marker());
        Self {
            config,
            connector: Arc::new(DefaultConnector),
            switch: Arc::new(switch),
            registry: Mutex::new(HashMap::new()),
            broker: RwLock::new(None),
            metrics: Arc::new(DispatcherMetrics::new()),
        }
    }

    /// Use a different connector.
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Use a different enable switch.
    pub fn with_switch(mut self, switch: Arc<dyn EnableSwitch>) -> Self {
        self.switch = switch;
        self
    }

    /// Dispatcher configuration.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Dispatcher metrics.
    pub fn metrics(&self) -> &DispatcherMetrics {
        &self.metrics
    }

    /// Check if the enable switch currently allows dispatching.
    pub fn is_enabled(&self) -> bool {
        self.switch.is_enabled()
    }

    /// Check if a broker connection is established.
    pub fn is_connected(&self) -> bool {
        self.broker.read().is_some()
    }

    /// Number of live registrations.
    pub fn subscription_count(&self) -> usize {
        self.registry.lock().len()
    }

    /// Check if `subscriber` is registered for `destination`.
    pub fn is_subscribed(&self, destination: &Destination, subscriber: &dyn Subscriber) -> bool {
        self.registry
            .lock()
            .contains_key(&RegistrationKey::new(destination, subscriber))
    }

    /// Register `subscriber` for `destination`.
    ///
    /// An existing registration with the same subscriber identity is torn
    /// down first, so a destination never delivers a message twice to one
    /// identity.
    pub fn subscribe(
        &self,
        destination: &Destination,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<(), Error> {
        if !self.switch.is_enabled() {
            tracing::trace!(destination = %destination, "dispatcher disabled, subscribe ignored");
            return Ok(());
        }
        ensure_addressable(destination)?;

        let key = RegistrationKey::new(destination, subscriber.as_ref());
        let mut registry = self.registry.lock();
        let broker = self.connect_locked()?;

        if let Some(previous) = registry.remove(&key) {
            previous.release();
            tracing::debug!(
                destination = %destination,
                subscriber = %key.identity,
                "replacing existing subscription"
            );
        }

        let topic = destination.topic_name();
        let guarded = Arc::new(Guarded::new(subscriber, topic, self.metrics.clone()));
        let channel = broker.subscribe(topic, guarded)?;

        tracing::debug!(destination = %destination, subscriber = %key.identity, "subscription created");
        registry.insert(key, Registration::new(channel));
        Ok(())
    }

    /// Remove the registration of `subscriber` for `destination`, if any.
    pub fn unsubscribe(&self, destination: &Destination, subscriber: &dyn Subscriber) -> Result<(), Error> {
        if !self.switch.is_enabled() {
            tracing::trace!(destination = %destination, "dispatcher disabled, unsubscribe ignored");
            return Ok(());
        }
        ensure_addressable(destination)?;

        let key = RegistrationKey::new(destination, subscriber);
        let removed = self.registry.lock().remove(&key);
        if let Some(registration) = removed {
            registration.release();
            tracing::debug!(destination = %destination, subscriber = %key.identity, "subscription removed");
        }
        Ok(())
    }

    /// Publish `message` to every subscriber of `destination`.
    ///
    /// Returns once the broker accepted the message. Subscriber failures
    /// are never reported here.
    pub fn publish(&self, destination: &Destination, message: &EventMessage) -> Result<(), Error> {
        if !self.switch.is_enabled() {
            self.metrics.record_dropped();
            tracing::trace!(destination = %destination, "dispatcher disabled, message dropped");
            return Ok(());
        }
        ensure_addressable(destination)?;

        let broker = self.connection()?;
        broker.publish(destination.topic_name(), message)?;
        self.metrics.record_published();

        tracing::trace!(destination = %destination, entries = message.len(), "message published");
        Ok(())
    }

    /// Publish a caller-built message to a named topic.
    pub fn publish_topic(&self, topic: &str, message: &EventMessage) -> Result<(), Error> {
        self.publish(&Destination::topic(topic), message)
    }

    /// Publish an already classified change.
    ///
    /// The message carries the entity identifier, its type name and the
    /// action, and is addressed to `"<ACTION>:<type name>"`.
    pub fn publish_change(&self, event: &ChangeEvent) -> Result<(), Error> {
        let destination = Destination::for_entity(&event.entity.type_name, event.kind);
        self.publish(&destination, &EventMessage::for_change(event))
    }

    /// Publish that `kind` happened to `entity`.
    pub fn fire_action(&self, entity: &EntityRef, kind: MutationKind) -> Result<(), Error> {
        self.publish_change(&ChangeEvent::new(entity.clone(), kind))
    }

    /// Release the broker connection and every registration.
    ///
    /// In-flight deliveries are not flushed. The next operation that needs
    /// a broker connects again.
    pub fn shutdown(&self) {
        let mut registry = self.registry.lock();
        let released = registry.len();
        for (_, registration) in registry.drain() {
            registration.release();
        }

        if let Some(broker) = self.broker.write().take() {
            broker.close();
            tracing::info!(released, "dispatcher shut down");
        }
    }

    /// Current broker connection, establishing it if needed.
    fn connection(&self) -> Result<SharedBroker, Error> {
        if let Some(broker) = self.broker.read().as_ref() {
            return Ok(broker.clone());
        }

        let _registry = self.registry.lock();
        self.connect_locked()
    }

    /// Establish the broker connection. Callers hold the registry lock.
    fn connect_locked(&self) -> Result<SharedBroker, Error> {
        let mut slot = self.broker.write();
        if let Some(broker) = slot.as_ref() {
            return Ok(broker.clone());
        }

        let url = self.config.broker_url()?;
        tracing::info!(broker = %url, "connecting to broker");

        let broker = self.connector.connect(&self.config).map_err(|e| {
            tracing::error!(broker = %url, error = %e, "broker bootstrap failed");
            e
        })?;

        self.metrics.record_connection();
        *slot = Some(broker.clone());
        Ok(broker)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn ensure_addressable(destination: &Destination) -> Result<(), Error> {
    if destination.is_blank() {
        return Err(Error::InvalidTopic(destination.topic_name().to_string()));
    }
    Ok(())
}

/// Shared dispatcher handle.
pub type SharedDispatcher = Arc<Dispatcher>;
