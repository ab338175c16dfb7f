//! Registered subscriptions.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use changecast_proto::{Destination, EventMessage};

use super::metrics::DispatcherMetrics;
use crate::broker::DeliveryChannel;
use crate::subscriber::Subscriber;

/// Registry key: one registration per destination and subscriber identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct RegistrationKey {
    pub(crate) destination: Destination,
    pub(crate) identity: String,
}

impl RegistrationKey {
    pub(crate) fn new(destination: &Destination, subscriber: &dyn Subscriber) -> Self {
        Self {
            destination: destination.clone(),
            identity: subscriber.identity(),
        }
    }
}

/// A live registration.
pub(crate) struct Registration {
    channel: Box<dyn DeliveryChannel>,
}

impl Registration {
    pub(crate) fn new(channel: Box<dyn DeliveryChannel>) -> Self {
        Self { channel }
    }

    /// Release the delivery channel.
    pub(crate) fn release(mut self) {
        self.channel.close();
    }
}

/// Wraps a subscriber so one failing callback never reaches the broker.
pub(crate) struct Guarded {
    inner: Arc<dyn Subscriber>,
    topic: String,
    metrics: Arc<DispatcherMetrics>,
}

impl Guarded {
    pub(crate) fn new(inner: Arc<dyn Subscriber>, topic: &str, metrics: Arc<DispatcherMetrics>) -> Self {
        Self {
            inner,
            topic: topic.to_string(),
            metrics,
        }
    }
}

impl Subscriber for Guarded {
    fn on_message(&self, message: &EventMessage) {
        match catch_unwind(AssertUnwindSafe(|| self.inner.on_message(message))) {
            Ok(()) => self.metrics.record_delivered(),
            Err(panic) => {
                self.metrics.record_failed();
                tracing::error!(
                    topic = %self.topic,
                    subscriber = %self.inner.identity(),
                    panic = %panic_message(panic.as_ref()),
                    "subscriber failed to handle message"
                );
            }
        }
    }

    fn identity(&self) -> String {
        self.inner.identity()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
