//! Message brokers.
//!
//! The dispatcher talks to a [`Broker`] created by a [`Connector`]:
//!
//! - [`EmbeddedBroker`] - in-process, one delivery task per registration
//! - [`RemoteBroker`] - NNG sockets dialing a [`Relay`]
//! - [`Relay`] - the standalone fan-out process behind `changecast-broker`

mod backoff;
mod embedded;
mod relay;
mod remote;

use std::sync::Arc;

use changecast_proto::EventMessage;

pub use embedded::EmbeddedBroker;
pub use relay::Relay;
pub use remote::RemoteBroker;

use crate::config::{BrokerUrl, DispatcherConfig};
use crate::error::Error;
use crate::subscriber::Subscriber;

/// A live broker connection.
pub trait Broker: Send + Sync {
    /// Hand a message to the broker for every subscriber of `topic`.
    ///
    /// Returns once the broker has accepted the message, not once it has
    /// been delivered.
    fn publish(&self, topic: &str, message: &EventMessage) -> Result<(), Error>;

    /// Start delivering messages published to `topic` to `subscriber`.
    fn subscribe(
        &self,
        topic: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<Box<dyn DeliveryChannel>, Error>;

    /// Release the connection. Open delivery channels stop receiving.
    fn close(&self);
}

/// Delivery path of one registration.
pub trait DeliveryChannel: Send + Sync {
    /// Topic this channel receives.
    fn topic(&self) -> &str;

    /// Stop delivering. Messages not yet handed to the subscriber may be
    /// lost.
    fn close(&mut self);
}

/// Creates broker connections.
pub trait Connector: Send + Sync {
    /// Connect to the broker selected by `config`.
    fn connect(&self, config: &DispatcherConfig) -> Result<Arc<dyn Broker>, Error>;
}

/// Connects to the embedded or remote broker depending on configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

impl Connector for DefaultConnector {
    fn connect(&self, config: &DispatcherConfig) -> Result<Arc<dyn Broker>, Error> {
        match config.broker_url()? {
            BrokerUrl::Embedded => Ok(Arc::new(EmbeddedBroker::start(config.embedded_workers)?)),
            BrokerUrl::Remote { publish, subscribe } => Ok(Arc::new(RemoteBroker::connect(
                &publish,
                &subscribe,
                config.max_message_size,
                config.send_timeout,
            )?)),
        }
    }
}

/// Shared broker handle.
pub type SharedBroker = Arc<dyn Broker>;
