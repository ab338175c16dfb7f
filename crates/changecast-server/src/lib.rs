//! changecast server library.
//!
//! This crate turns committed entity changes into messages and delivers them
//! to subscribers:
//!
//! - [`dispatcher`] - the publish/subscribe engine and its registry
//! - [`broker`] - embedded and relay-backed message transports
//! - [`events`] - subscription API with type hierarchy expansion
//! - [`publisher`] - change sinks feeding committed units of work to the dispatcher
//! - [`switch`] - the kill switch consulted before every operation

pub mod broker;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod publisher;
pub mod subscriber;
pub mod switch;

pub use broker::{Broker, Connector, DefaultConnector, DeliveryChannel, EmbeddedBroker, Relay, RemoteBroker};
pub use config::{BrokerArgs, BrokerUrl, DispatcherConfig, RelayConfig};
pub use dispatcher::{Dispatcher, DispatcherMetrics, SharedDispatcher};
pub use error::Error;
pub use events::Events;
pub use publisher::{spawn_publisher, CommitPublisher, PublisherHandle};
pub use subscriber::{SubscribableListener, Subscriber};
pub use switch::{EnableSwitch, FlagSwitch, MarkerFileSwitch};
