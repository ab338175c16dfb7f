//! Subscription API combining type resolution and the dispatcher.

use std::sync::Arc;

use changecast_core::{ResolutionSession, TypeSource};
use changecast_proto::{Destination, MutationKind};

use crate::dispatcher::SharedDispatcher;
use crate::error::Error;
use crate::subscriber::{SubscribableListener, Subscriber};

/// Entry point for subscribing to entity changes and named topics.
///
/// Holds no state of its own. A subscription on a type covers the concrete
/// subtypes known when the call is made; types registered later are not
/// picked up by existing subscriptions.
#[derive(Clone)]
pub struct Events {
    dispatcher: SharedDispatcher,
    types: Arc<dyn TypeSource>,
}

impl Events {
    /// Create the API over `dispatcher`, resolving types from `types`.
    pub fn new(dispatcher: SharedDispatcher, types: Arc<dyn TypeSource>) -> Self {
        Self { dispatcher, types }
    }

    /// Underlying dispatcher.
    pub fn dispatcher(&self) -> &SharedDispatcher {
        &self.dispatcher
    }

    /// Subscribe to `actions` on `type_name` and its concrete subtypes.
    ///
    /// `None` means every action, expanded now. A blank type name is
    /// ignored. Returns the number of destinations subscribed.
    pub fn subscribe(
        &self,
        type_name: &str,
        actions: Option<&[MutationKind]>,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<usize, Error> {
        let destinations = self.expand(&[type_name], actions)?;
        for destination in &destinations {
            self.dispatcher.subscribe(destination, subscriber.clone())?;
        }
        Ok(destinations.len())
    }

    /// Undo [`subscribe`](Self::subscribe) over the same expansion.
    pub fn unsubscribe(
        &self,
        type_name: &str,
        actions: Option<&[MutationKind]>,
        subscriber: &dyn Subscriber,
    ) -> Result<usize, Error> {
        let destinations = self.expand(&[type_name], actions)?;
        for destination in &destinations {
            self.dispatcher.unsubscribe(destination, subscriber)?;
        }
        Ok(destinations.len())
    }

    /// Subscribe to a named topic.
    pub fn subscribe_topic(&self, topic: &str, subscriber: Arc<dyn Subscriber>) -> Result<(), Error> {
        self.subscribe_destination(&Destination::topic(topic), subscriber)
    }

    /// Unsubscribe from a named topic.
    pub fn unsubscribe_topic(&self, topic: &str, subscriber: &dyn Subscriber) -> Result<(), Error> {
        self.unsubscribe_destination(&Destination::topic(topic), subscriber)
    }

    /// Subscribe to a destination as is.
    pub fn subscribe_destination(
        &self,
        destination: &Destination,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<(), Error> {
        check_destination(destination)?;
        self.dispatcher.subscribe(destination, subscriber)
    }

    /// Unsubscribe from a destination as is.
    pub fn unsubscribe_destination(
        &self,
        destination: &Destination,
        subscriber: &dyn Subscriber,
    ) -> Result<(), Error> {
        check_destination(destination)?;
        self.dispatcher.unsubscribe(destination, subscriber)
    }

    /// Subscribe a listener to everything it declares.
    pub fn register<L: SubscribableListener>(&self, listener: Arc<L>) -> Result<usize, Error> {
        let types = listener.subscribed_types();
        let actions = listener.subscribed_actions();
        let destinations = self.expand(&types, declared(&actions))?;

        let subscriber: Arc<dyn Subscriber> = listener;
        for destination in &destinations {
            self.dispatcher.subscribe(destination, subscriber.clone())?;
        }

        tracing::debug!(
            listener = %subscriber.identity(),
            destinations = destinations.len(),
            "listener registered"
        );
        Ok(destinations.len())
    }

    /// Unsubscribe a listener from everything it declares.
    pub fn deregister<L: SubscribableListener>(&self, listener: &L) -> Result<usize, Error> {
        let types = listener.subscribed_types();
        let actions = listener.subscribed_actions();
        let destinations = self.expand(&types, declared(&actions))?;

        for destination in &destinations {
            self.dispatcher.unsubscribe(destination, listener)?;
        }
        Ok(destinations.len())
    }

    /// Destinations for every (concrete subtype, action) pair, resolved in
    /// one session.
    fn expand<S: AsRef<str>>(
        &self,
        type_names: &[S],
        actions: Option<&[MutationKind]>,
    ) -> Result<Vec<Destination>, Error> {
        let actions = actions.unwrap_or(&MutationKind::ALL[..]);
        let mut session = ResolutionSession::open(self.types.as_ref());
        let mut destinations = Vec::new();

        for type_name in type_names {
            let type_name = type_name.as_ref();
            if type_name.trim().is_empty() {
                tracing::warn!("ignoring subscription request without a type");
                continue;
            }

            for subtype in session.resolve(type_name)?.iter() {
                for &action in actions {
                    let destination = Destination::for_entity(subtype, action);
                    if !destinations.contains(&destination) {
                        destinations.push(destination);
                    }
                }
            }
        }

        session.release();
        Ok(destinations)
    }
}

fn declared(actions: &[MutationKind]) -> Option<&[MutationKind]> {
    if actions.is_empty() {
        None
    } else {
        Some(actions)
    }
}

fn check_destination(destination: &Destination) -> Result<(), Error> {
    if destination.is_blank() {
        return Err(Error::InvalidTopic(destination.topic_name().to_string()));
    }
    Ok(())
}
