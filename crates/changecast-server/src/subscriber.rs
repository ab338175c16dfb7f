//! Subscriber callbacks.

use changecast_proto::{EventMessage, MutationKind};

/// Receives messages published to the destinations it is registered for.
///
/// Callbacks run on broker threads, never on the publishing thread. A
/// panicking callback is logged and does not affect other subscribers.
pub trait Subscriber: Send + Sync + 'static {
    /// Handle one message.
    fn on_message(&self, message: &EventMessage);

    /// Stable identity used to deduplicate registrations.
    ///
    /// Registering two subscribers with the same identity on one destination
    /// keeps only the later one. Defaults to the implementing type's name.
    fn identity(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// A subscriber that declares what it wants to hear about.
///
/// Registered through [`Events::register`](crate::Events::register), which
/// subscribes it to every declared type and action.
pub trait SubscribableListener: Subscriber {
    /// Types, expanded to their concrete subtypes on registration.
    fn subscribed_types(&self) -> Vec<String>;

    /// Actions per type. Empty means every action.
    fn subscribed_actions(&self) -> Vec<MutationKind> {
        Vec::new()
    }
}
