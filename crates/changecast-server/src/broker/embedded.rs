//! In-process broker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use changecast_proto::EventMessage;

use super::{Broker, DeliveryChannel};
use crate::error::Error;
use crate::subscriber::Subscriber;

struct Route {
    id: u64,
    tx: mpsc::UnboundedSender<EventMessage>,
}

type RouteTable = DashMap<String, Vec<Route>>;

/// Broker living inside the host process.
///
/// Owns a small multi-threaded runtime. Every registration gets its own
/// queue drained by its own task, so each subscriber sees the messages of a
/// topic in publish order while slow subscribers never hold up others.
pub struct EmbeddedBroker {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    routes: Arc<RouteTable>,
    next_route_id: AtomicU64,
}

impl EmbeddedBroker {
    /// Start a broker with `workers` runtime threads.
    pub fn start(workers: usize) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name("changecast-embedded")
            .enable_all()
            .build()
            .map_err(|e| Error::Connection(format!("failed to start embedded broker: {}", e)))?;

        tracing::info!(workers = workers.max(1), "embedded broker started");

        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
            routes: Arc::new(DashMap::new()),
            next_route_id: AtomicU64::new(1),
        })
    }

    /// Number of topics with at least one registration.
    pub fn topic_count(&self) -> usize {
        self.routes.len()
    }

    /// Check if the broker has been closed.
    pub fn is_closed(&self) -> bool {
        self.runtime.lock().is_none()
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Transport("embedded broker is closed".to_string()));
        }
        Ok(())
    }
}

impl Broker for EmbeddedBroker {
    fn publish(&self, topic: &str, message: &EventMessage) -> Result<(), Error> {
        self.ensure_open()?;

        let Some(routes) = self.routes.get(topic) else {
            tracing::trace!(topic, "no subscribers");
            return Ok(());
        };

        for route in routes.iter() {
            // A closed receiver means the registration is being torn down
            let _ = route.tx.send(message.clone());
        }
        Ok(())
    }

    fn subscribe(
        &self,
        topic: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<Box<dyn DeliveryChannel>, Error> {
        self.ensure_open()?;

        let id = self.next_route_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = mpsc::unbounded_channel::<EventMessage>();

        let task_topic = topic.to_string();
        let task = self.handle.spawn(async move {
            while let Some(message) = rx.recv().await {
                let subscriber = subscriber.clone();
                let delivered =
                    tokio::task::spawn_blocking(move || subscriber.on_message(&message)).await;
                if let Err(e) = delivered {
                    if e.is_panic() {
                        tracing::error!(topic = %task_topic, "subscriber panicked");
                    }
                }
            }
        });

        self.routes
            .entry(topic.to_string())
            .or_default()
            .push(Route { id, tx });

        tracing::trace!(topic, route = id, "embedded route added");

        Ok(Box::new(EmbeddedChannel {
            topic: topic.to_string(),
            id,
            routes: Arc::downgrade(&self.routes),
            task: Some(task),
        }))
    }

    fn close(&self) {
        let runtime = self.runtime.lock().take();
        if let Some(runtime) = runtime {
            self.routes.clear();
            runtime.shutdown_background();
            tracing::info!("embedded broker closed");
        }
    }
}

impl Drop for EmbeddedBroker {
    fn drop(&mut self) {
        self.close();
    }
}

struct EmbeddedChannel {
    topic: String,
    id: u64,
    routes: Weak<RouteTable>,
    task: Option<JoinHandle<()>>,
}

impl DeliveryChannel for EmbeddedChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn close(&mut self) {
        if let Some(routes) = self.routes.upgrade() {
            let emptied = match routes.get_mut(&self.topic) {
                Some(mut entries) => {
                    entries.retain(|route| route.id != self.id);
                    entries.is_empty()
                }
                None => false,
            };
            if emptied {
                routes.remove_if(&self.topic, |_, entries| entries.is_empty());
            }
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for EmbeddedChannel {
    fn drop(&mut self) {
        self.close();
    }
}
