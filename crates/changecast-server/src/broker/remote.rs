//! Broker client dialing a `changecast-broker` relay over NNG.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nng::options::protocol::pubsub::Subscribe;
use nng::options::{Options, RecvMaxSize, RecvTimeout, SendTimeout};
use nng::{Message, Protocol, Socket};

use changecast_proto::framing::{
    decode_topic_frame_with_limit, encode_topic_frame_with_limit, topic_prefix,
};
use changecast_proto::EventMessage;

use super::backoff::RecvBackoff;
use super::{Broker, DeliveryChannel};
use crate::error::Error;
use crate::subscriber::Subscriber;

/// How often subscriber threads check whether they were closed.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Longest wait after repeated receive errors.
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Connection to a remote relay.
///
/// Publishing pushes topic frames to the relay ingest socket. Each
/// registration opens its own SUB socket on the fan-out address, filtered
/// to exactly one topic, and drains it on a dedicated thread.
pub struct RemoteBroker {
    publisher: Socket,
    subscribe_address: String,
    max_message_size: usize,
    next_channel_id: AtomicU64,
    closed: AtomicBool,
}

impl RemoteBroker {
    /// Connect to a relay.
    ///
    /// Fails if the ingest address cannot be dialed. Subscriber sockets dial
    /// lazily and reconnect on their own.
    pub fn connect(
        publish_address: &str,
        subscribe_address: &str,
        max_message_size: usize,
        send_timeout: Duration,
    ) -> Result<Self, Error> {
        let publisher = Socket::new(Protocol::Push0)
            .map_err(|e| Error::Connection(format!("failed to create socket: {}", e)))?;

        publisher
            .set_opt::<SendTimeout>(Some(send_timeout))
            .map_err(|e| Error::Connection(format!("failed to set send timeout: {}", e)))?;

        publisher.dial(publish_address).map_err(|e| {
            Error::Connection(format!("failed to connect to {}: {}", publish_address, e))
        })?;

        tracing::info!(
            publish = %publish_address,
            subscribe = %subscribe_address,
            "connected to relay"
        );

        Ok(Self {
            publisher,
            subscribe_address: subscribe_address.to_string(),
            max_message_size,
            next_channel_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("relay connection is closed".to_string()));
        }
        Ok(())
    }
}

impl Broker for RemoteBroker {
    fn publish(&self, topic: &str, message: &EventMessage) -> Result<(), Error> {
        self.ensure_open()?;

        let payload = message.to_bytes()?;
        let frame = encode_topic_frame_with_limit(topic, &payload, self.max_message_size)?;
        if frame.len() > self.max_message_size {
            return Err(Error::Protocol(changecast_proto::Error::InvalidMessage(format!(
                "message too large: {} bytes (max: {})",
                frame.len(),
                self.max_message_size
            ))));
        }

        self.publisher
            .send(Message::from(frame.as_slice()))
            .map_err(|(_, e)| Error::Transport(format!("failed to publish to {}: {}", topic, e)))
    }

    fn subscribe(
        &self,
        topic: &str,
        subscriber: Arc<dyn Subscriber>,
    ) -> Result<Box<dyn DeliveryChannel>, Error> {
        self.ensure_open()?;

        let socket = Socket::new(Protocol::Sub0)
            .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;
        socket
            .set_opt::<RecvMaxSize>(self.max_message_size)
            .map_err(|e| Error::Transport(format!("failed to set max message size: {}", e)))?;
        socket
            .set_opt::<RecvTimeout>(Some(POLL_INTERVAL))
            .map_err(|e| Error::Transport(format!("failed to set receive timeout: {}", e)))?;
        socket
            .set_opt::<Subscribe>(topic_prefix(topic)?)
            .map_err(|e| Error::Transport(format!("failed to subscribe to {}: {}", topic, e)))?;
        socket.dial_async(&self.subscribe_address).map_err(|e| {
            Error::Transport(format!("failed to dial {}: {}", self.subscribe_address, e))
        })?;

        let id = self.next_channel_id.fetch_add(1, Ordering::Relaxed);
        let stop = Arc::new(AtomicBool::new(false));

        {
            let socket = socket.clone();
            let stop = stop.clone();
            let topic = topic.to_string();
            let max_message_size = self.max_message_size;
            thread::Builder::new()
                .name(format!("changecast-sub-{}", id))
                .spawn(move || receive_loop(socket, &topic, max_message_size, subscriber, stop))
                .map_err(|e| Error::Transport(format!("failed to spawn subscriber thread: {}", e)))?;
        }

        tracing::debug!(topic, channel = id, "relay subscription opened");

        Ok(Box::new(RemoteChannel {
            topic: topic.to_string(),
            socket,
            stop,
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.publisher.close();
            tracing::info!("relay connection closed");
        }
    }
}

impl Drop for RemoteBroker {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop(
    socket: Socket,
    topic: &str,
    max_message_size: usize,
    subscriber: Arc<dyn Subscriber>,
    stop: Arc<AtomicBool>,
) {
    let mut backoff = RecvBackoff::new(POLL_INTERVAL, MAX_ERROR_BACKOFF);

    while !stop.load(Ordering::SeqCst) {
        let frame = match socket.recv() {
            Ok(frame) => frame,
            Err(nng::Error::TimedOut) => {
                backoff.reset();
                continue;
            }
            Err(nng::Error::Closed) => break,
            Err(e) => {
                if backoff.consecutive() == 0 {
                    tracing::error!(error = %e, topic, "receive error");
                }
                backoff.wait();
                continue;
            }
        };
        backoff.reset();

        if stop.load(Ordering::SeqCst) {
            break;
        }

        let message = decode_topic_frame_with_limit(frame.as_slice(), max_message_size).and_then(
            |(received, payload)| {
                if received != topic {
                    return Err(changecast_proto::Error::InvalidTopic(received.to_string()));
                }
                EventMessage::from_bytes(payload)
            },
        );

        match message {
            Ok(message) => subscriber.on_message(&message),
            Err(e) => tracing::warn!(error = %e, topic, "dropping malformed frame"),
        }
    }

    tracing::trace!(topic, "relay subscription drained");
}

/// The receiving thread is detached: once `stop` is set it delivers
/// nothing more and exits on its next wakeup.
struct RemoteChannel {
    topic: String,
    socket: Socket,
    stop: Arc<AtomicBool>,
}

impl DeliveryChannel for RemoteChannel {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn close(&mut self) {
        if !self.stop.swap(true, Ordering::SeqCst) {
            self.socket.close();
        }
    }
}

impl Drop for RemoteChannel {
    fn drop(&mut self) {
        self.close();
    }
}
