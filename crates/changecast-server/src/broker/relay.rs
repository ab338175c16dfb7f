//! Standalone relay forwarding published frames to remote subscribers.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nng::options::{Options, RecvMaxSize, RecvTimeout};
use nng::{Protocol, Socket};

use super::backoff::RecvBackoff;
use crate::config::RelayConfig;
use crate::error::Error;

/// How long the ingest socket waits before checking for a stop.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Longest wait after repeated ingest errors.
const MAX_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Relay between publishers and subscribers.
///
/// Frames pushed to the ingest socket are forwarded verbatim to the fan-out
/// socket; NNG's subscription filtering routes them to matching subscribers.
pub struct Relay {
    ingest: Socket,
    fanout: Socket,
    stop: Arc<AtomicBool>,
    forwarded: Arc<AtomicU64>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Relay {
    /// Bind both sockets and start forwarding.
    pub fn start(config: &RelayConfig) -> Result<Self, Error> {
        let ingest = Socket::new(Protocol::Pull0)
            .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;
        ingest
            .set_opt::<RecvMaxSize>(config.max_message_size)
            .map_err(|e| Error::Transport(format!("failed to set max message size: {}", e)))?;
        ingest
            .set_opt::<RecvTimeout>(Some(RECV_TIMEOUT))
            .map_err(|e| Error::Transport(format!("failed to set receive timeout: {}", e)))?;
        ingest.listen(&config.ingest_address).map_err(|e| {
            Error::Transport(format!("failed to listen on {}: {}", config.ingest_address, e))
        })?;
        tracing::info!(address = %config.ingest_address, "ingest listening");

        let fanout = Socket::new(Protocol::Pub0)
            .map_err(|e| Error::Transport(format!("failed to create socket: {}", e)))?;
        fanout.listen(&config.fanout_address).map_err(|e| {
            Error::Transport(format!("failed to listen on {}: {}", config.fanout_address, e))
        })?;
        tracing::info!(address = %config.fanout_address, "fan-out listening");

        let stop = Arc::new(AtomicBool::new(false));
        let forwarded = Arc::new(AtomicU64::new(0));

        let worker = {
            let ingest = ingest.clone();
            let fanout = fanout.clone();
            let stop = stop.clone();
            let forwarded = forwarded.clone();
            thread::Builder::new()
                .name("changecast-relay".to_string())
                .spawn(move || forward(ingest, fanout, stop, forwarded))
                .map_err(|e| Error::Transport(format!("failed to spawn relay worker: {}", e)))?
        };

        Ok(Self {
            ingest,
            fanout,
            stop,
            forwarded,
            worker: Some(worker),
        })
    }

    /// Number of frames forwarded so far.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    /// Stop forwarding and close both sockets.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            self.ingest.close();
            self.fanout.close();
            tracing::info!(forwarded = self.forwarded(), "relay stopped");
        }
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.stop();
    }
}

fn forward(ingest: Socket, fanout: Socket, stop: Arc<AtomicBool>, forwarded: Arc<AtomicU64>) {
    let mut backoff = RecvBackoff::new(RECV_TIMEOUT, MAX_ERROR_BACKOFF);

    while !stop.load(Ordering::SeqCst) {
        match ingest.recv() {
            Ok(frame) => {
                backoff.reset();
                if let Err((_, e)) = fanout.send(frame) {
                    tracing::error!(error = %e, "failed to fan out frame");
                    continue;
                }
                forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(nng::Error::TimedOut) => backoff.reset(),
            Err(nng::Error::Closed) => break,
            Err(e) => {
                if backoff.consecutive() == 0 {
                    tracing::error!(error = %e, "ingest receive error");
                }
                backoff.wait();
            }
        }
    }
}
