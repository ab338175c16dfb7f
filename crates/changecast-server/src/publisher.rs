//! Bridges from committed units of work to the dispatcher.
//!
//! [`CommitPublisher`] publishes on the committing thread. [`spawn_publisher`]
//! starts a background task instead, so the committing thread only enqueues.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use changecast_core::{ChangeSink, Error as CoreError, TransactionCommitted};

use crate::dispatcher::SharedDispatcher;
use crate::error::Error;

/// Publishes every committed event through the dispatcher, in commit order.
pub struct CommitPublisher {
    dispatcher: SharedDispatcher,
}

impl CommitPublisher {
    /// Create a publisher for `dispatcher`.
    pub fn new(dispatcher: SharedDispatcher) -> Self {
        Self { dispatcher }
    }
}

impl ChangeSink for CommitPublisher {
    fn transaction_committed(&self, committed: &TransactionCommitted) -> Result<(), CoreError> {
        publish_all(&self.dispatcher, committed).map_err(|e| CoreError::Sink(e.to_string()))
    }
}

/// Publish each event; keep going after a failure and report the last one.
fn publish_all(dispatcher: &SharedDispatcher, committed: &TransactionCommitted) -> Result<(), Error> {
    let mut failed = 0usize;
    let mut last_error = None;

    for event in committed.events() {
        if let Err(e) = dispatcher.publish_change(event) {
            warn!(event = %event, error = %e, "failed to publish change");
            failed += 1;
            last_error = Some(e);
        }
    }

    match last_error {
        Some(e) if failed == committed.len() => Err(e),
        Some(e) => Err(Error::Transport(format!(
            "{} of {} changes not published: {}",
            failed,
            committed.len(),
            e
        ))),
        None => Ok(()),
    }
}

/// Background task publishing committed batches.
pub struct PublishProcessor {
    rx: mpsc::Receiver<TransactionCommitted>,
    dispatcher: SharedDispatcher,
}

impl PublishProcessor {
    /// Create a new processor.
    pub fn new(rx: mpsc::Receiver<TransactionCommitted>, dispatcher: SharedDispatcher) -> Self {
        Self { rx, dispatcher }
    }

    /// Process batches until every sender is dropped.
    pub async fn run(mut self) {
        info!("commit publisher started");

        while let Some(batch) = self.rx.recv().await {
            debug!(events = batch.len(), "publishing committed batch");

            // Remote publishing may block up to the send timeout
            let dispatcher = self.dispatcher.clone();
            let published =
                tokio::task::spawn_blocking(move || publish_all(&dispatcher, &batch)).await;

            match published {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "committed batch not fully published"),
                Err(e) => warn!(error = %e, "publish task failed"),
            }
        }

        info!("commit publisher stopped (channel closed)");
    }
}

/// Sender side of the commit publisher queue.
pub type PublishSender = mpsc::Sender<TransactionCommitted>;

/// Handle for a running [`PublishProcessor`].
///
/// Acts as a [`ChangeSink`]: committed batches are enqueued without
/// waiting, and a full or closed queue is reported to the committer.
#[derive(Clone)]
pub struct PublisherHandle {
    tx: PublishSender,
}

impl PublisherHandle {
    /// Create a new handle.
    pub fn new(tx: PublishSender) -> Self {
        Self { tx }
    }

    /// Enqueue a batch, waiting if the queue is full.
    pub async fn send(
        &self,
        batch: TransactionCommitted,
    ) -> Result<(), mpsc::error::SendError<TransactionCommitted>> {
        self.tx.send(batch).await
    }

    /// Clone the sender for use in another context.
    pub fn clone_sender(&self) -> PublishSender {
        self.tx.clone()
    }
}

impl ChangeSink for PublisherHandle {
    fn transaction_committed(&self, committed: &TransactionCommitted) -> Result<(), CoreError> {
        self.tx.try_send(committed.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CoreError::Sink("publisher queue is full".to_string()),
            mpsc::error::TrySendError::Closed(_) => CoreError::Sink("publisher has stopped".to_string()),
        })
    }
}

/// Start a commit publisher on the current runtime.
///
/// Must be called from within a tokio runtime.
pub fn spawn_publisher(dispatcher: SharedDispatcher, buffer_size: usize) -> PublisherHandle {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let processor = PublishProcessor::new(rx, dispatcher);

    tokio::spawn(async move {
        processor.run().await;
    });

    PublisherHandle::new(tx)
}
